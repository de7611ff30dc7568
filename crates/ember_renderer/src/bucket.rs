//! Bucket-based tile rendering.
//!
//! Divides the image into tiles (buckets) that are rendered independently
//! and in parallel. Buckets are the unit of cancellation: a render stops
//! between buckets, never inside a traversal.

use ember_core::World;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::renderer::render_pixel;
use crate::{Camera, Color, RenderConfig};

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// X coordinate of the top-left corner
    pub x: u32,
    /// Y coordinate of the top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Position in render order
    pub index: usize,
}

impl Bucket {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            index,
        }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// Default bucket size in pixels.
pub const DEFAULT_BUCKET_SIZE: u32 = 32;

/// Generate buckets covering the image, ordered from the center outward.
pub fn generate_buckets(width: u32, height: u32, bucket_size: u32) -> Vec<Bucket> {
    let bucket_size = bucket_size.max(1);
    let mut buckets = Vec::new();

    for y in (0..height).step_by(bucket_size as usize) {
        for x in (0..width).step_by(bucket_size as usize) {
            let bw = bucket_size.min(width - x);
            let bh = bucket_size.min(height - y);
            buckets.push(Bucket::new(x, y, bw, bh, buckets.len()));
        }
    }

    sort_spiral(&mut buckets, width, height);
    for (i, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = i;
    }

    buckets
}

/// Sort buckets by distance of their center from the image center.
fn sort_spiral(buckets: &mut [Bucket], width: u32, height: u32) {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let dist = |b: &Bucket| {
        let (x, y) = b.center();
        (x - cx).powi(2) + (y - cy).powi(2)
    };
    // Stable, so equidistant buckets keep row-major order
    buckets.sort_by(|a, b| dist(a).total_cmp(&dist(b)));
}

/// Render one bucket. Pixels come back row-major within the bucket.
///
/// Sampling is seeded from the bucket index, so the result does not depend
/// on which thread renders it.
pub fn render_bucket(bucket: &Bucket, camera: &Camera, world: &World, config: &RenderConfig) -> Vec<Color> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(bucket.index as u64));
    let mut pixels = Vec::with_capacity(bucket.pixel_count() as usize);

    for local_y in 0..bucket.height {
        for local_x in 0..bucket.width {
            pixels.push(render_pixel(
                camera,
                world,
                bucket.x + local_x,
                bucket.y + local_y,
                config,
                &mut rng,
            ));
        }
    }

    pixels
}

/// Result of rendering a bucket.
#[derive(Debug, Clone)]
pub struct BucketResult {
    pub bucket: Bucket,
    /// Pixel colors in row-major order
    pub pixels: Vec<Color>,
}

impl BucketResult {
    pub fn new(bucket: Bucket, pixels: Vec<Color>) -> Self {
        Self { bucket, pixels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_buckets_exact_fit() {
        let buckets = generate_buckets(128, 128, 64);
        assert_eq!(buckets.len(), 4);
        let total: u32 = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total, 128 * 128);
    }

    #[test]
    fn test_generate_buckets_partial_fit() {
        let buckets = generate_buckets(100, 70, 64);
        assert_eq!(buckets.len(), 4);
        let total: u32 = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total, 100 * 70);
    }

    #[test]
    fn test_spiral_order() {
        let buckets = generate_buckets(192, 192, 64);
        assert_eq!(buckets.len(), 9);
        assert_eq!((buckets[0].x, buckets[0].y), (64, 64));
        // Corners come last
        let last = buckets[8];
        assert!(last.x != 64 && last.y != 64);
        assert!(buckets.iter().enumerate().all(|(i, b)| b.index == i));
    }

    #[test]
    fn test_empty_image() {
        assert!(generate_buckets(0, 100, 16).is_empty());
    }
}
