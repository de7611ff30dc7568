//! Parallel preview renderer.
//!
//! Shades hits with a headlight term `|n . d|`, which needs nothing beyond
//! the nearest hit and makes instance placement easy to check.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use ember_core::{HitRecord, World};
use ember_math::{Ray, Vec3};
use rand::RngCore;
use rayon::prelude::*;
use thiserror::Error;

use crate::bucket::{generate_buckets, render_bucket, BucketResult, DEFAULT_BUCKET_SIZE};
use crate::Camera;

/// Linear RGB color.
pub type Color = Vec3;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to start render threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Render configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Jittered samples per pixel
    pub samples_per_pixel: u32,
    /// Bucket edge length in pixels
    pub bucket_size: u32,
    /// Worker threads, 0 for one per core
    pub threads: usize,
    /// Color of rays that hit nothing
    pub background: Color,
    /// Base seed for per-bucket sampling
    pub seed: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: 16,
            bucket_size: DEFAULT_BUCKET_SIZE,
            threads: 0,
            background: Color::new(0.05, 0.05, 0.08),
            seed: 0,
        }
    }
}

impl RenderConfig {
    pub fn with_samples(mut self, samples_per_pixel: u32) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self
    }

    pub fn with_bucket_size(mut self, bucket_size: u32) -> Self {
        self.bucket_size = bucket_size;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }
}

/// Headlight shading of the nearest hit along `ray`.
pub fn shade(world: &World, ray: &Ray, config: &RenderConfig, rng: &mut dyn RngCore) -> Color {
    let mut hit = HitRecord::default();
    if !world.intersect(ray, &mut hit, rng) {
        return config.background;
    }
    let facing = hit.normal.dot(ray.direction.normalize_or_zero()).abs();
    Color::splat(facing)
}

/// Average of `samples_per_pixel` jittered samples through pixel (x, y).
pub fn render_pixel(
    camera: &Camera,
    world: &World,
    x: u32,
    y: u32,
    config: &RenderConfig,
    rng: &mut dyn RngCore,
) -> Color {
    let samples = config.samples_per_pixel.max(1);
    let mut color = Color::ZERO;
    for _ in 0..samples {
        let ray = camera.get_ray(x, y, rng);
        color += shade(world, &ray, config, rng);
    }
    color / samples as f32
}

/// Gamma-encode (gamma 2) and quantize a linear color.
pub fn color_to_rgb(color: Color) -> [u8; 3] {
    let encode = |c: f32| (255.0 * c.max(0.0).sqrt().clamp(0.0, 1.0)) as u8;
    [encode(color.x), encode(color.y), encode(color.z)]
}

/// Render output in linear color.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl ImageBuffer {
    /// Create a black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::ZERO; width as usize * height as usize],
        }
    }

    /// Row-major offset of pixel `(x, y)`, computed in `usize`.
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[self.offset(x, y)]
    }

    /// Copy a rendered bucket into place.
    pub fn write_bucket(&mut self, result: &BucketResult) {
        let bucket = &result.bucket;
        for (row, line) in result.pixels.chunks(bucket.width as usize).enumerate() {
            let start = self.offset(bucket.x, bucket.y) + row * self.width as usize;
            self.pixels[start..start + line.len()].copy_from_slice(line);
        }
    }

    /// 8-bit RGB bytes, row-major.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|&c| color_to_rgb(c)).collect()
    }

    /// Save as an 8-bit image, format chosen by extension (`.ppm`, `.png`, ...).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        image::save_buffer(
            path,
            &self.to_rgb8(),
            self.width,
            self.height,
            image::ColorType::Rgb8,
        )?;
        Ok(())
    }
}

/// Render `world` through `camera`.
///
/// Buckets run in parallel on a pool of `config.threads` workers. Each
/// bucket checks `stop` before it starts; once it is set, remaining buckets
/// are skipped and stay at the background color. `camera` must be initialized.
pub fn render(
    world: &World,
    camera: &Camera,
    config: &RenderConfig,
    stop: &AtomicBool,
) -> Result<ImageBuffer, RenderError> {
    let buckets = generate_buckets(camera.image_width, camera.image_height, config.bucket_size);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .thread_name(|i| format!("ember-render-{}", i))
        .build()?;

    let start = Instant::now();
    let results: Vec<BucketResult> = pool.install(|| {
        buckets
            .par_iter()
            .filter_map(|bucket| {
                if stop.load(Ordering::Relaxed) {
                    return None;
                }
                let pixels = render_bucket(bucket, camera, world, config);
                Some(BucketResult::new(*bucket, pixels))
            })
            .collect()
    });

    let mut image = ImageBuffer::new(camera.image_width, camera.image_height);
    image.pixels.fill(config.background);
    for result in &results {
        image.write_bucket(result);
    }

    if results.len() < buckets.len() {
        log::info!(
            "Render stopped after {}/{} buckets in {:.2?}",
            results.len(),
            buckets.len(),
            start.elapsed()
        );
    } else {
        log::info!(
            "Rendered {}x{} ({} buckets, {} spp) in {:.2?}",
            camera.image_width,
            camera.image_height,
            buckets.len(),
            config.samples_per_pixel,
            start.elapsed()
        );
    }

    Ok(image)
}
