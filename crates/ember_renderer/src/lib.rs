//! Ember Renderer - bucketed CPU preview rendering.
//!
//! Splits the image into buckets rendered center-out on a rayon pool. Every
//! ray goes through [`World::intersect`](ember_core::World::intersect), so
//! the scene can be edited and its top-level tree rebuilt between frames.

mod bucket;
mod camera;
mod renderer;

pub use bucket::{generate_buckets, render_bucket, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
pub use camera::Camera;
pub use renderer::{
    color_to_rgb, render, render_pixel, shade, Color, ImageBuffer, RenderConfig, RenderError,
};

pub use ember_math::Vec3;
