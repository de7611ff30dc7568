//! Pinhole camera for primary rays.

use ember_math::{Ray, Vec3};
use rand::{Rng, RngCore};

/// Camera for generating rays into the scene.
#[derive(Debug, Clone)]
pub struct Camera {
    pub image_width: u32,
    pub image_height: u32,

    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,
    /// Vertical field of view in degrees
    vfov: f32,

    // Set by initialize()
    pixel00_loc: Vec3,
    pixel_delta_u: Vec3,
    pixel_delta_v: Vec3,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            image_width: 640,
            image_height: 360,
            look_from: Vec3::ZERO,
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::Y,
            vfov: 90.0,
            pixel00_loc: Vec3::ZERO,
            pixel_delta_u: Vec3::ZERO,
            pixel_delta_v: Vec3::ZERO,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.image_width = width;
        self.image_height = height;
        self
    }

    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self
    }

    /// Vertical field of view in degrees.
    pub fn with_fov(mut self, vfov: f32) -> Self {
        self.vfov = vfov;
        self
    }

    /// Compute the image plane (must be called before generating rays).
    pub fn initialize(&mut self) {
        let h = (self.vfov.to_radians() / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = viewport_height * (self.image_width as f32 / self.image_height as f32);

        let w = (self.look_from - self.look_at).normalize();
        let u = self.vup.cross(w).normalize();
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;

        self.pixel_delta_u = viewport_u / self.image_width as f32;
        self.pixel_delta_v = viewport_v / self.image_height as f32;

        let viewport_upper_left = self.look_from - w - viewport_u / 2.0 - viewport_v / 2.0;
        self.pixel00_loc = viewport_upper_left + 0.5 * (self.pixel_delta_u + self.pixel_delta_v);
    }

    /// Ray through pixel (i, j), jittered within the pixel.
    pub fn get_ray(&self, i: u32, j: u32, rng: &mut dyn RngCore) -> Ray {
        let dx = rng.gen::<f32>() - 0.5;
        let dy = rng.gen::<f32>() - 0.5;

        let pixel_sample = self.pixel00_loc
            + (i as f32 + dx) * self.pixel_delta_u
            + (j as f32 + dy) * self.pixel_delta_v;

        Ray::new(self.look_from, pixel_sample - self.look_from)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
