//! Instanced scene example.
//!
//! Builds one torus mesh, scatters rotated copies of it and a few spheres
//! across a ground quad, renders a preview, then moves an instance, rebuilds
//! the top level and renders again.
//!
//! Run with `RUST_LOG=debug cargo run --release --example instanced_scene [output.ppm]`.

use std::f32::consts::TAU;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use ember_core::{Instance, Mesh, Sphere, Transform, World};
use ember_math::{EulerRot, Quat, Vec2, Vec3};
use ember_renderer::{render, Camera, RenderConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output = std::env::args().nth(1).unwrap_or_else(|| "instanced_scene.ppm".to_string());

    let mut world = build_scene()?;
    world.compute_accels(0)?;
    world.update_toplevel_bvh();
    log::info!(
        "Scene: {} meshes, {} spheres, {} instances",
        world.geometry().meshes.len(),
        world.geometry().spheres.len(),
        world.instance_count()
    );

    let mut camera = Camera::new()
        .with_resolution(640, 360)
        .with_position(Vec3::new(0.0, 9.0, 22.0), Vec3::new(0.0, 0.0, 0.0), Vec3::Y)
        .with_fov(40.0);
    camera.initialize();

    let config = RenderConfig::default().with_samples(8);
    let stop = AtomicBool::new(false);

    let image = render(&world, &camera, &config, &stop)?;
    image.save(&output)?;
    log::info!("Saved {}", output);

    // Lift the first torus and render the updated scene
    world.set_instance_transform(
        1,
        Transform::from_scale_rotation_translation(Vec3::ONE, Quat::from_rotation_x(0.5), Vec3::new(0.0, 4.0, 0.0)),
    )?;
    world.update_toplevel_bvh();

    let moved = render(&world, &camera, &config, &stop)?;
    let moved_output = output.replace(".ppm", "_moved.ppm");
    moved.save(&moved_output)?;
    log::info!("Saved {}", moved_output);

    Ok(())
}

fn build_scene() -> Result<World> {
    let mut world = World::new();

    let ground = world.add_mesh(ground_quad(30.0)?);
    let torus = world.add_mesh(torus(1.5, 0.5, 48, 24)?);
    let sphere = world.add_sphere(Sphere::new(1.0));

    world.add_instance(Instance::mesh(ground))?;

    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..24 {
        let angle = i as f32 / 24.0 * TAU;
        let radius = 4.0 + (i % 3) as f32 * 3.0;
        let position = Vec3::new(angle.cos() * radius, 1.0, angle.sin() * radius);
        let rotation = Quat::from_euler(EulerRot::YXZ, rng.gen_range(0.0..TAU), rng.gen_range(0.0..TAU), 0.0);

        let instance = if i % 4 == 3 {
            Instance::sphere(sphere).with_transform(Transform::from_translation(position))
        } else {
            Instance::mesh(torus).with_transform(Transform::from_scale_rotation_translation(
                Vec3::splat(rng.gen_range(0.6..1.2)),
                rotation,
                position,
            ))
        };
        world.add_instance(instance)?;
    }

    Ok(world)
}

/// Ground quad in the XZ plane.
fn ground_quad(half: f32) -> Result<Mesh> {
    let positions = vec![
        Vec3::new(-half, 0.0, -half),
        Vec3::new(half, 0.0, -half),
        Vec3::new(half, 0.0, half),
        Vec3::new(-half, 0.0, half),
    ];
    let uvs = vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
    Ok(Mesh::new("ground", positions, vec![0, 2, 1, 0, 3, 2])?
        .with_normals(vec![Vec3::Y; 4])?
        .with_uvs(uvs)?)
}

/// Torus around the Y axis with smooth normals.
fn torus(major: f32, minor: f32, rings: u32, sides: u32) -> Result<Mesh> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();

    for ring in 0..rings {
        let u = ring as f32 / rings as f32;
        let (sin_u, cos_u) = (u * TAU).sin_cos();
        let ring_center = Vec3::new(cos_u * major, 0.0, sin_u * major);

        for side in 0..sides {
            let v = side as f32 / sides as f32;
            let (sin_v, cos_v) = (v * TAU).sin_cos();
            let normal = Vec3::new(cos_u * cos_v, sin_v, sin_u * cos_v);
            positions.push(ring_center + normal * minor);
            normals.push(normal);
            uvs.push(Vec2::new(u, v));
        }
    }

    let mut indices = Vec::with_capacity((rings * sides * 6) as usize);
    for ring in 0..rings {
        let next_ring = (ring + 1) % rings;
        for side in 0..sides {
            let next_side = (side + 1) % sides;
            let a = ring * sides + side;
            let b = next_ring * sides + side;
            let c = next_ring * sides + next_side;
            let d = ring * sides + next_side;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }

    Ok(Mesh::new("torus", positions, indices)?
        .with_normals(normals)?
        .with_uvs(uvs)?)
}
