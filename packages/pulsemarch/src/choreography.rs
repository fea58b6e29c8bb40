//! The bundled scene and its beat-synchronised script.
//!
//! Four spheres sit around the origin under a single overhead light. The
//! script dollies the camera back, adds chrome satellites on the first drop,
//! orbits while the satellites pulse with the beat, collapses the scene,
//! cranes up to a top-down view and ends on a fade.
//!
//! Light 0 always follows the camera origin, so every camera move here also
//! flags the lights.

use std::f32::consts::TAU;

use glam::Vec3;

use crate::lighting::Light;
use crate::material::SurfaceMaterial;
use crate::musical_time::{Tempo, TimelineClock};
use crate::scene_state::{SceneState, Sphere};
use crate::timeline::{DirtyGuard, Segment, Timeline};

/// Initial camera position.
pub const START_ORIGIN: Vec3 = Vec3::new(0.0, 100.0, -200.0);

/// Everything is framed around the world origin.
pub const LOOK_TARGET: Vec3 = Vec3::ZERO;

const DOLLY_SPEED: f32 = 0.05; // units per ms
const ORBIT_RADIUS: f32 = 400.0;
const ORBIT_HEIGHT: f32 = 120.0;
const BEATS_PER_ORBIT: f32 = 16.0;
const SATELLITE_RADIUS: f32 = 20.0;
const SATELLITE_DISTANCE: f32 = 170.0;
const CRANE_HEIGHT: f32 = 600.0;

/// The four main spheres.
fn main_spheres() -> [Sphere; 4] {
    [
        Sphere::new(Vec3::new(-100.0, 0.0, 0.0), 60.0, Vec3::new(0.0, 1.0, 0.0), SurfaceMaterial::SATIN),
        Sphere::new(Vec3::new(100.0, 0.0, 0.0), 60.0, Vec3::new(1.0, 0.0, 0.0), SurfaceMaterial::GLOSS),
        Sphere::new(Vec3::new(0.0, 0.0, 100.0), 60.0, Vec3::new(1.0, 1.0, 0.0), SurfaceMaterial::CHROME),
        Sphere::new(Vec3::new(0.0, 0.0, -100.0), 60.0, Vec3::new(0.0, 0.0, 1.0), SurfaceMaterial::CHROME),
    ]
}

/// Scene shown before the first beat.
pub fn initial_scene(viewport_width: u32, viewport_height: u32) -> SceneState {
    let mut scene = SceneState::new(START_ORIGIN, LOOK_TARGET, viewport_width, viewport_height);
    scene.spheres.replace_all(&main_spheres());
    scene.lights.push(Light::new(Vec3::new(0.0, 200.0, 0.0), 1.0));
    scene
}

/// Camera position on the orbit circle at `angle` radians.
fn orbit_point(radius: f32, height: f32, angle: f32) -> Vec3 {
    Vec3::new(radius * angle.sin(), height, -radius * angle.cos())
}

/// Move the camera and drag light 0 along with it.
fn move_camera_with_light(scene: &mut SceneState, origin: Vec3) {
    scene.move_camera(origin, LOOK_TARGET);
    scene.attach_light_to_camera(0);
}

/// Beat pulse in `[0, 1]` from the centered clock phase.
fn pulse(clock: &TimelineClock) -> f32 {
    (clock.phase as f32 + 0.5).clamp(0.0, 1.0)
}

/// Fraction of the way through beats `start..end`, clamped to `[0, 1]`.
fn progress(tempo: Tempo, elapsed_ms: f64, start: f32, end: f32) -> f32 {
    let beats = tempo.ms_to_beats(elapsed_ms) as f32;
    ((beats - start) / (end - start)).clamp(0.0, 1.0)
}

/// The bundled timeline. `tempo` converts elapsed time into beats for
/// continuous motion; segment boundaries are in detected ticks.
pub fn demo_timeline(tempo: Tempo, guard: DirtyGuard) -> Timeline {
    let orbit_angle = move |elapsed_ms: f64| tempo.ms_to_beats(elapsed_ms) as f32 * TAU / BEATS_PER_ORBIT;

    Timeline::new(guard)
        // ------------------------------------------------------------ intro
        .with_segment(Segment::while_in_range("dolly", 0, 7, move |_, elapsed_ms, scene| {
            let z = START_ORIGIN.z - DOLLY_SPEED * elapsed_ms as f32;
            move_camera_with_light(scene, Vec3::new(START_ORIGIN.x, START_ORIGIN.y, z));
        }))
        // ------------------------------------------------------------ drop
        .with_segment(Segment::on_enter("satellites", 8, |_, _, scene| {
            let colors = [
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 1.0, 1.0),
                Vec3::new(1.0, 0.5, 0.0),
            ];
            for (i, color) in colors.into_iter().enumerate() {
                let angle = TAU * (i as f32 + 0.5) / 4.0;
                let center = Vec3::new(angle.cos(), 0.0, angle.sin()) * SATELLITE_DISTANCE;
                scene
                    .spheres
                    .push(Sphere::new(center, SATELLITE_RADIUS, color, SurfaceMaterial::CHROME));
            }
            scene.dirty.objects = true;

            scene.lights.push(Light::new(Vec3::new(0.0, -200.0, 0.0), 0.6));
            scene.dirty.lights = true;
        }))
        .with_segment(Segment::on_enter("recolor", 16, |_, _, scene| {
            // Rotate colors one slot along the main four
            let mut colors: Vec<Vec3> = scene.spheres.active().iter().take(4).map(|s| s.color).collect();
            colors.rotate_left(1);
            for (sphere, color) in scene.spheres.active_mut().iter_mut().zip(colors) {
                sphere.color = color;
            }
            scene.dirty.objects = true;
        }))
        .with_segment(Segment::while_in_range("orbit", 8, 23, move |clock, elapsed_ms, scene| {
            let origin = orbit_point(ORBIT_RADIUS, ORBIT_HEIGHT, orbit_angle(elapsed_ms));
            move_camera_with_light(scene, origin);

            let radius = SATELLITE_RADIUS * (1.0 + 0.75 * pulse(clock));
            for satellite in scene.spheres.active_mut().iter_mut().skip(4) {
                satellite.radius = radius;
            }
            scene.dirty.objects = true;
        }))
        // ------------------------------------------------------------ break
        .with_segment(Segment::on_enter("collapse", 24, |_, _, scene| {
            scene.spheres.set_len(4);
            scene.spheres.push(Sphere::new(
                Vec3::ZERO,
                30.0,
                Vec3::new(1.0, 1.0, 1.0),
                SurfaceMaterial::GLOSS,
            ));
            scene.dirty.objects = true;

            scene.lights.set_len(1);
            scene.dirty.lights = true;
        }))
        .with_segment(Segment::while_in_range("crane", 24, 31, move |clock, elapsed_ms, scene| {
            let t = progress(tempo, elapsed_ms, 24.0, 32.0);
            let origin = Vec3::new(
                0.0,
                ORBIT_HEIGHT + (CRANE_HEIGHT - ORBIT_HEIGHT) * t,
                // Stop just short of the pole; the target is straight below
                -(ORBIT_RADIUS * (1.0 - t) + 1.0),
            );
            move_camera_with_light(scene, origin);

            if let Some(core) = scene.spheres.get_mut(4) {
                core.radius = 30.0 + 20.0 * pulse(clock);
                scene.dirty.objects = true;
            }
        }))
        // ------------------------------------------------------------ finale
        .with_segment(Segment::on_enter("blackout", 32, |_, _, scene| {
            scene.ambient = 0.1;
            scene.dirty.lights = true;
        }))
        .with_segment(Segment::while_in_range("spread", 32, 39, move |clock, elapsed_ms, scene| {
            let origin = orbit_point(ORBIT_RADIUS * 1.5, ORBIT_HEIGHT, 2.0 * orbit_angle(elapsed_ms));
            move_camera_with_light(scene, origin);

            let spread = 1.0 + progress(tempo, elapsed_ms, 32.0, 40.0);
            let base = main_spheres();
            for (sphere, home) in scene.spheres.active_mut().iter_mut().zip(base.iter()) {
                sphere.center = home.center * spread;
            }
            if let Some(core) = scene.spheres.get_mut(4) {
                core.radius = 30.0 + 20.0 * pulse(clock);
            }
            scene.dirty.objects = true;
        }))
        .with_segment(Segment::while_in_range("fade", 40, 40, move |_, elapsed_ms, scene| {
            let t = progress(tempo, elapsed_ms, 40.0, 41.0);
            scene.ambient = 0.1 * (1.0 - t);
            if let Some(light) = scene.lights.get_mut(0) {
                light.intensity = 1.0 - t;
            }
            scene.dirty.lights = true;
        }))
}
