//! Procedural scene: a variable-size set of orbiting blob influences.
//!
//! Coordinates live in a square space where the smaller viewport dimension
//! spans `[-1, 1]`, centred on the viewport. Orbit radii use the same units.

use std::ops::Range;

use glam::Vec2;

/// Number of blob slots the fragment shader is compiled with.
pub const MAX_BLOBS: usize = 20;

/// Multiplier between `time * angular_speed * global_speed` and radians.
/// Must match `ANGULAR_GAIN` in `blobs.wgsl`.
pub const ANGULAR_GAIN: f32 = 100.0;

const ORBIT_CENTER_RANGE: Range<f32> = -0.7..0.7;
const ORBIT_RADIUS_RANGE: Range<f32> = 0.1..0.6;
const ANGULAR_SPEED_RANGE: Range<f32> = 0.001..0.005;
const MAGNITUDE_RANGE: Range<f32> = 0.1..0.4;

/// One procedural motion source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobInfluence {
    pub orbit_center: Vec2,
    pub orbit_radius: f32,
    pub angular_speed: f32,
    /// Strength before the global size scaling.
    pub magnitude: f32,
}

impl BlobInfluence {
    fn random(rng: &mut fastrand::Rng) -> Self {
        Self {
            orbit_center: Vec2::new(
                sample(rng, &ORBIT_CENTER_RANGE),
                sample(rng, &ORBIT_CENTER_RANGE),
            ),
            orbit_radius: sample(rng, &ORBIT_RADIUS_RANGE),
            angular_speed: sample(rng, &ANGULAR_SPEED_RANGE),
            magnitude: sample(rng, &MAGNITUDE_RANGE),
        }
    }

    /// Where the shader places this blob at `time` seconds.
    pub fn position_at(&self, time: f32, global_speed: f32) -> Vec2 {
        let angle = time * self.angular_speed * global_speed * ANGULAR_GAIN;
        self.orbit_center + self.orbit_radius * Vec2::new(angle.cos(), angle.sin())
    }
}

fn sample(rng: &mut fastrand::Rng, range: &Range<f32>) -> f32 {
    range.start + rng.f32() * (range.end - range.start)
}

pub struct SceneModel {
    blobs: Vec<BlobInfluence>,
    rng: fastrand::Rng,
}

impl SceneModel {
    pub fn new() -> Self {
        Self {
            blobs: Vec::with_capacity(MAX_BLOBS),
            rng: fastrand::Rng::new(),
        }
    }

    /// Deterministic blob generation, for offline renders and tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            blobs: Vec::with_capacity(MAX_BLOBS),
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Grows or shrinks the blob list to `desired` (capped at `MAX_BLOBS`).
    ///
    /// Growth appends freshly randomized blobs; shrinking truncates from the
    /// tail. Blobs that survive are never touched. Returns the new length.
    pub fn reconcile(&mut self, desired: usize) -> usize {
        let target = if desired > MAX_BLOBS {
            log::warn!("requested {} blobs, engine limit is {}", desired, MAX_BLOBS);
            MAX_BLOBS
        } else {
            desired
        };

        let current = self.blobs.len();
        if target > current {
            for _ in current..target {
                let blob = BlobInfluence::random(&mut self.rng);
                self.blobs.push(blob);
            }
            log::debug!("scene grew from {} to {} blobs", current, target);
        } else if target < current {
            self.blobs.truncate(target);
            log::debug!("scene shrank from {} to {} blobs", current, target);
        }
        self.blobs.len()
    }

    pub fn snapshot(&self) -> &[BlobInfluence] {
        &self.blobs
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn clear(&mut self) {
        self.blobs.clear();
    }
}

impl Default for SceneModel {
    fn default() -> Self {
        Self::new()
    }
}
