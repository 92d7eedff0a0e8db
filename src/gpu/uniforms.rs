//! CPU-side layout of the fragment shader's uniform block.
//!
//! Field order and padding follow WGSL uniform alignment rules and must match
//! the `Uniforms` struct declared in every built-in fragment shader.

use bytemuck::{Pod, Zeroable};

use crate::params::ParamSnapshot;
use crate::scene::{BlobInfluence, MAX_BLOBS};

/// One blob slot: `orbit = (cx, cy, path_radius, speed)`,
/// `shape = (radius, 0, 0, 0)`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct GpuBlob {
    pub orbit: [f32; 4],
    pub shape: [f32; 4],
}

impl From<&BlobInfluence> for GpuBlob {
    fn from(blob: &BlobInfluence) -> Self {
        Self {
            orbit: [
                blob.orbit_center.x,
                blob.orbit_center.y,
                blob.orbit_radius,
                blob.angular_speed,
            ],
            shape: [blob.magnitude, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2], // 8 bytes
    pub time: f32,            // 4 bytes
    pub size: f32,            // 4 bytes
    pub blob_color: [f32; 4], // 16 bytes
    pub bg_color: [f32; 4],   // 16 bytes
    pub speed: f32,           // 4 bytes
    pub count: u32,           // 4 bytes
    pub _padding: [f32; 2],   // 8 bytes (16-byte alignment for the array)
    pub blobs: [GpuBlob; MAX_BLOBS],
}
// Total: 64 + 32 * MAX_BLOBS = 704 bytes

impl FrameUniforms {
    pub fn compose(
        params: &ParamSnapshot,
        blobs: &[BlobInfluence],
        viewport: (u32, u32),
        time: f32,
    ) -> Self {
        let mut slots = [GpuBlob::zeroed(); MAX_BLOBS];
        let count = blobs.len().min(MAX_BLOBS);
        for (slot, blob) in slots.iter_mut().zip(blobs) {
            *slot = GpuBlob::from(blob);
        }

        Self {
            resolution: [viewport.0 as f32, viewport.1 as f32],
            time,
            size: params.global_size,
            blob_color: params.blob_color.to_vec4(),
            bg_color: params.background_color.to_vec4(),
            speed: params.global_speed,
            count: count as u32,
            _padding: [0.0; 2],
            blobs: slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterStore;
    use crate::scene::SceneModel;

    #[test]
    fn test_layout_size() {
        assert_eq!(std::mem::size_of::<GpuBlob>(), 32);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 704);
        assert_eq!(std::mem::offset_of!(FrameUniforms, blobs), 64);
    }

    #[test]
    fn test_compose_copies_scene_and_params() {
        let store = ParameterStore::new();
        store.set_blob_count(3);
        let mut scene = SceneModel::with_seed(5);
        scene.reconcile(3);

        let u = FrameUniforms::compose(&store.snapshot(), scene.snapshot(), (640, 480), 1.5);
        assert_eq!(u.count, 3);
        assert_eq!(u.resolution, [640.0, 480.0]);
        assert_eq!(u.time, 1.5);
        let first = &scene.snapshot()[0];
        assert_eq!(u.blobs[0].orbit[0], first.orbit_center.x);
        assert_eq!(u.blobs[0].orbit[2], first.orbit_radius);
        assert_eq!(u.blobs[0].shape[0], first.magnitude);
        assert_eq!(u.blobs[3], GpuBlob::zeroed());
    }
}
