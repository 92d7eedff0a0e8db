use bytemuck::{Pod, Zeroable};

/// Vertices in the full-viewport quad: two triangles.
pub const QUAD_VERTEX_COUNT: u32 = 6;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    const fn new(x: f32, y: f32) -> Self {
        Self { position: [x, y] }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// Clip-space quad covering the whole viewport, counter-clockwise.
pub const FULLSCREEN_QUAD: [QuadVertex; QUAD_VERTEX_COUNT as usize] = [
    // Lower-right triangle
    QuadVertex::new(-1.0, -1.0),
    QuadVertex::new(1.0, -1.0),
    QuadVertex::new(1.0, 1.0),
    // Upper-left triangle
    QuadVertex::new(-1.0, -1.0),
    QuadVertex::new(1.0, 1.0),
    QuadVertex::new(-1.0, 1.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_area(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
        0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]))
    }

    #[test]
    fn test_quad_covers_clip_space() {
        let total: f32 = FULLSCREEN_QUAD
            .chunks(3)
            .map(|t| signed_area(t[0].position, t[1].position, t[2].position))
            .sum();
        // Clip space is 2x2; both triangles wind counter-clockwise.
        assert_eq!(total, 4.0);
        for t in FULLSCREEN_QUAD.chunks(3) {
            assert!(signed_area(t[0].position, t[1].position, t[2].position) > 0.0);
        }
    }
}
