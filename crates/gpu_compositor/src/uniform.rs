use bytemuck::{Pod, Zeroable};
use display_protocol::{ElementDesc, FIXED_POINT_SHIFT, PhysicalMode};

/// Matches `ElementParams` in `element_quad.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct ElementUniform {
    pub destination: [f32; 4],
    pub source: [f32; 4],
    pub opacity: [f32; 4],
}

impl ElementUniform {
    pub(crate) fn new(
        desc: &ElementDesc,
        image_width: u32,
        image_height: u32,
        physical: PhysicalMode,
    ) -> Self {
        let physical_width = physical.width as f32;
        let physical_height = physical.height as f32;
        let destination = desc.destination;
        let fixed_one = (1u32 << FIXED_POINT_SHIFT) as f32;
        let source_width = image_width as f32 * fixed_one;
        let source_height = image_height as f32 * fixed_one;

        Self {
            destination: [
                destination.x as f32 / physical_width * 2.0 - 1.0,
                1.0 - destination.y as f32 / physical_height * 2.0,
                destination.right() as f32 / physical_width * 2.0 - 1.0,
                1.0 - destination.bottom() as f32 / physical_height * 2.0,
            ],
            source: [
                desc.source.x as f32 / source_width,
                desc.source.y as f32 / source_height,
                (desc.source.x as f32 + desc.source.width as f32) / source_width,
                (desc.source.y as f32 + desc.source.height as f32) / source_height,
            ],
            opacity: [f32::from(desc.opacity) / 255.0, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use display_protocol::{DestinationRect, FixedRect};

    use super::*;

    fn desc(destination: DestinationRect, source: FixedRect) -> ElementDesc {
        ElementDesc {
            layer: 0,
            image: Default::default(),
            source,
            destination,
            opacity: 255,
        }
    }

    #[test]
    fn uniform_layout_is_three_vec4() {
        assert_eq!(std::mem::size_of::<ElementUniform>(), 48);
    }

    #[test]
    fn full_screen_element_covers_clip_space() {
        let physical = PhysicalMode {
            width: 1920,
            height: 1080,
        };
        let uniform = ElementUniform::new(
            &desc(DestinationRect::full_screen(physical), FixedRect::whole_image(640, 480)),
            640,
            480,
            physical,
        );
        assert_eq!(uniform.destination, [-1.0, 1.0, 1.0, -1.0]);
        assert_eq!(uniform.source, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(uniform.opacity[0], 1.0);
    }

    #[test]
    fn pillarboxed_element_maps_offset_to_clip_space() {
        let physical = PhysicalMode {
            width: 1920,
            height: 1080,
        };
        let destination = DestinationRect {
            x: 240,
            y: 0,
            width: 1440,
            height: 1080,
        };
        let uniform = ElementUniform::new(
            &desc(destination, FixedRect::whole_image(640, 480)),
            640,
            480,
            physical,
        );
        assert_eq!(uniform.destination, [-0.75, 1.0, 0.75, -1.0]);
    }
}
