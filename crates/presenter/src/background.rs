use display_protocol::{
    Compositor, CompositorError, DestinationRect, ElementDesc, ElementHandle, FixedRect,
    ImageHandle, PixelFormat,
};

pub const BACKGROUND_LAYER: i32 = -1;

/// Opaque black fill behind the presented element, covering the pillarbox bars.
/// Lives for the whole display session, across mode changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundElement {
    image: ImageHandle,
    element: ElementHandle,
}

impl BackgroundElement {
    pub fn create(compositor: &mut dyn Compositor) -> Result<Self, CompositorError> {
        let physical = compositor.display_mode();
        let image = compositor.create_image(PixelFormat::Rgb565, 1, 1)?;
        let created = compositor
            .write_image(image, 2, &[0, 0])
            .and_then(|()| {
                compositor.add_element(ElementDesc {
                    layer: BACKGROUND_LAYER,
                    image,
                    source: FixedRect::whole_image(1, 1),
                    destination: DestinationRect::full_screen(physical),
                    opacity: u8::MAX,
                })
            });
        match created {
            Ok(element) => Ok(Self { image, element }),
            Err(error) => {
                let _ = compositor.delete_image(image);
                Err(error)
            }
        }
    }

    pub fn remove(self, compositor: &mut dyn Compositor) -> Result<(), CompositorError> {
        let removed = compositor.remove_element(self.element);
        let deleted = compositor.delete_image(self.image);
        removed.and(deleted)
    }

    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn element(&self) -> ElementHandle {
        self.element
    }
}
