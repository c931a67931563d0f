//! Double-buffered presentation of a RAM framebuffer through a hardware compositor.
//!
//! The pipeline owns two compositor images at the logical resolution and one
//! on-screen element scaled onto the physical mode. Each present copies the
//! whole logical buffer into the image that is not on screen, then rebinds the
//! element to it, so a half-written image is never visible.

use display_protocol::{
    Compositor, CompositorError, DestinationRect, ElementDesc, ElementHandle, FixedRect, ImageHandle,
    MAX_IMAGE_DIMENSION, PhysicalMode, PixelFormat, Rgb8,
};

mod background;
mod error;
mod geometry;
mod palette;
mod surface;

pub use background::{BACKGROUND_LAYER, BackgroundElement};
pub use error::{ConfigurationError, PipelineError, ResourceExhaustion};
pub use geometry::{AspectRatioPolicy, GeometryError, resolve_destination};
pub use palette::PaletteMapper;
pub use surface::{SharedSurface, SurfaceMemory};

pub const SURFACE_ALIGNMENT: usize = 16;
pub const PRESENT_LAYER: i32 = 0;

/// Requested surface geometry after validation and alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    pub format: PixelFormat,
    /// Row stride in bytes; the width rounded up to 16 pixels.
    pub pitch: usize,
    /// Height rounded up to 16 rows.
    pub aligned_rows: usize,
}

impl LogicalMode {
    pub fn new(width: u32, height: u32, bits_per_pixel: u8) -> Result<Self, ConfigurationError> {
        if width == 0 || height == 0 {
            return Err(ConfigurationError::ZeroSize { width, height });
        }
        if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
            return Err(ConfigurationError::TooLarge {
                width,
                height,
                max: MAX_IMAGE_DIMENSION,
            });
        }
        let format = PixelFormat::from_bits_per_pixel(bits_per_pixel)
            .ok_or(ConfigurationError::UnsupportedBitsPerPixel(bits_per_pixel))?;
        Ok(Self {
            width,
            height,
            bits_per_pixel,
            format,
            pitch: (width as usize).next_multiple_of(SURFACE_ALIGNMENT) * format.bytes_per_pixel(),
            aligned_rows: (height as usize).next_multiple_of(SURFACE_ALIGNMENT),
        })
    }

    pub fn primary_bytes(&self) -> usize {
        self.pitch * self.aligned_rows
    }

    pub fn row_bytes(&self) -> usize {
        self.format.row_bytes(self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    pub frame_sequence_id: u64,
    /// Index of the image now on screen.
    pub active_index: usize,
}

#[derive(Debug)]
pub struct ActiveMode {
    logical: LogicalMode,
    surface: SharedSurface,
    images: [ImageHandle; 2],
    active_index: usize,
    element: ElementHandle,
    destination: DestinationRect,
    palette: PaletteMapper,
    frames_presented: u64,
}

impl ActiveMode {
    pub fn logical(&self) -> &LogicalMode {
        &self.logical
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn images(&self) -> [ImageHandle; 2] {
        self.images
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn displayed_image(&self) -> ImageHandle {
        self.images[self.active_index]
    }

    pub fn element(&self) -> ElementHandle {
        self.element
    }

    pub fn destination(&self) -> DestinationRect {
        self.destination
    }

    pub fn palette(&self) -> &PaletteMapper {
        &self.palette
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

pub struct PresentationPipeline {
    physical: PhysicalMode,
    aspect_ratio: AspectRatioPolicy,
    mode: Option<ActiveMode>,
    background: Option<BackgroundElement>,
}

impl PresentationPipeline {
    pub fn new(physical: PhysicalMode, aspect_ratio: AspectRatioPolicy) -> Self {
        Self {
            physical,
            aspect_ratio,
            mode: None,
            background: None,
        }
    }

    pub fn physical_mode(&self) -> PhysicalMode {
        self.physical
    }

    pub fn aspect_ratio(&self) -> AspectRatioPolicy {
        self.aspect_ratio
    }

    pub fn active_mode(&self) -> Option<&ActiveMode> {
        self.mode.as_ref()
    }

    pub fn background(&self) -> Option<&BackgroundElement> {
        self.background.as_ref()
    }

    /// Replaces the current mode. On failure nothing of the new mode remains
    /// and the previous mode is already gone.
    pub fn set_mode(
        &mut self,
        compositor: &mut dyn Compositor,
        width: u32,
        height: u32,
        bits_per_pixel: u8,
        offscreen_pool_bytes: usize,
    ) -> Result<&ActiveMode, PipelineError> {
        self.teardown(compositor)?;

        let logical = LogicalMode::new(width, height, bits_per_pixel)?;
        let destination = resolve_destination(width, height, self.physical, self.aspect_ratio)?;
        let memory = SurfaceMemory::allocate(logical.pitch, logical.aligned_rows, offscreen_pool_bytes)?;

        let mode = build_mode(compositor, logical, destination, memory)?;
        if self.aspect_ratio == AspectRatioPolicy::Preserve && self.background.is_none() {
            match BackgroundElement::create(compositor) {
                Ok(background) => self.background = Some(background),
                Err(error) => {
                    if let Err(release_error) = release_mode(compositor, mode) {
                        eprintln!("[presenter] rollback of mode {width}x{height} failed: {release_error}");
                    }
                    return Err(error.into());
                }
            }
        }

        eprintln!(
            "[presenter] mode set: {}x{}x{} pitch={} destination={}x{}+{}+{}",
            logical.width,
            logical.height,
            logical.bits_per_pixel,
            logical.pitch,
            destination.width,
            destination.height,
            destination.x,
            destination.y
        );
        Ok(self.mode.insert(mode))
    }

    /// Publishes the whole logical buffer. The copy goes into the image that
    /// is not on screen; the element is rebound only after the copy returns.
    pub fn present(
        &mut self,
        compositor: &mut dyn Compositor,
    ) -> Result<PresentedFrame, PipelineError> {
        let mode = self.mode.as_mut().ok_or(PipelineError::NoActiveMode)?;
        let target = 1 - mode.active_index;
        {
            let memory = mode.surface.lock();
            compositor.write_image(mode.images[target], mode.logical.pitch, memory.primary_pixels())?;
        }
        compositor.change_element_source(mode.element, mode.images[target])?;
        mode.active_index = target;
        mode.frames_presented += 1;
        Ok(PresentedFrame {
            frame_sequence_id: mode.frames_presented,
            active_index: target,
        })
    }

    /// Updates palette entries. Indexed modes push the full table to both
    /// images; direct color modes only keep the colors.
    pub fn set_colors(
        &mut self,
        compositor: &mut dyn Compositor,
        first: usize,
        colors: &[Rgb8],
    ) -> Result<(), PipelineError> {
        let mode = self.mode.as_mut().ok_or(PipelineError::NoActiveMode)?;
        let table = mode.palette.set_colors(first, colors)?;
        if mode.logical.format.is_indexed() {
            for image in mode.images {
                compositor.set_image_palette(image, table)?;
            }
        }
        Ok(())
    }

    /// Removes the current mode's element and images and drops its memory.
    /// The background stays for the rest of the session.
    pub fn teardown(&mut self, compositor: &mut dyn Compositor) -> Result<(), PipelineError> {
        match self.mode.take() {
            Some(mode) => release_mode(compositor, mode).map_err(PipelineError::from),
            None => Ok(()),
        }
    }

    pub fn close_session(&mut self, compositor: &mut dyn Compositor) -> Result<(), PipelineError> {
        let torn_down = self.teardown(compositor);
        let background_removed = match self.background.take() {
            Some(background) => background.remove(compositor).map_err(PipelineError::from),
            None => Ok(()),
        };
        torn_down.and(background_removed)
    }
}

fn build_mode(
    compositor: &mut dyn Compositor,
    logical: LogicalMode,
    destination: DestinationRect,
    memory: SurfaceMemory,
) -> Result<ActiveMode, PipelineError> {
    let mut images = Vec::with_capacity(2);
    match create_mode_resources(compositor, &logical, destination, &mut images) {
        Ok((element, palette)) => Ok(ActiveMode {
            logical,
            surface: SharedSurface::new(memory),
            images: [images[0], images[1]],
            active_index: 0,
            element,
            destination,
            palette,
            frames_presented: 0,
        }),
        Err(error) => {
            for image in images {
                if let Err(delete_error) = compositor.delete_image(image) {
                    eprintln!("[presenter] rollback could not delete image {image:?}: {delete_error}");
                }
            }
            Err(PipelineError::Compositor(error))
        }
    }
}

/// Creates both images and the element bound to the first. Every created
/// image is pushed to `images` so the caller can roll back.
fn create_mode_resources(
    compositor: &mut dyn Compositor,
    logical: &LogicalMode,
    destination: DestinationRect,
    images: &mut Vec<ImageHandle>,
) -> Result<(ElementHandle, PaletteMapper), CompositorError> {
    for _ in 0..2 {
        images.push(compositor.create_image(logical.format, logical.width, logical.height)?);
    }
    let palette = PaletteMapper::new();
    if logical.format.is_indexed() {
        for image in images.iter() {
            compositor.set_image_palette(*image, palette.table())?;
        }
    }
    let element = compositor.add_element(ElementDesc {
        layer: PRESENT_LAYER,
        image: images[0],
        source: FixedRect::whole_image(logical.width, logical.height),
        destination,
        opacity: u8::MAX,
    })?;
    Ok((element, palette))
}

fn release_mode(
    compositor: &mut dyn Compositor,
    mode: ActiveMode,
) -> Result<(), CompositorError> {
    let mut first_error = compositor.remove_element(mode.element).err();
    for image in mode.images {
        if let Err(error) = compositor.delete_image(image) {
            first_error.get_or_insert(error);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
