//! CPU implementation of the compositor.
//!
//! Images are kept in their native encoding. Every element operation is a
//! display update that recomposites all elements, lowest layer first, into an
//! RGBA scanout at the physical resolution with nearest-neighbour scaling.
//! `capture_display` returns the scanout of the most recent update.

use display_protocol::pixel::decode_pixel;
use display_protocol::{
    Compositor, CompositorError, DisplayCapture, ElementDesc, ElementHandle, FIXED_POINT_SHIFT,
    ImageHandle, PaletteTable, PhysicalMode, PixelFormat, Rgb8, validate_upload,
};
use slotmap::SlotMap;

#[derive(Debug)]
struct SoftImage {
    format: PixelFormat,
    width: u32,
    height: u32,
    /// Tightly packed rows.
    pixels: Vec<u8>,
    palette: PaletteTable,
}

impl SoftImage {
    fn texel(&self, x: u32, y: u32) -> Rgb8 {
        let bytes_per_pixel = self.format.bytes_per_pixel();
        let offset = y as usize * self.format.row_bytes(self.width) + x as usize * bytes_per_pixel;
        decode_pixel(
            self.format,
            &self.pixels[offset..offset + bytes_per_pixel],
            &self.palette,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct SoftElement {
    desc: ElementDesc,
    sequence: u64,
}

/// Operation counters, for asserting how the display was driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub images_created: u64,
    pub images_deleted: u64,
    pub image_writes: u64,
    pub palette_writes: u64,
    pub elements_added: u64,
    pub source_changes: u64,
    pub elements_removed: u64,
    pub display_updates: u64,
}

#[derive(Debug)]
pub struct SoftCompositor {
    physical: PhysicalMode,
    images: SlotMap<ImageHandle, SoftImage>,
    elements: SlotMap<ElementHandle, SoftElement>,
    next_sequence: u64,
    scanout: Vec<u8>,
    stats: CompositorStats,
    image_creation_budget: Option<usize>,
}

impl SoftCompositor {
    pub fn new(physical: PhysicalMode) -> Self {
        let mut compositor = Self {
            physical,
            images: SlotMap::with_key(),
            elements: SlotMap::with_key(),
            next_sequence: 0,
            scanout: Vec::new(),
            stats: CompositorStats::default(),
            image_creation_budget: None,
        };
        compositor.recomposite();
        compositor
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, element: ElementHandle) -> Option<&ElementDesc> {
        self.elements.get(element).map(|element| &element.desc)
    }

    pub fn image_palette(&self, image: ImageHandle) -> Option<&PaletteTable> {
        self.images.get(image).map(|image| &image.palette)
    }

    /// Tightly packed native pixels of `image`.
    pub fn image_pixels(&self, image: ImageHandle) -> Option<&[u8]> {
        self.images.get(image).map(|image| image.pixels.as_slice())
    }

    /// Lets the next `successes` image creations succeed and fails every one
    /// after that with a backend error. Used to exercise rollback paths.
    pub fn limit_image_creation(&mut self, successes: usize) {
        self.image_creation_budget = Some(successes);
    }

    fn display_update(&mut self) {
        self.stats.display_updates += 1;
        self.recomposite();
    }

    fn recomposite(&mut self) {
        let width = self.physical.width as usize;
        let height = self.physical.height as usize;
        self.scanout.clear();
        self.scanout.resize(width * height * 4, 0);
        for pixel in self.scanout.chunks_exact_mut(4) {
            pixel[3] = u8::MAX;
        }

        let mut order: Vec<SoftElement> = self.elements.values().copied().collect();
        order.sort_by_key(|element| (element.desc.layer, element.sequence));

        for element in order {
            let Some(image) = self.images.get(element.desc.image) else {
                continue;
            };
            blit_element(&mut self.scanout, self.physical, &element.desc, image);
        }
    }
}

fn blit_element(scanout: &mut [u8], physical: PhysicalMode, desc: &ElementDesc, image: &SoftImage) {
    let destination = desc.destination;
    if destination.width == 0 || destination.height == 0 {
        return;
    }
    let right = destination.right().min(physical.width);
    let bottom = destination.bottom().min(physical.height);
    let alpha = u32::from(desc.opacity);

    for y in destination.y..bottom {
        let source_y = sample_coordinate(
            desc.source.y,
            desc.source.height,
            y - destination.y,
            destination.height,
            image.height,
        );
        for x in destination.x..right {
            let source_x = sample_coordinate(
                desc.source.x,
                desc.source.width,
                x - destination.x,
                destination.width,
                image.width,
            );
            let color = image.texel(source_x, source_y);
            let offset = (y as usize * physical.width as usize + x as usize) * 4;
            let pixel = &mut scanout[offset..offset + 4];
            pixel[0] = blend(color.r, pixel[0], alpha);
            pixel[1] = blend(color.g, pixel[1], alpha);
            pixel[2] = blend(color.b, pixel[2], alpha);
        }
    }
}

/// Maps the centre of destination pixel `offset` back into the 16.16 source
/// span and returns the image pixel it lands on.
fn sample_coordinate(
    source_origin: u32,
    source_extent: u32,
    offset: u32,
    destination_extent: u32,
    image_extent: u32,
) -> u32 {
    let fixed = u64::from(source_origin)
        + (u64::from(2 * offset + 1) * u64::from(source_extent))
            / (2 * u64::from(destination_extent));
    let pixel = fixed >> FIXED_POINT_SHIFT;
    pixel.min(u64::from(image_extent.saturating_sub(1))) as u32
}

fn blend(source: u8, destination: u8, alpha: u32) -> u8 {
    ((u32::from(source) * alpha + u32::from(destination) * (255 - alpha) + 127) / 255) as u8
}

impl Compositor for SoftCompositor {
    fn display_mode(&self) -> PhysicalMode {
        self.physical
    }

    fn create_image(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<ImageHandle, CompositorError> {
        if width == 0 || height == 0 {
            return Err(CompositorError::ZeroSizedImage);
        }
        if let Some(budget) = self.image_creation_budget.as_mut() {
            if *budget == 0 {
                return Err(CompositorError::Backend("image creation refused".to_owned()));
            }
            *budget -= 1;
        }
        self.stats.images_created += 1;
        Ok(self.images.insert(SoftImage {
            format,
            width,
            height,
            pixels: vec![0; format.row_bytes(width) * height as usize],
            palette: PaletteTable::default(),
        }))
    }

    fn write_image(
        &mut self,
        image: ImageHandle,
        pitch: usize,
        pixels: &[u8],
    ) -> Result<(), CompositorError> {
        let target = self
            .images
            .get_mut(image)
            .ok_or(CompositorError::UnknownImage)?;
        validate_upload(target.format, target.width, target.height, pitch, pixels)?;
        let row_bytes = target.format.row_bytes(target.width);
        for (row, destination) in target.pixels.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * pitch;
            destination.copy_from_slice(&pixels[start..start + row_bytes]);
        }
        self.stats.image_writes += 1;
        Ok(())
    }

    fn set_image_palette(
        &mut self,
        image: ImageHandle,
        palette: &PaletteTable,
    ) -> Result<(), CompositorError> {
        let target = self
            .images
            .get_mut(image)
            .ok_or(CompositorError::UnknownImage)?;
        if !target.format.is_indexed() {
            return Err(CompositorError::PaletteOnDirectColorImage);
        }
        target.palette = palette.clone();
        self.stats.palette_writes += 1;
        Ok(())
    }

    fn delete_image(&mut self, image: ImageHandle) -> Result<(), CompositorError> {
        self.images
            .remove(image)
            .ok_or(CompositorError::UnknownImage)?;
        self.stats.images_deleted += 1;
        Ok(())
    }

    fn add_element(&mut self, element: ElementDesc) -> Result<ElementHandle, CompositorError> {
        if !self.images.contains_key(element.image) {
            return Err(CompositorError::UnknownImage);
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let handle = self.elements.insert(SoftElement {
            desc: element,
            sequence,
        });
        self.stats.elements_added += 1;
        self.display_update();
        Ok(handle)
    }

    fn change_element_source(
        &mut self,
        element: ElementHandle,
        image: ImageHandle,
    ) -> Result<(), CompositorError> {
        if !self.images.contains_key(image) {
            return Err(CompositorError::UnknownImage);
        }
        let target = self
            .elements
            .get_mut(element)
            .ok_or(CompositorError::UnknownElement)?;
        target.desc.image = image;
        self.stats.source_changes += 1;
        self.display_update();
        Ok(())
    }

    fn remove_element(&mut self, element: ElementHandle) -> Result<(), CompositorError> {
        self.elements
            .remove(element)
            .ok_or(CompositorError::UnknownElement)?;
        self.stats.elements_removed += 1;
        self.display_update();
        Ok(())
    }

    fn capture_display(&mut self) -> Result<DisplayCapture, CompositorError> {
        Ok(DisplayCapture {
            width: self.physical.width,
            height: self.physical.height,
            rgba: self.scanout.clone(),
        })
    }
}
