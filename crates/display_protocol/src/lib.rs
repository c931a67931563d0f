//! Vocabulary shared between the presentation core and compositor backends.
//!
//! The hardware compositor is an external collaborator. Everything the core
//! needs from it is expressed by the [`Compositor`] trait: image resources at
//! the logical resolution, on-screen elements that scale an image onto the
//! fixed physical mode, and a capture of what the display currently shows.

use std::fmt;

pub mod pixel;

slotmap::new_key_type! {
    pub struct ImageHandle;
    pub struct ElementHandle;
}

/// Shift used by the compositor's 16.16 fixed-point source rectangles.
pub const FIXED_POINT_SHIFT: u32 = 16;
/// Largest image dimension a 16.16 source rectangle can describe.
pub const MAX_IMAGE_DIMENSION: u32 = u32::MAX >> FIXED_POINT_SHIFT;

pub const PALETTE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Indexed8,
    Rgb565,
    Xrgb8888,
}

impl PixelFormat {
    pub const fn from_bits_per_pixel(bits_per_pixel: u8) -> Option<Self> {
        match bits_per_pixel {
            8 => Some(PixelFormat::Indexed8),
            16 => Some(PixelFormat::Rgb565),
            32 => Some(PixelFormat::Xrgb8888),
            _ => None,
        }
    }

    pub const fn bits_per_pixel(self) -> u8 {
        match self {
            PixelFormat::Indexed8 => 8,
            PixelFormat::Rgb565 => 16,
            PixelFormat::Xrgb8888 => 32,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Indexed8 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Xrgb8888 => 4,
        }
    }

    pub const fn is_indexed(self) -> bool {
        matches!(self, PixelFormat::Indexed8)
    }

    pub const fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

/// The single mode the physical display was booted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalMode {
    pub width: u32,
    pub height: u32,
}

/// Region of the physical display, in physical pixels, that an element covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DestinationRect {
    pub const fn full_screen(mode: PhysicalMode) -> Self {
        Self {
            x: 0,
            y: 0,
            width: mode.width,
            height: mode.height,
        }
    }

    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// Source rectangle in 16.16 fixed-point image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FixedRect {
    /// Panics if either dimension exceeds [`MAX_IMAGE_DIMENSION`].
    pub const fn whole_image(width: u32, height: u32) -> Self {
        assert!(
            width <= MAX_IMAGE_DIMENSION && height <= MAX_IMAGE_DIMENSION,
            "image dimension does not fit 16.16 fixed point"
        );
        Self {
            x: 0,
            y: 0,
            width: width << FIXED_POINT_SHIFT,
            height: height << FIXED_POINT_SHIFT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 256 palette entries in the hardware's native RGB565 encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct PaletteTable([u16; PALETTE_ENTRIES]);

impl PaletteTable {
    pub const fn from_entries(entries: [u16; PALETTE_ENTRIES]) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[u16; PALETTE_ENTRIES] {
        &self.0
    }

    pub fn entry(&self, index: u8) -> u16 {
        self.0[index as usize]
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self([0; PALETTE_ENTRIES])
    }
}

impl fmt::Debug for PaletteTable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_black = self.0.iter().filter(|entry| **entry != 0).count();
        formatter
            .debug_struct("PaletteTable")
            .field("non_black_entries", &non_black)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementDesc {
    /// Stacking order; lower layers are further back.
    pub layer: i32,
    pub image: ImageHandle,
    pub source: FixedRect,
    pub destination: DestinationRect,
    pub opacity: u8,
}

/// RGBA8 snapshot of the physical display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayCapture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DisplayCapture {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(
            x < self.width && y < self.height,
            "capture pixel ({x}, {y}) outside {}x{}",
            self.width,
            self.height
        );
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[offset],
            self.rgba[offset + 1],
            self.rgba[offset + 2],
            self.rgba[offset + 3],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorError {
    UnknownImage,
    UnknownElement,
    ZeroSizedImage,
    PixelDataTooShort { expected: usize, actual: usize },
    PitchTooSmall { pitch: usize, row_bytes: usize },
    PaletteOnDirectColorImage,
    Backend(String),
}

impl fmt::Display for CompositorError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::UnknownImage => write!(formatter, "unknown compositor image"),
            CompositorError::UnknownElement => write!(formatter, "unknown compositor element"),
            CompositorError::ZeroSizedImage => write!(formatter, "image has a zero dimension"),
            CompositorError::PixelDataTooShort { expected, actual } => write!(
                formatter,
                "pixel upload too short: expected at least {expected} bytes, got {actual}"
            ),
            CompositorError::PitchTooSmall { pitch, row_bytes } => write!(
                formatter,
                "pitch {pitch} is smaller than one image row ({row_bytes} bytes)"
            ),
            CompositorError::PaletteOnDirectColorImage => {
                write!(formatter, "palette can only be set on indexed images")
            }
            CompositorError::Backend(message) => write!(formatter, "compositor backend: {message}"),
        }
    }
}

impl std::error::Error for CompositorError {}

/// Checks a pitched upload against an image's geometry and returns the number
/// of bytes the upload will read.
pub fn validate_upload(
    format: PixelFormat,
    width: u32,
    height: u32,
    pitch: usize,
    pixels: &[u8],
) -> Result<usize, CompositorError> {
    let row_bytes = format.row_bytes(width);
    if pitch < row_bytes {
        return Err(CompositorError::PitchTooSmall { pitch, row_bytes });
    }
    let expected = match height {
        0 => 0,
        rows => pitch * (rows as usize - 1) + row_bytes,
    };
    if pixels.len() < expected {
        return Err(CompositorError::PixelDataTooShort {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(expected)
}

/// The hardware compositor the driver presents through.
///
/// Every element operation is one synchronous display update: when the call
/// returns, the display shows the new state.
pub trait Compositor {
    fn display_mode(&self) -> PhysicalMode;

    fn create_image(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<ImageHandle, CompositorError>;

    /// Replaces the whole image with `pixels`, read with a row stride of `pitch` bytes.
    fn write_image(
        &mut self,
        image: ImageHandle,
        pitch: usize,
        pixels: &[u8],
    ) -> Result<(), CompositorError>;

    fn set_image_palette(
        &mut self,
        image: ImageHandle,
        palette: &PaletteTable,
    ) -> Result<(), CompositorError>;

    fn delete_image(&mut self, image: ImageHandle) -> Result<(), CompositorError>;

    fn add_element(&mut self, element: ElementDesc) -> Result<ElementHandle, CompositorError>;

    fn change_element_source(
        &mut self,
        element: ElementHandle,
        image: ImageHandle,
    ) -> Result<(), CompositorError>;

    fn remove_element(&mut self, element: ElementHandle) -> Result<(), CompositorError>;

    fn capture_display(&mut self) -> Result<DisplayCapture, CompositorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_maps_supported_depths_only() {
        assert_eq!(PixelFormat::from_bits_per_pixel(8), Some(PixelFormat::Indexed8));
        assert_eq!(PixelFormat::from_bits_per_pixel(16), Some(PixelFormat::Rgb565));
        assert_eq!(PixelFormat::from_bits_per_pixel(32), Some(PixelFormat::Xrgb8888));
        assert_eq!(PixelFormat::from_bits_per_pixel(24), None);
        assert_eq!(PixelFormat::from_bits_per_pixel(0), None);
    }

    #[test]
    fn whole_image_source_rect_uses_16_16_fixed_point() {
        let rect = FixedRect::whole_image(640, 480);
        assert_eq!(rect.width, 640 << 16);
        assert_eq!(rect.height, 480 << 16);
        assert_eq!((rect.x, rect.y), (0, 0));

        let largest = FixedRect::whole_image(MAX_IMAGE_DIMENSION, 1);
        assert_eq!(largest.width, 0xffff_0000);
    }

    #[test]
    #[should_panic(expected = "16.16 fixed point")]
    fn whole_image_refuses_dimensions_past_fixed_point_range() {
        FixedRect::whole_image(65536, 1);
    }

    #[test]
    fn validate_upload_accepts_unpadded_last_row() {
        let pixels = vec![0u8; 32 * 3 + 20];
        let read = validate_upload(PixelFormat::Rgb565, 10, 4, 32, &pixels).expect("valid upload");
        assert_eq!(read, 32 * 3 + 20);
    }

    #[test]
    fn validate_upload_rejects_short_buffer_and_narrow_pitch() {
        let pixels = vec![0u8; 10];
        assert_eq!(
            validate_upload(PixelFormat::Xrgb8888, 4, 1, 8, &pixels),
            Err(CompositorError::PitchTooSmall {
                pitch: 8,
                row_bytes: 16
            })
        );
        assert_eq!(
            validate_upload(PixelFormat::Indexed8, 4, 4, 4, &pixels),
            Err(CompositorError::PixelDataTooShort {
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn destination_rect_contains_is_half_open() {
        let rect = DestinationRect {
            x: 240,
            y: 0,
            width: 1440,
            height: 1080,
        };
        assert!(rect.contains(240, 0));
        assert!(rect.contains(1679, 1079));
        assert!(!rect.contains(1680, 0));
        assert!(!rect.contains(239, 10));
    }
}
