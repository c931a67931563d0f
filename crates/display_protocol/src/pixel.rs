//! Native pixel encodings.

use crate::{PaletteTable, PixelFormat, Rgb8};

pub const fn encode_rgb565(color: Rgb8) -> u16 {
    (((color.r as u16) >> 3) << 11) | (((color.g as u16) >> 2) << 5) | ((color.b as u16) >> 3)
}

/// Expands RGB565 back to 8-bit channels by replicating the high bits.
pub const fn decode_rgb565(value: u16) -> Rgb8 {
    let r5 = ((value >> 11) & 0x1f) as u8;
    let g6 = ((value >> 5) & 0x3f) as u8;
    let b5 = (value & 0x1f) as u8;
    Rgb8 {
        r: (r5 << 3) | (r5 >> 2),
        g: (g6 << 2) | (g6 >> 4),
        b: (b5 << 3) | (b5 >> 2),
    }
}

pub const fn encode_xrgb8888(color: Rgb8) -> u32 {
    ((color.r as u32) << 16) | ((color.g as u32) << 8) | color.b as u32
}

pub const fn decode_xrgb8888(value: u32) -> Rgb8 {
    Rgb8 {
        r: (value >> 16) as u8,
        g: (value >> 8) as u8,
        b: value as u8,
    }
}

/// Decodes the pixel starting at `bytes[0]`.
pub fn decode_pixel(format: PixelFormat, bytes: &[u8], palette: &PaletteTable) -> Rgb8 {
    match format {
        PixelFormat::Indexed8 => decode_rgb565(palette.entry(bytes[0])),
        PixelFormat::Rgb565 => decode_rgb565(u16::from_le_bytes([bytes[0], bytes[1]])),
        PixelFormat::Xrgb8888 => {
            decode_xrgb8888(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
    }
}

/// Writes `color` at `bytes[0..]` in `format`. Indexed surfaces cannot be
/// written from a color and are left untouched.
pub fn encode_pixel(format: PixelFormat, color: Rgb8, bytes: &mut [u8]) {
    match format {
        PixelFormat::Indexed8 => {}
        PixelFormat::Rgb565 => bytes[..2].copy_from_slice(&encode_rgb565(color).to_le_bytes()),
        PixelFormat::Xrgb8888 => bytes[..4].copy_from_slice(&encode_xrgb8888(color).to_le_bytes()),
    }
}
