use display_protocol::pixel::encode_rgb565;
use display_protocol::{PALETTE_ENTRIES, PaletteTable, Rgb8};

use crate::ConfigurationError;

/// Application palette and its RGB565 hardware encoding.
#[derive(Debug, Clone)]
pub struct PaletteMapper {
    colors: [Rgb8; PALETTE_ENTRIES],
    table: PaletteTable,
}

impl Default for PaletteMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl PaletteMapper {
    pub fn new() -> Self {
        Self {
            colors: [Rgb8::BLACK; PALETTE_ENTRIES],
            table: PaletteTable::default(),
        }
    }

    /// Overwrites `colors.len()` entries starting at `first` and re-encodes the whole table.
    pub fn set_colors(
        &mut self,
        first: usize,
        colors: &[Rgb8],
    ) -> Result<&PaletteTable, ConfigurationError> {
        let end = first
            .checked_add(colors.len())
            .filter(|end| *end <= PALETTE_ENTRIES)
            .ok_or(ConfigurationError::PaletteRangeOutOfBounds {
                first,
                count: colors.len(),
            })?;
        self.colors[first..end].copy_from_slice(colors);

        let mut entries = [0u16; PALETTE_ENTRIES];
        for (entry, color) in entries.iter_mut().zip(self.colors.iter()) {
            *entry = encode_rgb565(*color);
        }
        self.table = PaletteTable::from_entries(entries);
        Ok(&self.table)
    }

    pub fn colors(&self) -> &[Rgb8; PALETTE_ENTRIES] {
        &self.colors
    }

    pub fn table(&self) -> &PaletteTable {
        &self.table
    }
}
