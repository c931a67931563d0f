use display_protocol::PhysicalMode;

const SUPPORTED_DEPTHS: [u8; 3] = [8, 16, 32];

/// Modes advertised per supported depth. The display cannot switch modes, so
/// every depth lists the physical mode only.
#[derive(Debug, Clone, Default)]
pub struct ModeCatalog {
    modes: [Vec<PhysicalMode>; SUPPORTED_DEPTHS.len()],
}

impl ModeCatalog {
    pub fn for_physical_mode(physical: PhysicalMode) -> Self {
        let mut catalog = Self::default();
        for bits_per_pixel in SUPPORTED_DEPTHS {
            catalog.add_mode(bits_per_pixel, physical);
        }
        catalog
    }

    /// Adds `mode` unless the depth is unsupported or the mode is already listed.
    pub fn add_mode(&mut self, bits_per_pixel: u8, mode: PhysicalMode) -> bool {
        let Some(index) = depth_index(bits_per_pixel) else {
            return false;
        };
        let modes = &mut self.modes[index];
        if modes.contains(&mode) {
            return false;
        }
        modes.push(mode);
        true
    }

    pub fn list(&self, bits_per_pixel: u8) -> &[PhysicalMode] {
        match depth_index(bits_per_pixel) {
            Some(index) => &self.modes[index],
            None => &[],
        }
    }
}

fn depth_index(bits_per_pixel: u8) -> Option<usize> {
    SUPPORTED_DEPTHS
        .iter()
        .position(|depth| *depth == bits_per_pixel)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: PhysicalMode = PhysicalMode {
        width: 1280,
        height: 720,
    };

    #[test]
    fn each_supported_depth_lists_the_physical_mode_once() {
        let catalog = ModeCatalog::for_physical_mode(MODE);
        for depth in [8, 16, 32] {
            assert_eq!(catalog.list(depth), &[MODE]);
        }
    }

    #[test]
    fn unsupported_depths_list_nothing() {
        let catalog = ModeCatalog::for_physical_mode(MODE);
        assert!(catalog.list(24).is_empty());
        assert!(catalog.list(15).is_empty());
    }

    #[test]
    fn duplicate_modes_are_ignored() {
        let mut catalog = ModeCatalog::for_physical_mode(MODE);
        assert!(!catalog.add_mode(16, MODE));
        assert!(catalog.add_mode(
            16,
            PhysicalMode {
                width: 640,
                height: 480
            }
        ));
        assert_eq!(catalog.list(16).len(), 2);
        assert!(!catalog.add_mode(24, MODE));
    }
}
