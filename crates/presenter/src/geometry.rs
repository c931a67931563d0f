//! Maps a logical surface onto the fixed physical mode.
//!
//! Scaling is height-locked: the destination always spans the full physical
//! height and only the width is pillarboxed or clamped.

use std::fmt;

use display_protocol::{DestinationRect, PhysicalMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatioPolicy {
    #[default]
    Preserve,
    /// Stretch to the whole physical screen and accept distortion.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    ZeroLogicalHeight,
    ZeroPhysicalSize,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::ZeroLogicalHeight => write!(formatter, "logical height is zero"),
            GeometryError::ZeroPhysicalSize => write!(formatter, "physical mode has a zero dimension"),
        }
    }
}

impl std::error::Error for GeometryError {}

pub fn resolve_destination(
    logical_width: u32,
    logical_height: u32,
    physical: PhysicalMode,
    policy: AspectRatioPolicy,
) -> Result<DestinationRect, GeometryError> {
    if physical.width == 0 || physical.height == 0 {
        return Err(GeometryError::ZeroPhysicalSize);
    }
    if logical_height == 0 {
        return Err(GeometryError::ZeroLogicalHeight);
    }
    if policy == AspectRatioPolicy::Ignore {
        return Ok(DestinationRect::full_screen(physical));
    }

    let ratio = f64::from(logical_width) / f64::from(logical_height);
    let scaled_width = (f64::from(physical.height) * ratio).round();
    let width = if scaled_width >= f64::from(physical.width) {
        physical.width
    } else {
        scaled_width as u32
    };

    Ok(DestinationRect {
        x: (physical.width - width) / 2,
        y: 0,
        width,
        height: physical.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_HD: PhysicalMode = PhysicalMode {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn four_by_three_is_pillarboxed_on_full_hd() {
        let rect = resolve_destination(640, 480, FULL_HD, AspectRatioPolicy::Preserve)
            .expect("resolve 640x480");
        assert_eq!(
            rect,
            DestinationRect {
                x: 240,
                y: 0,
                width: 1440,
                height: 1080
            }
        );
    }

    #[test]
    fn matching_ratio_fills_the_screen() {
        let rect = resolve_destination(1920, 1080, FULL_HD, AspectRatioPolicy::Preserve)
            .expect("resolve native");
        assert_eq!(rect, DestinationRect::full_screen(FULL_HD));
    }

    #[test]
    fn wider_than_physical_ratio_is_clamped_to_full_width() {
        let rect = resolve_destination(3200, 1000, FULL_HD, AspectRatioPolicy::Preserve)
            .expect("resolve ultra wide");
        assert_eq!(rect, DestinationRect::full_screen(FULL_HD));
    }

    #[test]
    fn fractional_width_is_rounded_not_truncated() {
        // 1080 * 320 / 199 = 1736.68
        let rect = resolve_destination(320, 199, FULL_HD, AspectRatioPolicy::Preserve)
            .expect("resolve 320x199");
        assert_eq!(rect.width, 1737);
        assert_eq!(rect.x, (1920 - 1737) / 2);
    }

    #[test]
    fn ignore_policy_always_spans_the_screen() {
        for (width, height) in [(1, 1), (320, 200), (640, 480), (4000, 10), (10, 4000)] {
            let rect = resolve_destination(width, height, FULL_HD, AspectRatioPolicy::Ignore)
                .expect("resolve ignore");
            assert_eq!(rect, DestinationRect::full_screen(FULL_HD));
        }
    }

    #[test]
    fn zero_heights_are_rejected() {
        assert_eq!(
            resolve_destination(640, 0, FULL_HD, AspectRatioPolicy::Preserve),
            Err(GeometryError::ZeroLogicalHeight)
        );
        assert_eq!(
            resolve_destination(640, 0, FULL_HD, AspectRatioPolicy::Ignore),
            Err(GeometryError::ZeroLogicalHeight)
        );
        assert_eq!(
            resolve_destination(
                640,
                480,
                PhysicalMode {
                    width: 1920,
                    height: 0
                },
                AspectRatioPolicy::Preserve
            ),
            Err(GeometryError::ZeroPhysicalSize)
        );
    }

    #[test]
    fn preserve_sweep_is_height_locked_and_within_rounding() {
        let physical_modes = [
            PhysicalMode {
                width: 1920,
                height: 1080,
            },
            PhysicalMode {
                width: 1280,
                height: 1024,
            },
            PhysicalMode {
                width: 800,
                height: 480,
            },
            PhysicalMode {
                width: 7,
                height: 3,
            },
        ];
        for physical in physical_modes {
            for logical_width in (1..=2048).step_by(37) {
                for logical_height in (1..=2048).step_by(41) {
                    let rect = resolve_destination(
                        logical_width,
                        logical_height,
                        physical,
                        AspectRatioPolicy::Preserve,
                    )
                    .expect("resolve sweep");

                    assert_eq!(rect.y, 0);
                    assert_eq!(rect.height, physical.height);
                    assert!(rect.width <= physical.width);
                    assert!(rect.right() <= physical.width);

                    let exact = f64::from(physical.height) * f64::from(logical_width)
                        / f64::from(logical_height);
                    if exact < f64::from(physical.width) {
                        assert!(
                            (f64::from(rect.width) - exact).abs() <= 0.5 + 1e-9,
                            "{logical_width}x{logical_height} on {physical:?} gave {rect:?}"
                        );
                    } else {
                        assert_eq!(rect.width, physical.width);
                    }
                }
            }
        }
    }
}
