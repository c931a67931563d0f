use display_protocol::{Compositor, PALETTE_ENTRIES};
use offscreen::{OffscreenAllocError, OffscreenFreeError};
use soft_compositor::SoftCompositor;

use super::*;

const PHYSICAL: PhysicalMode = PhysicalMode {
    width: 160,
    height: 90,
};

fn open_driver(config: DriverConfig) -> VideoDriver<SoftCompositor> {
    VideoDriver::open(SoftCompositor::new(PHYSICAL), config).expect("open driver")
}

fn small_pool_config() -> DriverConfig {
    DriverConfig {
        offscreen_pool_bytes: 1024,
        ..DriverConfig::default()
    }
}

#[test]
fn open_reports_the_physical_mode() {
    let driver = open_driver(DriverConfig::default());
    assert_eq!(driver.physical_mode(), PHYSICAL);
    assert_eq!(
        driver.video_info(),
        VideoInfo {
            current_width: 160,
            current_height: 90,
            hardware_available: true,
            window_manager_available: false,
            video_memory_kib: 1024,
        }
    );
    for depth in [8, 16, 32] {
        assert_eq!(driver.list_modes(depth), &[PHYSICAL]);
    }
    assert!(driver.list_modes(24).is_empty());
    assert!(driver.screen().is_none());
}

#[test]
fn zero_sized_display_fails_to_open() {
    let compositor = SoftCompositor::new(PhysicalMode {
        width: 0,
        height: 90,
    });
    assert!(matches!(
        VideoDriver::open(compositor, DriverConfig::default()),
        Err(DriverError::Device(_))
    ));
}

#[test]
fn mode_set_downgrades_flags_and_keeps_palette_only_for_eight_bit() {
    let mut driver = open_driver(DriverConfig::default());
    let requested = SurfaceFlags::HWSURFACE | SurfaceFlags::DOUBLEBUF | SurfaceFlags::HWPALETTE;

    let indexed = driver
        .set_video_mode(64, 48, 8, requested)
        .expect("8-bit mode");
    assert_eq!(indexed.flags, SurfaceFlags::FULLSCREEN | SurfaceFlags::HWPALETTE);

    let direct = driver
        .set_video_mode(64, 48, 16, requested)
        .expect("16-bit mode");
    assert_eq!(direct.flags, SurfaceFlags::FULLSCREEN);
    assert!(!direct.flags.intersects(SurfaceFlags::DOUBLEBUF | SurfaceFlags::HWSURFACE));

    let plain = driver
        .set_video_mode(64, 48, 8, SurfaceFlags::empty())
        .expect("8-bit mode without palette request");
    assert_eq!(plain.flags, SurfaceFlags::FULLSCREEN);
}

#[test]
fn mode_set_reports_pitch_and_pillarbox() {
    let mut driver = open_driver(DriverConfig::default());
    let screen = driver
        .set_video_mode(100, 75, 16, SurfaceFlags::empty())
        .expect("set mode");
    assert_eq!(screen.width, 100);
    assert_eq!(screen.height, 75);
    assert_eq!(screen.pitch, 112 * 2);
    assert_eq!(screen.format, PixelFormat::Rgb565);
    assert_eq!(
        screen.destination,
        DestinationRect {
            x: 20,
            y: 0,
            width: 120,
            height: 90
        }
    );
    assert_eq!(driver.screen(), Some(&screen));
}

#[test]
fn ignore_ratio_config_stretches_to_full_screen() {
    let mut driver = open_driver(DriverConfig {
        aspect_ratio: AspectRatioPolicy::Ignore,
        ..DriverConfig::default()
    });
    let screen = driver
        .set_video_mode(100, 75, 32, SurfaceFlags::empty())
        .expect("set mode");
    assert_eq!(screen.destination, DestinationRect::full_screen(PHYSICAL));
    assert_eq!(driver.compositor().element_count(), 1);
}

#[test]
fn unsupported_depth_is_a_configuration_error() {
    let mut driver = open_driver(DriverConfig::default());
    driver
        .set_video_mode(64, 48, 16, SurfaceFlags::empty())
        .expect("first mode");
    assert_eq!(
        driver.set_video_mode(64, 48, 24, SurfaceFlags::empty()),
        Err(DriverError::Configuration(
            ConfigurationError::UnsupportedBitsPerPixel(24)
        ))
    );
    assert!(driver.screen().is_none());
    assert!(driver.surface().is_none());
    assert_eq!(
        driver.update_rects(&[]),
        Err(DriverError::NoActiveMode)
    );
}

#[test]
fn update_rects_republishes_the_whole_buffer() {
    let mut driver = open_driver(DriverConfig::default());
    let screen = driver
        .set_video_mode(64, 48, 32, SurfaceFlags::empty())
        .expect("set mode");
    {
        let surface = driver.surface().expect("surface");
        let mut memory = surface.lock();
        for pixel in memory.primary_pixels_mut().chunks_exact_mut(4) {
            pixel.copy_from_slice(&[0x00, 0xff, 0x00, 0x00]);
        }
    }

    let only_top_left = [DirtyRect {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    }];
    let frame = driver.update_rects(&only_top_left).expect("update");
    assert_eq!(frame.frame_sequence_id, 1);

    let capture = driver.compositor_mut().capture_display().expect("capture");
    let destination = screen.destination;
    assert_eq!(
        capture.pixel(destination.right() - 1, destination.bottom() - 1),
        [0, 255, 0, 255]
    );
    assert_eq!(capture.pixel(destination.x - 1, 0), [0, 0, 0, 255]);
}

#[test]
fn eight_bit_palette_is_applied_on_the_next_update() {
    let mut driver = open_driver(DriverConfig::default());
    driver
        .set_video_mode(32, 32, 8, SurfaceFlags::HWPALETTE)
        .expect("set mode");
    let mut colors = vec![Rgb8::BLACK; PALETTE_ENTRIES];
    colors[200] = Rgb8::new(0, 0, 255);
    driver.set_colors(0, &colors).expect("set colors");
    driver
        .surface()
        .expect("surface")
        .lock()
        .primary_pixels_mut()
        .fill(200);

    driver.update_rects(&[]).expect("update");
    let capture = driver.compositor_mut().capture_display().expect("capture");
    assert_eq!(capture.pixel(80, 45), [0, 0, 255, 255]);
    assert_eq!(
        driver.set_colors(250, &colors[..10]),
        Err(DriverError::Configuration(
            ConfigurationError::PaletteRangeOutOfBounds { first: 250, count: 10 }
        ))
    );
}

#[test]
fn sync_hooks_are_no_ops() {
    let mut driver = open_driver(DriverConfig::default());
    driver
        .set_video_mode(32, 32, 16, SurfaceFlags::DOUBLEBUF)
        .expect("set mode");
    let updates = driver.compositor().stats().display_updates;
    assert_eq!(driver.flip_hw_surface(), Ok(()));
    driver.wait_vbl();
    driver.wait_idle();
    assert_eq!(driver.compositor().stats().display_updates, updates);
}

#[test]
fn secondary_surfaces_come_from_the_pool_after_the_primary() {
    let mut driver = open_driver(small_pool_config());
    let screen = driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("set mode");
    assert_eq!(screen.pitch, 16);

    let surface = driver.alloc_hw_surface(8, 4, 8).expect("alloc");
    assert_eq!(
        surface,
        SecondarySurface {
            base: 16 * 16,
            pitch: 16,
            height: 4,
            size: 64,
            format: PixelFormat::Indexed8,
            mode_generation: 1,
        }
    );

    let shared = driver.surface().expect("surface");
    shared
        .lock()
        .block_mut(surface.base, surface.size)
        .expect("block")
        .fill(0xab);
    assert!(shared.lock().primary_pixels().iter().all(|byte| *byte == 0));
}

#[test]
fn surfaces_wider_than_the_screen_are_rejected() {
    let mut driver = open_driver(small_pool_config());
    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("set mode");
    assert_eq!(
        driver.alloc_hw_surface(9, 1, 16),
        Err(DriverError::Configuration(
            ConfigurationError::SurfaceWiderThanScreen {
                row_bytes: 18,
                screen_pitch: 16
            }
        ))
    );
    assert!(driver.alloc_hw_surface(16, 1, 8).is_ok());
}

#[test]
fn pool_exhaustion_and_fragmentation_leave_the_display_alone() {
    let mut driver = open_driver(small_pool_config());
    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("set mode");
    driver.update_rects(&[]).expect("first update");
    let before = driver.compositor_mut().capture_display().expect("capture");

    let a = driver.alloc_hw_surface(16, 20, 8).expect("alloc a");
    let b = driver.alloc_hw_surface(16, 20, 8).expect("alloc b");
    let _c = driver.alloc_hw_surface(16, 20, 8).expect("alloc c");
    assert_eq!(a.size, 320);
    assert_eq!(
        driver.alloc_hw_surface(16, 5, 8),
        Err(DriverError::ResourceExhaustion(ResourceExhaustion::Offscreen(
            OffscreenAllocError::OutOfMemory {
                requested: 80,
                available: 64
            }
        )))
    );

    driver.free_hw_surface(&b).expect("free b");
    assert_eq!(
        driver.alloc_hw_surface(16, 24, 8),
        Err(DriverError::ResourceExhaustion(ResourceExhaustion::Offscreen(
            OffscreenAllocError::Fragmented {
                requested: 384,
                largest_free: 320
            }
        )))
    );

    driver.update_rects(&[]).expect("second update");
    let after = driver.compositor_mut().capture_display().expect("capture");
    assert_eq!(before, after);
}

#[test]
fn double_free_is_reported() {
    let mut driver = open_driver(small_pool_config());
    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("set mode");
    let surface = driver.alloc_hw_surface(16, 16, 8).expect("alloc");
    driver.free_hw_surface(&surface).expect("free");
    assert_eq!(
        driver.free_hw_surface(&surface),
        Err(DriverError::UnknownSurface(OffscreenFreeError::NotAllocated(
            surface.base
        )))
    );
}

#[test]
fn surfaces_from_a_previous_mode_are_rejected() {
    let mut driver = open_driver(small_pool_config());
    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("first mode");
    let stale = driver.alloc_hw_surface(16, 4, 8).expect("alloc in first mode");

    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("same mode again");
    let live = driver.alloc_hw_surface(16, 4, 8).expect("alloc in second mode");
    assert_eq!(stale.base, live.base);

    let rejected = Err(DriverError::UnknownSurface(OffscreenFreeError::UnknownBase(
        stale.base,
    )));
    assert_eq!(driver.free_hw_surface(&stale), rejected);
    assert_eq!(driver.mark_surface_busy(&stale), rejected.map(|()| false));

    let shared = driver.surface().expect("surface");
    assert!(!shared.lock().pool().is_dirty(live.base));
    assert_eq!(shared.lock().pool().free_bytes(), 1024 - live.size);
    driver.free_hw_surface(&live).expect("free live surface");
}

#[test]
fn secondary_surface_size_overflow_is_detected() {
    assert_eq!(secondary_surface_size(4, 16), Some(64));
    assert_eq!(secondary_surface_size(3, usize::MAX / 2), None);
    assert_eq!(secondary_surface_size(u32::MAX, usize::MAX / 2), None);
}

#[test]
fn busy_surface_is_settled_by_lock_block() {
    let mut driver = open_driver(small_pool_config());
    driver
        .set_video_mode(16, 16, 8, SurfaceFlags::empty())
        .expect("set mode");
    let surface = driver.alloc_hw_surface(16, 4, 8).expect("alloc");
    assert_eq!(driver.mark_surface_busy(&surface), Ok(true));

    let shared = driver.surface().expect("surface");
    assert!(shared.lock().pool().is_dirty(surface.base));
    let memory = shared.lock_block(surface.base);
    assert!(!memory.pool().is_dirty(surface.base));
}

#[test]
fn secondary_surfaces_need_a_mode() {
    let mut driver = open_driver(small_pool_config());
    assert_eq!(
        driver.alloc_hw_surface(16, 16, 8),
        Err(DriverError::NoActiveMode)
    );
}

#[test]
fn quit_releases_everything_and_returns_the_compositor() {
    let mut driver = open_driver(DriverConfig::default());
    driver
        .set_video_mode(64, 48, 16, SurfaceFlags::empty())
        .expect("set mode");
    driver.update_rects(&[]).expect("update");

    let compositor = driver.quit().expect("quit");
    assert_eq!(compositor.image_count(), 0);
    assert_eq!(compositor.element_count(), 0);
}

#[test]
fn driver_errors_render_their_cause() {
    let error = DriverError::from(ConfigurationError::UnsupportedBitsPerPixel(12));
    assert_eq!(
        error.to_string(),
        "configuration error: unsupported depth: 12 bits per pixel"
    );
    assert!(std::error::Error::source(&error).is_some());
}
