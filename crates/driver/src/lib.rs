//! Video driver facade over a fixed-mode hardware compositor.
//!
//! `VideoDriver` is the context object a host framework drives: it answers
//! mode queries with the one physical mode, sets logical modes through the
//! presentation pipeline, republishes the framebuffer on every update and hands
//! out auxiliary surfaces carved from the off-screen pool.

use display_protocol::{
    Compositor, CompositorError, DestinationRect, PhysicalMode, PixelFormat, Rgb8,
};
use offscreen::{OffscreenAllocError, OffscreenFreeError};
use presenter::{ActiveMode, PresentationPipeline, PresentedFrame};

mod config;
mod error;
mod modes;

pub use config::{
    DEFAULT_OFFSCREEN_POOL_BYTES, DriverConfig, IGNORE_RATIO_VARIABLE, OFFSCREEN_POOL_VARIABLE,
};
pub use error::DriverError;
pub use modes::ModeCatalog;
pub use presenter::{
    AspectRatioPolicy, ConfigurationError, ResourceExhaustion, SharedSurface, SurfaceMemory,
};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const HWSURFACE = 0x0000_0001;
        const HWPALETTE = 0x2000_0000;
        const DOUBLEBUF = 0x4000_0000;
        const FULLSCREEN = 0x8000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub current_width: u32,
    pub current_height: u32,
    pub hardware_available: bool,
    pub window_manager_available: bool,
    pub video_memory_kib: usize,
}

/// The primary surface as established by a mode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
    pub pitch: usize,
    pub format: PixelFormat,
    pub flags: SurfaceFlags,
    pub destination: DestinationRect,
}

/// An auxiliary surface living in the off-screen pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondarySurface {
    /// Byte offset into the shared surface memory.
    pub base: usize,
    pub pitch: usize,
    pub height: u32,
    pub size: usize,
    pub format: PixelFormat,
    /// Mode set the surface was carved from; handles die with their mode.
    pub mode_generation: u64,
}

/// Damage rectangle passed by the host. Updates always republish the whole
/// framebuffer, so the coordinates are not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

pub struct VideoDriver<C: Compositor> {
    compositor: C,
    config: DriverConfig,
    physical: PhysicalMode,
    modes: ModeCatalog,
    pipeline: PresentationPipeline,
    screen: Option<SurfaceDescriptor>,
    mode_generation: u64,
}

impl<C: Compositor> VideoDriver<C> {
    pub fn open(compositor: C, config: DriverConfig) -> Result<Self, DriverError> {
        let physical = compositor.display_mode();
        if physical.width == 0 || physical.height == 0 {
            return Err(DriverError::Device(CompositorError::Backend(format!(
                "physical mode {}x{} has a zero dimension",
                physical.width, physical.height
            ))));
        }
        eprintln!(
            "[driver] physical video mode is {}x{}",
            physical.width, physical.height
        );
        Ok(Self {
            compositor,
            config,
            physical,
            modes: ModeCatalog::for_physical_mode(physical),
            pipeline: PresentationPipeline::new(physical, config.aspect_ratio),
            screen: None,
            mode_generation: 0,
        })
    }

    pub fn physical_mode(&self) -> PhysicalMode {
        self.physical
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut C {
        &mut self.compositor
    }

    pub fn screen(&self) -> Option<&SurfaceDescriptor> {
        self.screen.as_ref()
    }

    pub fn video_info(&self) -> VideoInfo {
        VideoInfo {
            current_width: self.physical.width,
            current_height: self.physical.height,
            hardware_available: true,
            window_manager_available: false,
            video_memory_kib: self.config.offscreen_pool_bytes / 1024,
        }
    }

    pub fn list_modes(&self, bits_per_pixel: u8) -> &[PhysicalMode] {
        self.modes.list(bits_per_pixel)
    }

    /// Sets a logical mode. Double buffering and hardware surfaces are
    /// downgraded; the result is always full screen.
    pub fn set_video_mode(
        &mut self,
        width: u32,
        height: u32,
        bits_per_pixel: u8,
        requested: SurfaceFlags,
    ) -> Result<SurfaceDescriptor, DriverError> {
        self.screen = None;
        self.mode_generation += 1;
        let mode = match self.pipeline.set_mode(
            &mut self.compositor,
            width,
            height,
            bits_per_pixel,
            self.config.offscreen_pool_bytes,
        ) {
            Ok(mode) => mode,
            Err(error) => {
                eprintln!("[driver] set video mode {width}x{height}x{bits_per_pixel} failed: {error}");
                return Err(error.into());
            }
        };

        let mut flags = SurfaceFlags::FULLSCREEN;
        if requested.contains(SurfaceFlags::HWPALETTE) && bits_per_pixel == 8 {
            flags |= SurfaceFlags::HWPALETTE;
        }
        let logical = mode.logical();
        let descriptor = SurfaceDescriptor {
            width: logical.width,
            height: logical.height,
            bits_per_pixel: logical.bits_per_pixel,
            pitch: logical.pitch,
            format: logical.format,
            flags,
            destination: mode.destination(),
        };
        self.screen = Some(descriptor);
        Ok(descriptor)
    }

    /// Republishes the whole framebuffer regardless of `rects`.
    pub fn update_rects(&mut self, _rects: &[DirtyRect]) -> Result<PresentedFrame, DriverError> {
        Ok(self.pipeline.present(&mut self.compositor)?)
    }

    pub fn set_colors(&mut self, first: usize, colors: &[Rgb8]) -> Result<(), DriverError> {
        Ok(self
            .pipeline
            .set_colors(&mut self.compositor, first, colors)?)
    }

    /// Display updates are synchronous, so there is never a pending flip.
    pub fn flip_hw_surface(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    pub fn wait_vbl(&mut self) {}

    pub fn wait_idle(&mut self) {}

    /// Memory shared by the primary surface and the off-screen pool.
    pub fn surface(&self) -> Option<SharedSurface> {
        self.pipeline
            .active_mode()
            .map(|mode| mode.surface().clone())
    }

    pub fn alloc_hw_surface(
        &mut self,
        width: u32,
        height: u32,
        bits_per_pixel: u8,
    ) -> Result<SecondarySurface, DriverError> {
        let mode = self
            .pipeline
            .active_mode()
            .ok_or(DriverError::NoActiveMode)?;
        if width == 0 || height == 0 {
            return Err(ConfigurationError::ZeroSize { width, height }.into());
        }
        let format = PixelFormat::from_bits_per_pixel(bits_per_pixel)
            .ok_or(ConfigurationError::UnsupportedBitsPerPixel(bits_per_pixel))?;
        let screen_pitch = mode.logical().pitch;
        let row_bytes = format.row_bytes(width);
        if row_bytes > screen_pitch {
            return Err(ConfigurationError::SurfaceWiderThanScreen {
                row_bytes,
                screen_pitch,
            }
            .into());
        }

        let mut memory = mode.surface().lock();
        let pool = memory.pool_mut();
        let size = secondary_surface_size(height, screen_pitch).ok_or(
            OffscreenAllocError::OutOfMemory {
                requested: usize::MAX,
                available: pool.free_bytes(),
            },
        )?;
        let block = pool.alloc(size)?;
        Ok(SecondarySurface {
            base: block.base,
            pitch: screen_pitch,
            height,
            size: block.size,
            format,
            mode_generation: self.mode_generation,
        })
    }

    pub fn free_hw_surface(&mut self, surface: &SecondarySurface) -> Result<(), DriverError> {
        let mode = self.owning_mode(surface)?;
        mode.surface().lock().pool_mut().free(surface.base)?;
        Ok(())
    }

    /// Flags `surface` as having outstanding hardware work. The next lock of
    /// it through [`SharedSurface::lock_block`] waits for idle first.
    pub fn mark_surface_busy(&mut self, surface: &SecondarySurface) -> Result<bool, DriverError> {
        let mode = self.owning_mode(surface)?;
        Ok(mode.surface().lock().pool_mut().mark_dirty(surface.base))
    }

    /// The active mode, provided `surface` was allocated from it.
    fn owning_mode(&self, surface: &SecondarySurface) -> Result<&ActiveMode, DriverError> {
        let mode = self
            .pipeline
            .active_mode()
            .ok_or(DriverError::NoActiveMode)?;
        if surface.mode_generation != self.mode_generation {
            return Err(DriverError::UnknownSurface(OffscreenFreeError::UnknownBase(
                surface.base,
            )));
        }
        Ok(mode)
    }

    /// Tears down the mode and the background and returns the compositor.
    pub fn quit(mut self) -> Result<C, DriverError> {
        self.pipeline.close_session(&mut self.compositor)?;
        eprintln!("[driver] video quit");
        Ok(self.compositor)
    }
}

/// Bytes a secondary surface spans: one full screen pitch per row.
fn secondary_surface_size(height: u32, screen_pitch: usize) -> Option<usize> {
    usize::try_from(height).ok()?.checked_mul(screen_pitch)
}

#[cfg(test)]
mod tests;
