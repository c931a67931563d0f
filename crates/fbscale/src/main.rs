use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use display_protocol::pixel::encode_pixel;
use display_protocol::{Compositor, DisplayCapture, PhysicalMode, Rgb8};
use driver::{
    AspectRatioPolicy, DriverConfig, SurfaceDescriptor, SurfaceFlags, SurfaceMemory, VideoDriver,
};
use gpu_compositor::GpuCompositor;
use soft_compositor::SoftCompositor;
use std::path::PathBuf;

const COLOR_BARS: [Rgb8; 8] = [
    Rgb8::new(255, 255, 255),
    Rgb8::new(255, 255, 0),
    Rgb8::new(0, 255, 255),
    Rgb8::new(0, 255, 0),
    Rgb8::new(255, 0, 255),
    Rgb8::new(255, 0, 0),
    Rgb8::new(0, 0, 255),
    Rgb8::new(0, 0, 0),
];

#[derive(Parser)]
#[command(author, version, about = "Present a test pattern through the scaling video driver")]
struct Arguments {
    /// Compositor backend.
    #[arg(long, value_enum, default_value = "soft")]
    backend: Backend,
    /// Physical display size, WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_physical_mode, default_value = "1920x1080")]
    physical: PhysicalMode,
    /// Logical mode, WIDTHxHEIGHTxBPP.
    #[arg(long, value_parser = parse_logical_mode, default_value = "640x480x16")]
    mode: LogicalRequest,
    /// Stretch to the whole screen instead of preserving the aspect ratio.
    #[arg(long)]
    ignore_ratio: bool,
    /// PNG file receiving the physical display capture.
    #[arg(long, short = 'o', value_parser, default_value = "fbscale.png")]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Backend {
    Soft,
    Gpu,
}

#[derive(Clone, Copy, Debug)]
struct LogicalRequest {
    width: u32,
    height: u32,
    bits_per_pixel: u8,
}

fn parse_dimensions(value: &str, expected: usize) -> Result<Vec<u32>, String> {
    let parts = value
        .split('x')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| format!("invalid number in {value:?}: {error}"))?;
    if parts.len() != expected {
        return Err(format!(
            "expected {expected} values separated by 'x', got {value:?}"
        ));
    }
    Ok(parts)
}

fn parse_physical_mode(value: &str) -> Result<PhysicalMode, String> {
    let parts = parse_dimensions(value, 2)?;
    Ok(PhysicalMode {
        width: parts[0],
        height: parts[1],
    })
}

fn parse_logical_mode(value: &str) -> Result<LogicalRequest, String> {
    let parts = parse_dimensions(value, 3)?;
    let bits_per_pixel =
        u8::try_from(parts[2]).map_err(|_| format!("depth {} out of range", parts[2]))?;
    Ok(LogicalRequest {
        width: parts[0],
        height: parts[1],
        bits_per_pixel,
    })
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    let mut config = DriverConfig::from_env().context("read driver environment")?;
    if arguments.ignore_ratio {
        config.aspect_ratio = AspectRatioPolicy::Ignore;
    }

    let capture = match arguments.backend {
        Backend::Soft => present_pattern(SoftCompositor::new(arguments.physical), &arguments, config)?,
        Backend::Gpu => {
            let compositor = GpuCompositor::request_headless(arguments.physical)
                .context("initialize gpu compositor")?;
            present_pattern(compositor, &arguments, config)?
        }
    };

    let image = image::RgbaImage::from_raw(capture.width, capture.height, capture.rgba)
        .context("capture size does not match its pixel data")?;
    image
        .save_with_format(&arguments.output, image::ImageFormat::Png)
        .with_context(|| format!("write capture {}", arguments.output.display()))?;
    println!(
        "wrote {}x{} capture to {}",
        capture.width,
        capture.height,
        arguments.output.display()
    );
    Ok(())
}

fn present_pattern<C: Compositor>(
    compositor: C,
    arguments: &Arguments,
    config: DriverConfig,
) -> Result<DisplayCapture> {
    let request = arguments.mode;
    let mut driver = VideoDriver::open(compositor, config).context("open video driver")?;
    let screen = driver
        .set_video_mode(
            request.width,
            request.height,
            request.bits_per_pixel,
            SurfaceFlags::HWPALETTE,
        )
        .with_context(|| {
            format!(
                "set video mode {}x{}x{}",
                request.width, request.height, request.bits_per_pixel
            )
        })?;
    if screen.format.is_indexed() {
        driver
            .set_colors(0, &COLOR_BARS)
            .context("load color bar palette")?;
    }

    let surface = driver.surface().context("mode set left no surface")?;
    draw_color_bars(&mut surface.lock(), &screen);
    driver.update_rects(&[]).context("present frame")?;

    let capture = driver
        .compositor_mut()
        .capture_display()
        .context("capture display")?;
    driver.quit().context("shut down video driver")?;
    Ok(capture)
}

/// Vertical color bars with a one pixel white border.
fn draw_color_bars(memory: &mut SurfaceMemory, screen: &SurfaceDescriptor) {
    let format = screen.format;
    let bytes_per_pixel = format.bytes_per_pixel();
    let width = screen.width as usize;
    let height = screen.height as usize;
    let pixels = memory.primary_pixels_mut();

    for y in 0..height {
        let row = &mut pixels[y * screen.pitch..][..format.row_bytes(screen.width)];
        for x in 0..width {
            let border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
            let bar = if border {
                0
            } else {
                x * COLOR_BARS.len() / width
            };
            let texel = &mut row[x * bytes_per_pixel..][..bytes_per_pixel];
            if format.is_indexed() {
                texel[0] = bar as u8;
            } else {
                encode_pixel(format, COLOR_BARS[bar], texel);
            }
        }
    }
}
