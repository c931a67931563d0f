use std::fmt;

use display_protocol::CompositorError;
use offscreen::OffscreenAllocError;

use crate::GeometryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    ZeroSize { width: u32, height: u32 },
    TooLarge { width: u32, height: u32, max: u32 },
    UnsupportedBitsPerPixel(u8),
    Geometry(GeometryError),
    PaletteRangeOutOfBounds { first: usize, count: usize },
    SurfaceWiderThanScreen { row_bytes: usize, screen_pitch: usize },
    InvalidEnvironment { name: String, value: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::ZeroSize { width, height } => {
                write!(formatter, "surface size {width}x{height} has a zero dimension")
            }
            ConfigurationError::TooLarge { width, height, max } => write!(
                formatter,
                "surface size {width}x{height} exceeds the {max} pixel limit per dimension"
            ),
            ConfigurationError::UnsupportedBitsPerPixel(bits) => {
                write!(formatter, "unsupported depth: {bits} bits per pixel")
            }
            ConfigurationError::Geometry(error) => write!(formatter, "geometry: {error}"),
            ConfigurationError::PaletteRangeOutOfBounds { first, count } => write!(
                formatter,
                "palette range {first}..{} exceeds 256 entries",
                first.saturating_add(*count)
            ),
            ConfigurationError::SurfaceWiderThanScreen {
                row_bytes,
                screen_pitch,
            } => write!(
                formatter,
                "surface requested wider than screen: {row_bytes} bytes per row, screen pitch {screen_pitch}"
            ),
            ConfigurationError::InvalidEnvironment { name, value } => {
                write!(formatter, "invalid value {value:?} for {name}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<GeometryError> for ConfigurationError {
    fn from(error: GeometryError) -> Self {
        ConfigurationError::Geometry(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceExhaustion {
    SurfaceMemory { requested: usize },
    Offscreen(OffscreenAllocError),
}

impl fmt::Display for ResourceExhaustion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceExhaustion::SurfaceMemory { requested } => {
                write!(formatter, "cannot allocate {requested} bytes of surface memory")
            }
            ResourceExhaustion::Offscreen(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for ResourceExhaustion {}

impl From<OffscreenAllocError> for ResourceExhaustion {
    fn from(error: OffscreenAllocError) -> Self {
        ResourceExhaustion::Offscreen(error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    Configuration(ConfigurationError),
    ResourceExhaustion(ResourceExhaustion),
    Compositor(CompositorError),
    NoActiveMode,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration(error) => write!(formatter, "configuration: {error}"),
            PipelineError::ResourceExhaustion(error) => {
                write!(formatter, "resource exhaustion: {error}")
            }
            PipelineError::Compositor(error) => write!(formatter, "{error}"),
            PipelineError::NoActiveMode => write!(formatter, "no video mode is set"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Configuration(error) => Some(error),
            PipelineError::ResourceExhaustion(error) => Some(error),
            PipelineError::Compositor(error) => Some(error),
            PipelineError::NoActiveMode => None,
        }
    }
}

impl From<ConfigurationError> for PipelineError {
    fn from(error: ConfigurationError) -> Self {
        PipelineError::Configuration(error)
    }
}

impl From<GeometryError> for PipelineError {
    fn from(error: GeometryError) -> Self {
        PipelineError::Configuration(ConfigurationError::Geometry(error))
    }
}

impl From<ResourceExhaustion> for PipelineError {
    fn from(error: ResourceExhaustion) -> Self {
        PipelineError::ResourceExhaustion(error)
    }
}

impl From<CompositorError> for PipelineError {
    fn from(error: CompositorError) -> Self {
        PipelineError::Compositor(error)
    }
}
