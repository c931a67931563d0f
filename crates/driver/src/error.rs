use std::fmt;

use display_protocol::CompositorError;
use offscreen::{OffscreenAllocError, OffscreenFreeError};
use presenter::{ConfigurationError, PipelineError, ResourceExhaustion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    Configuration(ConfigurationError),
    ResourceExhaustion(ResourceExhaustion),
    Device(CompositorError),
    NoActiveMode,
    UnknownSurface(OffscreenFreeError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Configuration(error) => write!(formatter, "configuration error: {error}"),
            DriverError::ResourceExhaustion(error) => {
                write!(formatter, "resource exhaustion: {error}")
            }
            DriverError::Device(error) => write!(formatter, "device error: {error}"),
            DriverError::NoActiveMode => write!(formatter, "no video mode is set"),
            DriverError::UnknownSurface(error) => write!(formatter, "invalid surface: {error}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Configuration(error) => Some(error),
            DriverError::ResourceExhaustion(error) => Some(error),
            DriverError::Device(error) => Some(error),
            DriverError::NoActiveMode => None,
            DriverError::UnknownSurface(error) => Some(error),
        }
    }
}

impl From<PipelineError> for DriverError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Configuration(error) => DriverError::Configuration(error),
            PipelineError::ResourceExhaustion(error) => DriverError::ResourceExhaustion(error),
            PipelineError::Compositor(error) => DriverError::Device(error),
            PipelineError::NoActiveMode => DriverError::NoActiveMode,
        }
    }
}

impl From<ConfigurationError> for DriverError {
    fn from(error: ConfigurationError) -> Self {
        DriverError::Configuration(error)
    }
}

impl From<OffscreenAllocError> for DriverError {
    fn from(error: OffscreenAllocError) -> Self {
        DriverError::ResourceExhaustion(ResourceExhaustion::Offscreen(error))
    }
}

impl From<OffscreenFreeError> for DriverError {
    fn from(error: OffscreenFreeError) -> Self {
        DriverError::UnknownSurface(error)
    }
}

impl From<CompositorError> for DriverError {
    fn from(error: CompositorError) -> Self {
        DriverError::Device(error)
    }
}
