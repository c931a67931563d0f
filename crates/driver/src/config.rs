use presenter::{AspectRatioPolicy, ConfigurationError};

/// Present with any value to stretch the logical surface over the whole screen.
pub const IGNORE_RATIO_VARIABLE: &str = "DISPMANX_IGNORE_RATIO";
/// Decimal byte count of the off-screen pool behind the primary surface.
pub const OFFSCREEN_POOL_VARIABLE: &str = "DISPMANX_OFFSCREEN_POOL_BYTES";

pub const DEFAULT_OFFSCREEN_POOL_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub aspect_ratio: AspectRatioPolicy,
    pub offscreen_pool_bytes: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatioPolicy::Preserve,
            offscreen_pool_bytes: DEFAULT_OFFSCREEN_POOL_BYTES,
        }
    }
}

impl DriverConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var_os(name).map(|value| value.to_string_lossy().into_owned()))
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let mut config = Self::default();
        if lookup(IGNORE_RATIO_VARIABLE).is_some() {
            config.aspect_ratio = AspectRatioPolicy::Ignore;
        }
        if let Some(value) = lookup(OFFSCREEN_POOL_VARIABLE) {
            config.offscreen_pool_bytes =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidEnvironment {
                        name: OFFSCREEN_POOL_VARIABLE.to_owned(),
                        value: value.clone(),
                    })?;
        }
        Ok(config)
    }
}
