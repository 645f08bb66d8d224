use std::fmt;

use frame_scheduler::RenderThreadError;
use renderer::DeviceError;
use view::TransformError;

use crate::config::ConfigError;

#[derive(Debug)]
pub enum MapError {
    Config(ConfigError),
    Transform(TransformError),
    Device(DeviceError),
    RenderThread(RenderThreadError<DeviceError>),
    Spawn(std::io::Error),
    AlreadyStarted,
    NotStarted,
    /// The render thread failed earlier and took the renderer with it.
    SessionUnavailable,
}

impl fmt::Display for MapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(error) => write!(formatter, "{error}"),
            Self::Transform(error) => write!(formatter, "camera update rejected: {error}"),
            Self::Device(error) => write!(formatter, "{error}"),
            Self::RenderThread(error) => write!(formatter, "{error}"),
            Self::Spawn(error) => write!(formatter, "failed to spawn render thread: {error}"),
            Self::AlreadyStarted => write!(formatter, "map render thread already running"),
            Self::NotStarted => write!(formatter, "map render thread is not running"),
            Self::SessionUnavailable => {
                write!(formatter, "map session lost its renderer after a fatal error")
            }
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(error) => Some(error),
            Self::Transform(error) => Some(error),
            Self::Device(error) => Some(error),
            Self::RenderThread(error) => Some(error),
            Self::Spawn(error) => Some(error),
            Self::AlreadyStarted | Self::NotStarted | Self::SessionUnavailable => None,
        }
    }
}

impl From<ConfigError> for MapError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<TransformError> for MapError {
    fn from(error: TransformError) -> Self {
        Self::Transform(error)
    }
}

impl From<DeviceError> for MapError {
    fn from(error: DeviceError) -> Self {
        Self::Device(error)
    }
}

impl From<RenderThreadError<DeviceError>> for MapError {
    fn from(error: RenderThreadError<DeviceError>) -> Self {
        Self::RenderThread(error)
    }
}
