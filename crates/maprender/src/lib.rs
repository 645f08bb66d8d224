//! Map rendering session.
//!
//! Ties the pieces together: caller threads edit the camera and post style
//! or source changes through a `MapHandle`; the render thread prepares each
//! frame (camera snapshot, active sources, tile sets, clip IDs), draws it
//! with the `renderer` and hands it to a `Presenter`. The `frame_scheduler`
//! decides when any of that runs.

mod config;
mod error;
mod frame_prepare;
mod presenter;
mod session;
mod style;
mod tiled_source;

pub use config::{CameraConfig, ConfigError, MapConfig, RenderConfig, SchedulerConfig};
pub use error::MapError;
pub use frame_prepare::{FramePreparer, PreparedFrame};
pub use presenter::{DeferredPresenter, ImmediatePresenter, Presenter, WgpuPresenter};
pub use session::{DebugOptions, Map, MapHandle};
pub use style::{StaticStyle, Style};
pub use tiled_source::{LoadedTile, TileLoader, TiledSource, TiledSourceConfig};
