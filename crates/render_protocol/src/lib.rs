//! Data shared between the map session, the frame preparation stage and the
//! draw pass orchestrator.
//!
//! - `matrix`: column-major 4x4 helpers used for projection and tile matrices.
//! - `snapshot`: the immutable per-frame camera state.
//! - `layers`: the resolved layer tree and its visibility predicates.

mod layers;
pub mod matrix;
mod snapshot;

pub use layers::{
    BackgroundLayer, BackgroundProperties, BucketRef, Color, CompositeProperties, FillProperties,
    GroupLayer, LayerKind, LayerNode, LayerProperties, LeafLayer, LineProperties, PatternRef,
    RasterProperties, SourceId, SymbolProperties, TranslateAnchor,
};
pub use matrix::{IDENTITY_MATRIX, TransformMatrix4x4};
pub use snapshot::{FrameSnapshot, FramebufferSize, LogicalSize, WorldPoint};
