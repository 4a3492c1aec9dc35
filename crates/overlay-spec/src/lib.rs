//! Overlay Spec Types
//!
//! Plain data model for signed overlays and the renderables they customize.
//! The same structures are used in memory and on the wire (camelCase JSON).

pub mod modification;
pub mod overlay;
pub mod renderable;
pub mod scope;

pub use modification::{
    AddHelpText, HideField, MakeRequired, OverlayModification, RenameLabel, ReorderFields,
    SetDefault, MODIFICATION_TYPES,
};
pub use overlay::{OverlayRef, OverlaySignature, OverlaySpec, SignedOverlaySpec};
pub use renderable::{OverlayRenderable, OverlayRenderableField};
pub use scope::{OverlayAppliesTo, OverlayLookup, OverlayScopeContext, OverlayTargetRef};

/// Free-form metadata attached to specs, signatures and renderables.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
