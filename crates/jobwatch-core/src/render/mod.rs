//! Render - Renderer の実装とツール別の可視化
//!
//! - `VizRegistry`: tool key → `JobViz`
//! - `viz`: docking / ABFE / RBFE / system-prep の組み込み可視化
//! - `TextRenderer`: ターミナル向けの Renderer

pub mod registry;
pub mod viz;
pub mod text;

pub use self::registry::{JobViz, RegistryError, VizRegistry};
pub use self::viz::{
    ABFE_TOOL_KEY, AbfeViz, DOCKING_TOOL_KEY, DockingViz, RBFE_TOOL_KEY, RbfeViz,
    SYSTEM_PREP_TOOL_KEY, SystemPrepViz, describe_fep_progress, describe_generic_progress,
};
pub use self::text::TextRenderer;
