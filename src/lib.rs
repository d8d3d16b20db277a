//! Sandboxed viewer core for AI-generated interactive content.
//!
//! Untrusted markup is shimmed and published as a loadable document, scaled to a
//! fixed logical frame, and talks to its host only through a typed message bridge.
//! Enable the `tauri-host` feature for a ready-made Tauri plugin.

#[cfg(feature = "tauri-host")]
pub mod commands;
pub mod config;
pub mod error;
pub mod logs;
pub mod source;
mod templates;
pub mod util;
pub mod viewer;

pub use config::{load_config, FrameGeometry, LayoutConfig, ViewerConfig};
pub use error::{Result, ViewerError};
pub use viewer::{
    FaultReport, HostCapabilities, LifecycleStatus, Measurements, MemoryResourceStore,
    RecomputeTrigger, ShellView, Viewer, ViewerCallbacks, ViewerDeps, ViewerProps,
};

#[cfg(feature = "tauri-host")]
pub use commands::plugin;
