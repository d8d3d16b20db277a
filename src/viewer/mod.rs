//! The isolated content viewer.
//!
//! - [`scale`] fits the fixed logical frame into whatever space the host measured.
//! - [`packager`] shims untrusted markup and owns the one live document.
//! - [`bridge`] parses messages from the frame and performs capability requests.
//! - [`shell`] ties them together behind the lifecycle state machine.

pub mod bridge;
pub mod packager;
pub mod scale;
pub mod shell;

pub use bridge::{
    Bridge, BridgeMessage, CapabilityError, Dispatch, FaultReport, HostCapabilities,
    NoCapabilities, SharePayload,
};
pub use packager::{inject_shim, MemoryResourceStore, PackagedResource, Packager, ResourceStore};
pub use scale::{compute_viewport, Measurements, RecomputeTrigger, ScaleEngine, Size, ViewportState};
pub use shell::{
    FullscreenRequest, LifecycleStatus, ShellView, Viewer, ViewerCallbacks, ViewerDeps,
    ViewerProps,
};
