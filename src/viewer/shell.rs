use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::templates;
use crate::viewer::bridge::{Bridge, Dispatch, FaultReport, HostCapabilities};
use crate::viewer::packager::{Packager, ResourceStore};
use crate::viewer::scale::{Measurements, RecomputeTrigger, ScaleEngine, Size, ViewportState};

// ── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct ViewerProps {
    pub content: Option<String>,
    pub title: String,
    pub show_back_button: bool,
    /// Passed through to the host's styling untouched.
    pub style_hint: Option<String>,
}

impl ViewerProps {
    pub fn new(content: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            title: title.into(),
            ..Default::default()
        }
    }
}

pub type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Notifications for the embedding application. All optional.
#[derive(Default)]
pub struct ViewerCallbacks {
    pub on_load: Option<Callback<()>>,
    pub on_load_error: Option<Callback<String>>,
    pub on_fault: Option<Callback<FaultReport>>,
    pub on_back: Option<Callback<()>>,
}

impl ViewerCallbacks {
    pub fn on_load(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_load = Some(Box::new(move |()| f()));
        self
    }

    pub fn on_load_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.on_load_error = Some(Box::new(f));
        self
    }

    pub fn on_fault(mut self, f: impl Fn(FaultReport) + Send + Sync + 'static) -> Self {
        self.on_fault = Some(Box::new(f));
        self
    }

    pub fn on_back(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_back = Some(Box::new(move |()| f()));
        self
    }
}

/// Collaborators the viewer needs from its host.
pub struct ViewerDeps {
    pub store: Arc<dyn ResourceStore>,
    pub capabilities: Arc<dyn HostCapabilities>,
    pub config: ViewerConfig,
}

// ── State ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "message")]
pub enum LifecycleStatus {
    Loading,
    Ready,
    Error(String),
    Reloading,
}

/// Native fullscreen action the host should perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FullscreenRequest {
    Enter,
    Exit,
}

// ── View model ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView {
    pub src: String,
    pub epoch: u64,
    pub title: String,
    pub sandbox: String,
    pub logical_width: f64,
    pub logical_height: f64,
    pub scale: f64,
    pub transform: String,
    pub scaled_size: Size,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsView {
    pub reload_enabled: bool,
    pub fullscreen_enabled: bool,
    pub is_fullscreen: bool,
    pub fullscreen_label: &'static str,
    pub show_back_button: bool,
}

/// Everything the presentation layer needs to draw the viewer.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellView {
    pub status: LifecycleStatus,
    pub loading_text: Option<String>,
    pub error_message: Option<String>,
    pub show_retry: bool,
    pub rotate_overlay: Option<&'static str>,
    pub controls: ControlsView,
    /// Stays present under the rotate overlay so the content keeps running.
    pub frame: Option<FrameView>,
    pub style_hint: Option<String>,
}

// ── Viewer ──────────────────────────────────────────────────────────────────

/// Isolated content viewer: packages markup, tracks its lifecycle, keeps the
/// frame scaled and relays bridge traffic.
pub struct Viewer {
    props: ViewerProps,
    callbacks: ViewerCallbacks,
    config: ViewerConfig,
    packager: Packager,
    scale: ScaleEngine,
    bridge: Bridge,
    status: LifecycleStatus,
    epoch: u64,
    fullscreen: bool,
}

impl Viewer {
    pub fn new(props: ViewerProps, callbacks: ViewerCallbacks, deps: ViewerDeps) -> Self {
        let ViewerDeps {
            store,
            capabilities,
            config,
        } = deps;
        let bridge = Bridge::new(capabilities).with_fallback_text(&config.share_fallback_text);
        let scale = ScaleEngine::new(config.frame, config.layout.clone());

        let mut viewer = Self {
            props,
            callbacks,
            config,
            packager: Packager::new(store),
            scale,
            bridge,
            status: LifecycleStatus::Loading,
            epoch: 0,
            fullscreen: false,
        };
        viewer.repackage();
        viewer
    }

    pub fn status(&self) -> &LifecycleStatus {
        &self.status
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn viewport(&self) -> ViewportState {
        self.scale.state()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// URL of the live packaged document, if there is one.
    pub fn frame_src(&self) -> Option<&str> {
        self.packager.current().map(|r| r.url())
    }

    fn set_status(&mut self, status: LifecycleStatus) {
        if self.status != status {
            log::info!("viewer '{}': {:?} -> {:?}", self.props.title, self.status, status);
            self.status = status;
        }
    }

    fn repackage(&mut self) {
        match self.packager.package(self.props.content.as_deref(), self.epoch) {
            Ok(resource) => {
                log::debug!("epoch {} packaged as {}", resource.epoch(), resource.url());
                self.set_status(LifecycleStatus::Loading);
            }
            Err(ViewerError::NoContent) => {
                self.set_status(LifecycleStatus::Error(templates::NO_CONTENT_MESSAGE.into()));
            }
            Err(e) => {
                self.set_status(LifecycleStatus::Error(e.to_string()));
            }
        }
    }

    // ── Content ─────────────────────────────────────────────────────────────

    /// Swap in new content. Any signal still in flight for the old document is
    /// ignored from here on.
    pub fn set_content(&mut self, content: Option<String>) {
        self.props.content = content;
        self.epoch += 1;
        self.repackage();
    }

    /// Reload the current content into a fresh resource.
    pub fn reload(&mut self) {
        self.set_status(LifecycleStatus::Reloading);
        self.epoch += 1;
        self.repackage();
    }

    // ── Load signals ────────────────────────────────────────────────────────

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.packager.current().is_some()
    }

    /// The isolated surface for `epoch` finished loading. Returns whether the
    /// signal was accepted.
    pub fn frame_loaded(&mut self, epoch: u64) -> bool {
        if !self.is_current(epoch) || self.status != LifecycleStatus::Loading {
            log::debug!("ignoring load signal for epoch {epoch} (current {})", self.epoch);
            return false;
        }
        self.set_status(LifecycleStatus::Ready);
        self.scale.refresh(RecomputeTrigger::ContentLoaded);
        if let Some(cb) = &self.callbacks.on_load {
            cb(());
        }
        true
    }

    /// The isolated surface for `epoch` failed to load.
    pub fn frame_failed(&mut self, epoch: u64, detail: &str) -> bool {
        if !self.is_current(epoch) || self.status != LifecycleStatus::Loading {
            log::debug!("ignoring error signal for epoch {epoch} (current {})", self.epoch);
            return false;
        }
        log::warn!("viewer '{}' failed to load: {detail}", self.props.title);
        let message = templates::LOAD_FAILED_MESSAGE.to_string();
        self.set_status(LifecycleStatus::Error(message.clone()));
        if let Some(cb) = &self.callbacks.on_load_error {
            cb(message);
        }
        true
    }

    // ── Bridge ──────────────────────────────────────────────────────────────

    /// Handle a message posted by the isolated content. Faults go to `on_fault`;
    /// capability requests run detached on the current tokio runtime, if any.
    ///
    /// Messages tagged with the epoch of a replaced document are ignored.
    pub fn receive_message(&self, raw: &Value) -> Dispatch {
        if let Some(epoch) = raw.get("epoch").and_then(Value::as_u64) {
            if !self.is_current(epoch) {
                log::debug!("dropping message from stale epoch {epoch} (current {})", self.epoch);
                return Dispatch::Ignored;
            }
        }

        let dispatch = self.bridge.dispatch(raw);
        if let Dispatch::Fault(report) = &dispatch {
            log::info!("fault from '{}': {}", self.props.title, report.message);
            if let Some(cb) = &self.callbacks.on_fault {
                cb(report.clone());
            }
        }
        dispatch
    }

    // ── Geometry ────────────────────────────────────────────────────────────

    /// Apply fresh measurements. Returns whether the viewport state changed.
    pub fn measure(&mut self, trigger: RecomputeTrigger, measurements: Measurements) -> bool {
        self.scale.recompute(trigger, measurements)
    }

    // ── Controls ────────────────────────────────────────────────────────────

    pub fn toggle_fullscreen(&self) -> FullscreenRequest {
        if self.fullscreen {
            FullscreenRequest::Exit
        } else {
            FullscreenRequest::Enter
        }
    }

    /// Record the host's actual fullscreen state. Returns how long to wait before
    /// measuring again, once the browser has finished the transition.
    pub fn fullscreen_changed(&mut self, active: bool) -> Duration {
        self.fullscreen = active;
        self.scale.settle_delay()
    }

    /// Invoke the back callback. Returns whether anything was called.
    pub fn back(&self) -> bool {
        if !self.props.show_back_button {
            return false;
        }
        match &self.callbacks.on_back {
            Some(cb) => {
                cb(());
                true
            }
            None => false,
        }
    }

    pub fn view(&self) -> ShellView {
        let viewport = self.scale.state();
        let frame_geometry = self.scale.frame();

        let frame = self.packager.current().map(|resource| FrameView {
            src: resource.url().to_string(),
            epoch: resource.epoch(),
            title: self.props.title.clone(),
            sandbox: self.config.sandbox_policy.clone(),
            logical_width: frame_geometry.logical_width,
            logical_height: frame_geometry.logical_height,
            scale: viewport.scale,
            transform: self.scale.transform(),
            scaled_size: self.scale.scaled_size(),
        });

        let (loading_text, error_message) = match &self.status {
            LifecycleStatus::Loading | LifecycleStatus::Reloading => {
                (Some(templates::loading_text(&self.props.title)), None)
            }
            LifecycleStatus::Error(message) => (None, Some(message.clone())),
            LifecycleStatus::Ready => (None, None),
        };

        let ready = self.status == LifecycleStatus::Ready;
        ShellView {
            status: self.status.clone(),
            loading_text,
            show_retry: error_message.is_some(),
            error_message,
            rotate_overlay: viewport
                .is_landscape_warning
                .then_some(templates::ROTATE_MESSAGE),
            controls: ControlsView {
                reload_enabled: ready || matches!(self.status, LifecycleStatus::Error(_)),
                fullscreen_enabled: ready,
                is_fullscreen: self.fullscreen,
                fullscreen_label: if self.fullscreen {
                    "Exit fullscreen"
                } else {
                    "Enter fullscreen"
                },
                show_back_button: self.props.show_back_button,
            },
            frame,
            style_hint: self.props.style_hint.clone(),
        }
    }
}
