use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{FrameGeometry, LayoutConfig};
use crate::util::parse_css_px;

/// Width/height pair in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Everything the host measures before asking for a new fit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    /// The container's bounding box.
    pub container: Option<Size>,
    /// `window.visualViewport`, when the browser provides one.
    #[serde(default)]
    pub visual_viewport: Option<Size>,
    /// Raw computed values of the safe-area custom properties.
    #[serde(default)]
    pub safe_top: Option<String>,
    #[serde(default)]
    pub safe_bottom: Option<String>,
}

impl Measurements {
    pub fn container(width: f64, height: f64) -> Self {
        Self {
            container: Some(Size::new(width, height)),
            ..Default::default()
        }
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> Self {
        self.visual_viewport = Some(Size::new(width, height));
        self
    }

    pub fn with_safe_area(mut self, top: &str, bottom: &str) -> Self {
        self.safe_top = Some(top.to_string());
        self.safe_bottom = Some(bottom.to_string());
        self
    }

    fn insets(&self) -> (f64, f64) {
        let top = self.safe_top.as_deref().map(parse_css_px).unwrap_or(0.0);
        let bottom = self.safe_bottom.as_deref().map(parse_css_px).unwrap_or(0.0);
        (top, bottom)
    }
}

/// Why a recompute was requested. Only used for logging; every trigger funnels
/// into the same computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecomputeTrigger {
    ContainerResize,
    WindowResize,
    VisualViewportResize,
    OrientationChange,
    ContentLoaded,
    FullscreenChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub scale: f64,
    pub is_landscape_warning: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            is_landscape_warning: false,
        }
    }
}

/// Computes the scale that fits the logical frame into the measured space.
pub fn compute_viewport(
    frame: &FrameGeometry,
    layout: &LayoutConfig,
    measurements: &Measurements,
) -> ViewportState {
    let container = measurements.container.unwrap_or(Size::new(0.0, 0.0));
    // Mobile browsers report the dynamic toolbar-adjusted height here; without it the
    // container's own height is the best we have.
    let viewport = measurements.visual_viewport.unwrap_or(container);
    let (safe_top, safe_bottom) = measurements.insets();

    let available_width = (container.width - layout.horizontal_margin).max(layout.min_width);
    let available_height = (viewport.height - safe_top - safe_bottom - layout.vertical_margin)
        .max(layout.min_height);

    let fit = (available_width / frame.logical_width)
        .min(available_height / frame.logical_height)
        .min(1.0);
    let scale = if fit.is_finite() {
        fit.max(layout.min_scale)
    } else {
        layout.min_scale
    };

    let is_landscape_warning =
        viewport.width > viewport.height && viewport.width < layout.tablet_breakpoint;

    ViewportState {
        scale,
        is_landscape_warning,
    }
}

/// Holds the last measurements and derived state so redundant triggers are cheap.
#[derive(Debug)]
pub struct ScaleEngine {
    frame: FrameGeometry,
    layout: LayoutConfig,
    last: Option<Measurements>,
    state: ViewportState,
}

impl ScaleEngine {
    pub fn new(frame: FrameGeometry, layout: LayoutConfig) -> Self {
        Self {
            frame,
            layout,
            last: None,
            state: ViewportState::default(),
        }
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn frame(&self) -> FrameGeometry {
        self.frame
    }

    /// How long to wait after a fullscreen transition before measuring again.
    pub fn settle_delay(&self) -> Duration {
        self.layout.fullscreen_settle()
    }

    /// Recompute from fresh measurements. Returns `true` when the state changed.
    pub fn recompute(&mut self, trigger: RecomputeTrigger, measurements: Measurements) -> bool {
        if self.last.as_ref() == Some(&measurements) {
            return false;
        }
        let next = compute_viewport(&self.frame, &self.layout, &measurements);
        self.last = Some(measurements);
        self.apply(trigger, next)
    }

    /// Recompute from the last known measurements, e.g. after content finished
    /// loading. Does nothing before the first measurement.
    pub fn refresh(&mut self, trigger: RecomputeTrigger) -> bool {
        let Some(measurements) = self.last.as_ref() else {
            return false;
        };
        let next = compute_viewport(&self.frame, &self.layout, measurements);
        self.apply(trigger, next)
    }

    fn apply(&mut self, trigger: RecomputeTrigger, next: ViewportState) -> bool {
        if next == self.state {
            return false;
        }
        log::debug!(
            "viewport {:?}: scale {:.4} -> {:.4}, landscape warning {}",
            trigger,
            self.state.scale,
            next.scale,
            next.is_landscape_warning
        );
        self.state = next;
        true
    }

    /// CSS transform applied to the logical-size frame.
    pub fn transform(&self) -> String {
        format!("scale({})", self.state.scale)
    }

    /// Outer box the scaled frame occupies in the page.
    pub fn scaled_size(&self) -> Size {
        Size::new(
            self.frame.logical_width * self.state.scale,
            self.frame.logical_height * self.state.scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ScaleEngine {
        ScaleEngine::new(FrameGeometry::default(), LayoutConfig::default())
    }

    fn compute(m: &Measurements) -> ViewportState {
        compute_viewport(&FrameGeometry::default(), &LayoutConfig::default(), m)
    }

    #[test]
    fn test_large_container_caps_at_one() {
        let state = compute(&Measurements::container(3000.0, 3000.0));
        assert_eq!(state.scale, 1.0);
    }

    #[test]
    fn test_narrow_container_uses_width_floor() {
        // (320 - 100) is below the 280px floor, so width contributes 280 / 1080.
        let state = compute(&Measurements::container(320.0, 600.0));
        let expected = (280.0_f64 / 1080.0).min(480.0 / 1350.0);
        assert!((state.scale - expected).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_container_clamps_to_min_scale() {
        let mut layout = LayoutConfig::default();
        layout.min_width = 10.0;
        layout.min_height = 10.0;
        let state = compute_viewport(
            &FrameGeometry::default(),
            &layout,
            &Measurements::container(120.0, 150.0),
        );
        assert_eq!(state.scale, 0.25);
    }

    #[test]
    fn test_safe_area_insets_reduce_height() {
        let without = compute(&Measurements::container(2000.0, 1000.0));
        let with = compute(&Measurements::container(2000.0, 1000.0).with_safe_area("44px", "34px"));
        assert!((without.scale - 880.0 / 1350.0).abs() < 1e-12);
        assert!((with.scale - 802.0 / 1350.0).abs() < 1e-12);
    }

    #[test]
    fn test_unparseable_insets_default_to_zero() {
        let plain = compute(&Measurements::container(900.0, 900.0));
        let junk = compute(&Measurements::container(900.0, 900.0).with_safe_area("", "auto"));
        assert_eq!(plain, junk);
    }

    #[test]
    fn test_visual_viewport_overrides_container_height() {
        let m = Measurements::container(1200.0, 1600.0).with_viewport(1200.0, 700.0);
        let state = compute(&m);
        assert!((state.scale - 580.0 / 1350.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_bounds_hold_across_sizes() {
        let layout = LayoutConfig::default();
        let frame = FrameGeometry::default();
        for w in (1..=40).map(|i| i as f64 * 50.0) {
            for h in (1..=40).map(|i| i as f64 * 50.0) {
                for (t, b) in [("0", "0"), ("20px", "30px")] {
                    let m = Measurements::container(w, h).with_safe_area(t, b);
                    let state = compute_viewport(&frame, &layout, &m);
                    assert!(state.scale >= layout.min_scale && state.scale <= 1.0);

                    let (top, bottom) = m.insets();
                    let aw = (w - layout.horizontal_margin).max(layout.min_width);
                    let ah = (h - top - bottom - layout.vertical_margin).max(layout.min_height);
                    if state.scale > layout.min_scale {
                        assert!(state.scale * frame.logical_width <= aw + 1e-9);
                        assert!(state.scale * frame.logical_height <= ah + 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_landscape_warning_only_below_breakpoint() {
        assert!(compute(&Measurements::container(800.0, 400.0)).is_landscape_warning);
        assert!(!compute(&Measurements::container(1280.0, 700.0)).is_landscape_warning);
        assert!(!compute(&Measurements::container(400.0, 800.0)).is_landscape_warning);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut engine = engine();
        let m = Measurements::container(600.0, 900.0);
        assert!(engine.recompute(RecomputeTrigger::ContainerResize, m.clone()));
        assert!(!engine.recompute(RecomputeTrigger::WindowResize, m.clone()));
        assert!(!engine.refresh(RecomputeTrigger::ContentLoaded));
        assert_eq!(engine.transform(), format!("scale({})", engine.state().scale));
    }

    #[test]
    fn test_refresh_before_measurement_is_noop() {
        let mut engine = engine();
        assert!(!engine.refresh(RecomputeTrigger::ContentLoaded));
        assert_eq!(engine.state(), ViewportState::default());
    }

    #[test]
    fn test_scaled_size_follows_scale() {
        let mut engine = engine();
        engine.recompute(
            RecomputeTrigger::ContainerResize,
            Measurements::container(640.0, 795.0),
        );
        let size = engine.scaled_size();
        assert!((size.height - 675.0).abs() < 1e-9);
        assert!((size.width - 540.0).abs() < 1e-9);
        assert_eq!(engine.settle_delay(), Duration::from_millis(150));
    }
}
