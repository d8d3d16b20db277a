/// Text used when a share request carries nothing usable.
pub const SHARE_FALLBACK_TEXT: &str = "Check this out!";

/// Sandbox attribute for the isolated frame. Scripts run, but the document gets an
/// opaque origin and can't navigate the top-level page.
pub const SANDBOX_POLICY: &str =
    "allow-scripts allow-pointer-lock allow-forms allow-modals allow-popups";

pub const NO_CONTENT_MESSAGE: &str = "No content to display";

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load content";

pub const ROTATE_MESSAGE: &str = "Rotate your device to portrait for the best experience";

/// Returns the loading indicator text for a piece of content.
pub fn loading_text(title: &str) -> String {
    if title.trim().is_empty() {
        "Loading...".to_string()
    } else {
        format!("Loading {}...", title.trim())
    }
}

/// Returns the script injected into every packaged document.
///
/// The frame has no native share/clipboard access, so both are rerouted to
/// `postMessage` calls the host understands. Uncaught errors and unhandled
/// rejections are reported as `fault` messages and the default console noise is
/// suppressed. Every message carries the `epoch` of the document it came from so
/// the host can drop traffic from a replaced document.
pub fn shim_script(epoch: u64) -> String {
    SHIM_TEMPLATE.replace("{{EPOCH}}", &epoch.to_string())
}

const SHIM_TEMPLATE: &str = r#"<script>
(function () {
  var epoch = {{EPOCH}};
  var post = function (message) {
    message.epoch = epoch;
    try { window.parent.postMessage(message, '*'); } catch (_) {}
  };

  var nav = window.navigator;
  try {
    Object.defineProperty(nav, 'share', {
      configurable: true,
      value: function (data) {
        post({ type: 'share', data: data || {} });
        return Promise.resolve();
      }
    });
    Object.defineProperty(nav, 'canShare', {
      configurable: true,
      value: function () { return true; }
    });
  } catch (_) {}

  var writeText = function (text) {
    post({ type: 'copy', text: String(text) });
    return Promise.resolve();
  };
  try {
    if (nav.clipboard) {
      Object.defineProperty(nav.clipboard, 'writeText', { configurable: true, value: writeText });
    } else {
      Object.defineProperty(nav, 'clipboard', { configurable: true, value: { writeText: writeText } });
    }
  } catch (_) {}

  window.addEventListener('error', function (event) {
    post({
      type: 'fault',
      error: {
        message: String(event.message || 'Unknown error'),
        line: event.lineno,
        col: event.colno,
        stack: event.error && event.error.stack ? String(event.error.stack) : undefined
      }
    });
    event.preventDefault();
  });

  window.addEventListener('unhandledrejection', function (event) {
    var reason = event.reason;
    post({
      type: 'fault',
      error: {
        message: reason && reason.message ? String(reason.message) : String(reason),
        stack: reason && reason.stack ? String(reason.stack) : undefined
      }
    });
    event.preventDefault();
  });
})();
</script>"#;
