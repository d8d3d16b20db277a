use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, ViewerError};
use crate::templates;

// ── Shim injection ──────────────────────────────────────────────────────────

/// Finds the byte offset just past the opening `<tag ...>`, matching the tag name
/// case-insensitively and only as a whole name (`<head` never matches `<header>`).
fn find_open_tag_end(html: &str, tag: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    let needle = format!("<{tag}");
    let mut from = 0;
    while let Some(rel) = lower[from..].find(&needle) {
        let start = from + rel;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                return lower[after..].find('>').map(|gt| after + gt + 1);
            }
            _ => from = after,
        }
    }
    None
}

/// Injects the capability/fault shim into untrusted markup.
///
/// The shim lands at the top of `<head>`. Without a head but with an `<html>` tag a
/// head is synthesized; with neither, the shim is simply prepended. Anything else
/// about the markup is left untouched. Messages from the shim are tagged with
/// `epoch`.
pub fn inject_shim(html: &str, epoch: u64) -> String {
    let shim = templates::shim_script(epoch);
    let shim = shim.as_str();
    let mut out = String::with_capacity(html.len() + shim.len() + 16);

    if let Some(pos) = find_open_tag_end(html, "head") {
        out.push_str(&html[..pos]);
        out.push_str(shim);
        out.push_str(&html[pos..]);
    } else if let Some(pos) = find_open_tag_end(html, "html") {
        out.push_str(&html[..pos]);
        out.push_str("<head>");
        out.push_str(shim);
        out.push_str("</head>");
        out.push_str(&html[pos..]);
    } else {
        out.push_str(shim);
        out.push_str(html);
    }
    out
}

// ── Resource store ──────────────────────────────────────────────────────────

/// Publishes packaged documents under loadable URLs and releases them again.
pub trait ResourceStore: Send + Sync {
    /// Store a document and return the URL the isolated surface should load.
    fn publish(&self, document: String) -> String;

    /// Free the storage behind a URL. Releasing an unknown URL is a no-op.
    fn release(&self, url: &str);
}

/// In-memory store handing out `<base><id>` URLs.
///
/// The default base mimics blob URLs; the Tauri host uses its custom scheme so the
/// webview can fetch documents straight from here.
pub struct MemoryResourceStore {
    base: String,
    next_id: AtomicU64,
    documents: Mutex<HashMap<String, Arc<str>>>,
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::with_base("blob:isoview/")
    }
}

impl MemoryResourceStore {
    pub fn with_base(base: &str) -> Self {
        Self {
            base: base.to_string(),
            next_id: AtomicU64::new(1),
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<str>>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a live document by its id (the part of the URL after the base).
    pub fn get(&self, id: &str) -> Option<Arc<str>> {
        self.documents().get(id).cloned()
    }

    pub fn get_by_url(&self, url: &str) -> Option<Arc<str>> {
        url.strip_prefix(self.base.as_str()).and_then(|id| self.get(id))
    }

    /// Number of documents that haven't been released yet.
    pub fn live_count(&self) -> usize {
        self.documents().len()
    }
}

impl ResourceStore for MemoryResourceStore {
    fn publish(&self, document: String) -> String {
        let id = format!("{:x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let url = format!("{}{}", self.base, id);
        self.documents().insert(id, Arc::from(document));
        url
    }

    fn release(&self, url: &str) {
        if let Some(id) = url.strip_prefix(self.base.as_str()) {
            self.documents().remove(id);
        }
    }
}

// ── Packaged resource ───────────────────────────────────────────────────────

/// A published document. Dropping it releases the underlying storage.
pub struct PackagedResource {
    url: String,
    epoch: u64,
    store: Arc<dyn ResourceStore>,
}

impl PackagedResource {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl std::fmt::Debug for PackagedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedResource")
            .field("url", &self.url)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Drop for PackagedResource {
    fn drop(&mut self) {
        log::debug!("releasing {} (epoch {})", self.url, self.epoch);
        self.store.release(&self.url);
    }
}

/// Owns the single live resource of a viewer.
pub struct Packager {
    store: Arc<dyn ResourceStore>,
    current: Option<PackagedResource>,
}

impl Packager {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Package `content` for `epoch`, replacing (and releasing) whatever was live.
    ///
    /// Empty (`""`) or missing content releases the previous resource and creates
    /// nothing. Whitespace is content like any other.
    pub fn package(&mut self, content: Option<&str>, epoch: u64) -> Result<&PackagedResource> {
        // Release first so the old and new documents never coexist.
        self.current = None;

        let content = match content {
            Some(c) if !c.is_empty() => c,
            _ => return Err(ViewerError::NoContent),
        };

        let document = inject_shim(content, epoch);
        let url = self.store.publish(document);
        log::debug!("published {url} (epoch {epoch})");

        Ok(&*self.current.insert(PackagedResource {
            url,
            epoch,
            store: self.store.clone(),
        }))
    }

    pub fn current(&self) -> Option<&PackagedResource> {
        self.current.as_ref()
    }

    /// Drop the live resource, if any.
    pub fn release(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIM_START: &str = "<script>";

    #[test]
    fn test_injects_after_head_tag() {
        let out = inject_shim("<html><HEAD lang=\"en\"><title>t</title></HEAD><body>hi</body></html>", 0);
        let expected_prefix = format!("<html><HEAD lang=\"en\">{}", templates::shim_script(0));
        assert!(out.starts_with(&expected_prefix));
        assert!(out.ends_with("<title>t</title></HEAD><body>hi</body></html>"));
    }

    #[test]
    fn test_header_is_not_head() {
        let out = inject_shim("<html><body><header>x</header></body></html>", 0);
        let expected = format!(
            "<html><head>{}</head><body><header>x</header></body></html>",
            templates::shim_script(0)
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_synthesizes_head_inside_html() {
        let out = inject_shim("<!DOCTYPE html><html lang=\"en\"><body>hi</body></html>", 0);
        assert!(out.starts_with("<!DOCTYPE html><html lang=\"en\"><head><script>"));
        assert!(out.ends_with("</script></head><body>hi</body></html>"));
    }

    #[test]
    fn test_prepends_to_fragments() {
        let out = inject_shim("<div>just a fragment</div>", 0);
        assert!(out.starts_with(SHIM_START));
        assert!(out.ends_with("</script><div>just a fragment</div>"));
    }

    #[test]
    fn test_malformed_markup_passes_through() {
        let out = inject_shim("<html <<< <body>unclosed", 3);
        let expected = format!(
            "<html <<< <body><head>{}</head>unclosed",
            templates::shim_script(3)
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_empty_content_creates_nothing() {
        let store = Arc::new(MemoryResourceStore::default());
        let mut packager = Packager::new(store.clone());

        assert!(matches!(packager.package(None, 1), Err(ViewerError::NoContent)));
        assert!(matches!(packager.package(Some(""), 2), Err(ViewerError::NoContent)));
        assert!(packager.current().is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_whitespace_content_is_packaged() {
        let store = Arc::new(MemoryResourceStore::default());
        let mut packager = Packager::new(store.clone());

        let url = packager.package(Some("  \n "), 4).unwrap().url().to_string();
        let doc = store.get_by_url(&url).unwrap();
        assert_eq!(&*doc, format!("{}  \n ", templates::shim_script(4)));
    }

    #[test]
    fn test_document_shim_carries_epoch() {
        let store = Arc::new(MemoryResourceStore::default());
        let mut packager = Packager::new(store.clone());

        let url = packager.package(Some("<p>x</p>"), 12).unwrap().url().to_string();
        assert!(store.get_by_url(&url).unwrap().contains("var epoch = 12;"));
    }

    #[test]
    fn test_only_latest_resource_stays_live() {
        let store = Arc::new(MemoryResourceStore::default());
        let mut packager = Packager::new(store.clone());

        let mut last_url = String::new();
        for epoch in 0..10 {
            let html = format!("<html><body>{epoch}</body></html>");
            last_url = packager.package(Some(&html), epoch).unwrap().url().to_string();
            assert_eq!(store.live_count(), 1);
        }

        let doc = store.get_by_url(&last_url).unwrap();
        assert!(doc.contains("<body>9</body>"));
        assert_eq!(packager.current().unwrap().epoch(), 9);
    }

    #[test]
    fn test_empty_content_releases_previous() {
        let store = Arc::new(MemoryResourceStore::default());
        let mut packager = Packager::new(store.clone());
        packager.package(Some("<p>x</p>"), 0).unwrap();
        assert_eq!(store.live_count(), 1);

        let _ = packager.package(Some(""), 1);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let store = Arc::new(MemoryResourceStore::default());
        {
            let mut packager = Packager::new(store.clone());
            packager.package(Some("<p>x</p>"), 0).unwrap();
            assert_eq!(store.live_count(), 1);
        }
        assert_eq!(store.live_count(), 0);
    }
}
