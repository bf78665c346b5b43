//! Origin and the last-known frame cell.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Base URL prefixed to relative frame paths. Immutable after startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(Arc<str>);

impl Origin {
    /// Wrap a base URL.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    /// Resolve a relative frame path into an absolute URL.
    ///
    /// Plain concatenation: no normalisation of slashes or validation.
    pub fn resolve(&self, path: &str) -> String {
        let mut url = String::with_capacity(self.0.len() + path.len());
        url.push_str(&self.0);
        url.push_str(path);
        url
    }

    /// The base URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The most recently observed absolute frame URL, or absent.
///
/// Last write wins: every [`record`](Self::record) replaces the previous
/// value unconditionally and no history is kept. Writes and reads swap a
/// whole `Arc<str>` under the lock, so a reader only ever sees a complete
/// value that some writer stored.
#[derive(Debug)]
pub struct LastFrame {
    origin: Origin,
    latest: RwLock<Option<Arc<str>>>,
}

impl LastFrame {
    /// Create an empty cell resolving paths against `origin`.
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            latest: RwLock::new(None),
        }
    }

    /// Resolve `path` against the origin and store it, returning the URL.
    pub fn record(&self, path: &str) -> String {
        let url = self.origin.resolve(path);
        *self.latest.write() = Some(Arc::from(url.as_str()));
        url
    }

    /// Current absolute frame URL, if any frame has been observed.
    pub fn latest(&self) -> Option<String> {
        self.latest.read().as_deref().map(str::to_owned)
    }

    /// The origin frames are resolved against.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> LastFrame {
        LastFrame::new(Origin::new("http://host:8000"))
    }

    #[test]
    fn resolve_concatenates() {
        let origin = Origin::new("http://host:8000");
        assert_eq!(origin.resolve("/img/42.jpg"), "http://host:8000/img/42.jpg");
    }

    #[test]
    fn resolve_does_not_normalise() {
        let origin = Origin::new("http://host:8000/");
        assert_eq!(origin.resolve("/a.jpg"), "http://host:8000//a.jpg");
        assert_eq!(origin.resolve("a.jpg"), "http://host:8000/a.jpg");
    }

    #[test]
    fn empty_before_first_record() {
        assert_eq!(cell().latest(), None);
    }

    #[test]
    fn record_stores_absolute_url() {
        let frames = cell();
        let url = frames.record("/img/42.jpg");
        assert_eq!(url, "http://host:8000/img/42.jpg");
        assert_eq!(frames.latest().as_deref(), Some("http://host:8000/img/42.jpg"));
    }

    #[test]
    fn last_write_wins() {
        let frames = cell();
        for i in 0..10 {
            let _ = frames.record(&format!("/img/{i}.jpg"));
        }
        assert_eq!(frames.latest().as_deref(), Some("http://host:8000/img/9.jpg"));
    }

    #[test]
    fn empty_path_degrades_to_origin() {
        let frames = cell();
        let _ = frames.record("");
        assert_eq!(frames.latest().as_deref(), Some("http://host:8000"));
    }

    #[test]
    fn concurrent_reads_see_whole_values() {
        let frames = Arc::new(cell());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let frames = Arc::clone(&frames);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let _ = frames.record(&format!("/w{w}/{i}.jpg"));
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            if let Some(url) = frames.latest() {
                let rest = url.strip_prefix("http://host:8000/w").unwrap();
                let (w, tail) = rest.split_once('/').unwrap();
                assert!(w.parse::<u32>().unwrap() < 4);
                assert!(tail.ends_with(".jpg"));
            }
        }

        for handle in writers {
            handle.join().unwrap();
        }
        assert!(frames.latest().unwrap().ends_with("/499.jpg"));
    }

    #[test]
    fn origin_display_and_serde() {
        let origin = Origin::new("http://h:1");
        assert_eq!(origin.to_string(), "http://h:1");
        assert_eq!(serde_json::to_string(&origin).unwrap(), r#""http://h:1""#);
        let back: Origin = serde_json::from_str(r#""http://h:1""#).unwrap();
        assert_eq!(back, origin);
    }
}
