use std::fmt;

/// Identifier of the broadcaster being monitored.
///
/// Only guaranteed to be non-empty; it is interpolated verbatim into page
/// URLs and recording file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel(String);

impl Channel {
    /// Wrap a channel name, rejecting empty or whitespace-only names.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical page URL: `https://<host>/<channel>`.
    pub fn page_url(&self, host: &str) -> String {
        format!("https://{}/{}", host.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
