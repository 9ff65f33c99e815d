/// Live-status heuristic: classify a rendered channel page as live or offline.
///
/// The page offers no stable status API, so the decision is made from a
/// layered set of signals evaluated in fixed precedence order:
/// 1. title contains the "watch live" marker AND a `<video>` element exists
/// 2. raw HTML contains one of the live-indicator literals
/// 3. a `<video>` element has a populated `src`/`currentSrc`
/// 4. raw HTML contains an offline marker (case-insensitive) -> explicit offline
/// 5. otherwise offline
///
/// The markers are data (`HeuristicTable`), versioned and overridable from
/// the config file, because they track upstream markup that changes often.
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Result of a single detection attempt. Never cached across polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Live,
    Offline,
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiveStatus::Live => f.write_str("live"),
            LiveStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Which rule decided a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    TitleAndVideo,
    LiveMarker(String),
    VideoSource,
    OfflineMarker(String),
    NoSignal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: LiveStatus,
    pub signal: Signal,
}

impl Verdict {
    fn live(signal: Signal) -> Self {
        Self {
            status: LiveStatus::Live,
            signal,
        }
    }

    fn offline(signal: Signal) -> Self {
        Self {
            status: LiveStatus::Offline,
            signal,
        }
    }
}

/// Facts extracted from a fully rendered page by a single script evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    pub title: String,
    pub html: String,
    pub has_video: bool,
    /// `src` or `currentSrc` of the first `<video>` element, if any.
    pub video_source: Option<String>,
}

/// Versioned marker table, as written in the `[heuristic]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeuristicTable {
    pub version: u32,
    pub title_marker: String,
    pub live_markers: Vec<String>,
    pub offline_markers: Vec<String>,
}

impl Default for HeuristicTable {
    fn default() -> Self {
        Self {
            version: 1,
            title_marker: "watch live".to_string(),
            live_markers: vec![
                r#""is_live":true"#.to_string(),
                r#""livestream":{"#.to_string(),
                "LIVE</span>".to_string(),
                "LIVE</div>".to_string(),
                "stream is live".to_string(),
            ],
            offline_markers: vec!["offline".to_string(), "not streaming".to_string()],
        }
    }
}

impl HeuristicTable {
    /// Compile the table into matchers. Empty markers, including an empty
    /// title marker, are dropped since they would match every page.
    pub fn compile(&self) -> Result<Heuristic, regex::Error> {
        let title = match self.title_marker.trim() {
            "" => None,
            marker => Some(case_insensitive(marker)?),
        };

        let live_markers = self
            .live_markers
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect();

        let offline_markers = self
            .offline_markers
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| Ok((m.clone(), case_insensitive(m)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Heuristic {
            version: self.version,
            title,
            live_markers,
            offline_markers,
        })
    }
}

fn case_insensitive(literal: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){}", regex::escape(literal)))
}

/// Compiled form of a `HeuristicTable`.
#[derive(Debug, Clone)]
pub struct Heuristic {
    version: u32,
    title: Option<Regex>,
    live_markers: Vec<String>,
    offline_markers: Vec<(String, Regex)>,
}

impl Heuristic {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Classify a snapshot. Pure: the same snapshot always yields the same verdict.
    pub fn classify(&self, page: &PageSnapshot) -> Verdict {
        let title_matches = self.title.as_ref().is_some_and(|t| t.is_match(&page.title));
        if page.has_video && title_matches {
            return Verdict::live(Signal::TitleAndVideo);
        }

        if let Some(marker) = self
            .live_markers
            .iter()
            .find(|m| page.html.contains(m.as_str()))
        {
            return Verdict::live(Signal::LiveMarker(marker.clone()));
        }

        if page.video_source.as_deref().is_some_and(|s| !s.is_empty()) {
            return Verdict::live(Signal::VideoSource);
        }

        if let Some((marker, _)) = self
            .offline_markers
            .iter()
            .find(|(_, re)| re.is_match(&page.html))
        {
            return Verdict::offline(Signal::OfflineMarker(marker.clone()));
        }

        Verdict::offline(Signal::NoSignal)
    }
}

#[cfg(test)]
impl Default for Heuristic {
    fn default() -> Self {
        HeuristicTable::default()
            .compile()
            .expect("default heuristic table compiles")
    }
}
