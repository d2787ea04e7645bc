use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("http status {status} for {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("{step}: {message}")]
    Parse { step: &'static str, message: String },
    #[error("no result list located: {0}")]
    Structure(String),
    #[error("deadline exceeded: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a candidate listing name is compared against the target shop name.
///
/// Both sides are normalized (trimmed, lowercased, whitespace-collapsed)
/// before comparison; a side that normalizes to empty never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Substring containment in either direction. This is bidirectional on
    /// purpose: it covers both "listing carries a branded suffix" and
    /// "target carries a branded suffix".
    Partial,
    /// Equality of the normalized forms.
    Exact,
}

impl MatchStrategy {
    pub fn matches(self, candidate: &str, target: &str) -> bool {
        let left = normalize(candidate);
        let right = normalize(target);
        if left.is_empty() || right.is_empty() {
            return false;
        }
        match self {
            Self::Exact => left == right,
            Self::Partial => left.contains(&right) || right.contains(&left),
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partial" => Ok(Self::Partial),
            "exact" => Ok(Self::Exact),
            other => Err(format!("invalid match strategy: {other}")),
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Partial => f.write_str("partial"),
            Self::Exact => f.write_str("exact"),
        }
    }
}

/// Canonical form used for all name comparisons: trimmed, lowercased, with
/// every internal whitespace run collapsed to a single space.
///
/// Deliberately no Unicode normalization beyond case folding; callers that
/// need combining-character equivalence must normalize upstream.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Input of one ranking run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankQuery {
    pub keyword: String,
    pub shop_name: String,
    pub strategy: MatchStrategy,
}

/// One organic (non-ad) listing, in source-document order.
///
/// `rank` is 1-based and counts organic items only; ad items neither appear
/// here nor consume a rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceItem {
    pub rank: u32,
    pub name: String,
}

/// The single owned output of a ranking run.
///
/// Constructed once after the run completes; an error replaces it entirely,
/// never populates it partially. `found = false` is a successful outcome
/// ("query ran, target not listed"), not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankResult {
    pub keyword: String,
    pub shop_name: String,
    pub strategy: MatchStrategy,
    pub found: bool,
    /// 1-based rank of the first matching organic item, or -1.
    pub rank: i32,
    /// Name of the first matching organic item, or empty.
    pub matched_name: String,
    /// Every named organic item in document order, match or not.
    pub items: Vec<PlaceItem>,
    /// Organic items walked, including ones whose name could not be
    /// extracted (those still occupy a ranking position).
    pub items_scanned: u32,
    pub search_url: String,
    pub iframe_url: String,
}

impl RankResult {
    pub fn not_found(query: &RankQuery) -> Self {
        Self {
            keyword: query.keyword.clone(),
            shop_name: query.shop_name.clone(),
            strategy: query.strategy,
            found: false,
            rank: -1,
            matched_name: String::new(),
            items: Vec::new(),
            items_scanned: 0,
            search_url: String::new(),
            iframe_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for this one request. Callers running multiple fetches under
    /// a shared deadline pass the remaining budget here.
    pub timeout: Option<Duration>,
    /// Headers to add (best-effort; adapters may drop invalid ones).
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}
