use html_scraper::Selector;
use placerank_core::{Error, Result};
use serde::{Deserialize, Serialize};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Structural queries and endpoints for one generation of the site layout.
///
/// The result page carries no stable identifiers, so every lookup is an
/// ordered list of imprecise selectors. Keeping the lists here as plain data
/// means a new layout variant is an appended string, not an extraction-code
/// change, and tests can swap in their own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorProfile {
    /// Locates the result items themselves; first selector with any match
    /// wins (priority order, no merging).
    pub place_list: Vec<String>,
    /// Sponsored-content indicators; a hit on *any* of these, on the item or
    /// a descendant, classifies the item as an ad.
    pub ad_markers: Vec<String>,
    /// Locates the display-name field inside one item; first selector whose
    /// first match has non-empty text wins.
    pub shop_name: Vec<String>,
    /// `id` of the iframe embedding the actual result list.
    pub results_frame_id: String,
    /// Outer search endpoint; the keyword is appended as one path segment.
    pub search_base: String,
    /// Alternate result-list endpoint used when no results frame is found;
    /// the keyword is attached as a `query` parameter.
    pub fallback_base: String,
}

impl SelectorProfile {
    pub fn naver() -> Self {
        Self {
            place_list: [
                "div.Ryr1F#_pcmap_list_scroll_container > ul > li",
                "li.VLTHu",
                "li.UEzoS",
                "ul._3l82D > li",
                "ul._1s-8x > li",
                "div.place_section > ul > li",
                ".api_subject_bx > ul > li",
                "div._1EKsQ li.YjsMB",
            ]
            .map(String::from)
            .to_vec(),
            ad_markers: [
                ".gU6bV._DHlh",
                ".ad_area",
                ".ad-badge",
                ".OErwL",
                "span.OErwL",
            ]
            .map(String::from)
            .to_vec(),
            shop_name: [
                "a.place_bluelink span.YwYLL",
                "span.YwYLL",
                ".place_bluelink.tWIhh > span.O_Uah",
                "span.place_bluelink",
                "span.TYaxT",
                "span.LDgIH",
                "span.OXiLu",
                "span._3Apve",
                "span.place_bluelink._3Apve",
                ".place_bluelink",
                "a.place_link > span",
            ]
            .map(String::from)
            .to_vec(),
            results_frame_id: "searchIframe".to_string(),
            search_base: "https://map.naver.com/p/search/".to_string(),
            fallback_base: "https://pcmap.place.naver.com/place/list".to_string(),
        }
    }

    /// `naver()` with endpoint overrides from the environment, so fixture
    /// servers can stand in for the live site.
    ///
    /// - `PLACERANK_SEARCH_BASE`
    /// - `PLACERANK_FALLBACK_BASE`
    pub fn from_env() -> Self {
        let mut p = Self::naver();
        if let Some(v) = env("PLACERANK_SEARCH_BASE") {
            p.search_base = v;
        }
        if let Some(v) = env("PLACERANK_FALLBACK_BASE") {
            p.fallback_base = v;
        }
        p
    }

    /// Parse every selector string once. An unparsable selector is a
    /// configuration error, not something to skip silently.
    pub fn compile(&self) -> Result<CompiledProfile> {
        Ok(CompiledProfile {
            place_list: compile_list(&self.place_list)?,
            ad_markers: compile_list(&self.ad_markers)?,
            shop_name: compile_list(&self.shop_name)?,
            results_frame: compile_one(&format!("iframe#{}", self.results_frame_id))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledProfile {
    pub place_list: Vec<Selector>,
    pub ad_markers: Vec<Selector>,
    pub shop_name: Vec<Selector>,
    pub results_frame: Selector,
}

fn compile_one(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| Error::Parse {
        step: "compile_selectors",
        message: format!("bad selector {raw:?}: {e}"),
    })
}

fn compile_list(raw: &[String]) -> Result<Vec<Selector>> {
    raw.iter().map(|s| compile_one(s)).collect()
}
