use crate::dom;
use crate::profile::{CompiledProfile, SelectorProfile};
use html_scraper::Html;
use placerank_core::{
    Error, FetchBackend, FetchRequest, FetchResponse, MatchStrategy, PlaceItem, RankQuery,
    RankResult, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
const DEFAULT_REFERER: &str = "https://map.naver.com/";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Browser-like headers sent with both page fetches.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    pub user_agent: String,
    pub accept_language: String,
    pub referer: String,
    pub accept: String,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
        }
    }
}

impl RequestHeaders {
    fn to_map(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert("User-Agent".to_string(), self.user_agent.clone());
        out.insert("Accept-Language".to_string(), self.accept_language.clone());
        out.insert("Referer".to_string(), self.referer.clone());
        out.insert("Accept".to_string(), self.accept.clone());
        out
    }
}

/// Outer search URL: the keyword percent-encoded as one path segment against
/// the search base, with the fixed place filter attached.
pub fn build_search_url(base: &str, keyword: &str) -> Result<String> {
    let mut url = url::Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(format!("{base}: cannot be a base")))?
        .pop_if_empty()
        .push(keyword);
    url.set_query(Some("searchType=place"));
    Ok(url.to_string())
}

/// Recover the keyword from the outer search URL by decoding its last path
/// segment. Returns empty on anything unexpected; the fallback URL then
/// simply carries an empty query, mirroring a keywordless lookup.
pub fn keyword_from_search_url(search_url: &str) -> String {
    let Ok(url) = url::Url::parse(search_url) else {
        return String::new();
    };
    let Some(last) = url.path_segments().and_then(|segs| segs.last()) else {
        return String::new();
    };
    percent_encoding::percent_decode_str(last)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_default()
}

/// Deterministic alternate result-list URL, used when the outer page carries
/// no locatable results frame.
pub fn fallback_frame_url(base: &str, keyword: &str) -> Result<String> {
    let mut url = url::Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;
    url.query_pairs_mut().append_pair("query", keyword);
    Ok(url.to_string())
}

/// Find the results frame in the outer document and resolve its (possibly
/// relative) `src` against the outer URL.
///
/// The embedding frame is sometimes absent or renamed; in that case this
/// falls back to a constructed URL rather than failing the run.
pub fn locate_frame_url(
    outer_html: &str,
    outer_url: &str,
    profile: &SelectorProfile,
    compiled: &CompiledProfile,
) -> Result<String> {
    let doc = Html::parse_document(outer_html);
    let src = doc
        .select(&compiled.results_frame)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(str::trim)
        .unwrap_or("");

    if src.is_empty() {
        let keyword = keyword_from_search_url(outer_url);
        return fallback_frame_url(&profile.fallback_base, &keyword);
    }

    let base = url::Url::parse(outer_url).map_err(|e| Error::Parse {
        step: "parse_search_url",
        message: e.to_string(),
    })?;
    let resolved = base.join(src).map_err(|e| Error::Parse {
        step: "parse_iframe_url",
        message: e.to_string(),
    })?;
    Ok(resolved.to_string())
}

#[derive(Debug, Clone)]
pub struct RankedList {
    pub items: Vec<PlaceItem>,
    pub scanned: u32,
    /// First organic item (document order) satisfying the matcher. Scanning
    /// does not stop at the first hit, so `items` still lists every named
    /// organic item after it.
    pub matched: Option<PlaceItem>,
}

/// Network-free half of the pipeline: extract, then match.
pub fn rank_in_html(
    html: &str,
    compiled: &CompiledProfile,
    shop_name: &str,
    strategy: MatchStrategy,
) -> Result<RankedList> {
    let doc = Html::parse_document(html);
    let extraction = dom::extract_items(&doc, compiled)?;
    let matched = extraction
        .items
        .iter()
        .find(|it| strategy.matches(&it.name, shop_name))
        .cloned();
    Ok(RankedList {
        items: extraction.items,
        scanned: extraction.scanned,
        matched,
    })
}

/// One-shot ranking orchestrator: build URL, fetch, locate frame, fetch,
/// extract, match. Strictly sequential, exactly one attempt per fetch, no
/// state across runs.
pub struct RankEngine {
    fetcher: Arc<dyn FetchBackend>,
    profile: SelectorProfile,
    compiled: CompiledProfile,
    headers: RequestHeaders,
}

impl RankEngine {
    pub fn new(
        fetcher: Arc<dyn FetchBackend>,
        profile: SelectorProfile,
        headers: RequestHeaders,
    ) -> Result<Self> {
        let compiled = profile.compile()?;
        Ok(Self {
            fetcher,
            profile,
            compiled,
            headers,
        })
    }

    pub fn search_url(&self, keyword: &str) -> Result<String> {
        build_search_url(&self.profile.search_base, keyword)
    }

    /// Run one fetch-parse-match cycle.
    ///
    /// `timeout` covers the whole run: each fetch gets whatever budget the
    /// previous steps left over. `found = false` is success, not an error,
    /// and an error never comes with a partial result.
    pub async fn rank(&self, query: &RankQuery, timeout: Duration) -> Result<RankResult> {
        let deadline = Instant::now() + timeout;

        let search_url = self.search_url(&query.keyword)?;
        let outer = self.fetch(&search_url, deadline).await?;

        let iframe_url =
            locate_frame_url(&outer.text_lossy(), &search_url, &self.profile, &self.compiled)?;
        let inner = self.fetch(&iframe_url, deadline).await?;

        let ranked = rank_in_html(
            &inner.text_lossy(),
            &self.compiled,
            &query.shop_name,
            query.strategy,
        )?;

        let mut result = RankResult::not_found(query);
        result.items = ranked.items;
        result.items_scanned = ranked.scanned;
        result.search_url = search_url;
        result.iframe_url = iframe_url;
        if let Some(hit) = ranked.matched {
            result.found = true;
            result.rank = hit.rank as i32;
            result.matched_name = hit.name;
        }
        Ok(result)
    }

    async fn fetch(&self, url: &str, deadline: Instant) -> Result<FetchResponse> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| Error::Timeout(format!("deadline exhausted before GET {url}")))?;

        let req = FetchRequest {
            url: url.to_string(),
            timeout: Some(remaining),
            headers: self.headers.to_map(),
        };
        let resp = self.fetcher.fetch(&req).await?;
        if !(200..300).contains(&resp.status) {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: resp.status,
            });
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naver() -> (SelectorProfile, CompiledProfile) {
        let p = SelectorProfile::naver();
        let c = p.compile().unwrap();
        (p, c)
    }

    const SAMPLE: &str = r#"
<html>
  <body>
    <div class="Ryr1F" id="_pcmap_list_scroll_container">
      <ul>
        <li>
          <span class="OErwL">ad</span>
          <span class="place_bluelink">Ad Place</span>
        </li>
        <li>
          <span class="place_bluelink">First Place</span>
        </li>
        <li>
          <span class="place_bluelink">Second Place</span>
        </li>
      </ul>
    </div>
  </body>
</html>
"#;

    #[test]
    fn search_url_encodes_keyword_segment() {
        let url = build_search_url("https://map.naver.com/p/search/", "서울 맛집").unwrap();
        assert_eq!(
            url,
            "https://map.naver.com/p/search/%EC%84%9C%EC%9A%B8%20%EB%A7%9B%EC%A7%91?searchType=place"
        );
    }

    #[test]
    fn keyword_survives_the_url_round_trip() {
        let url = build_search_url("https://map.naver.com/p/search/", "서울 맛집").unwrap();
        assert_eq!(keyword_from_search_url(&url), "서울 맛집");
        assert_eq!(keyword_from_search_url("::not a url::"), "");
    }

    #[test]
    fn fallback_url_query_encodes_keyword() {
        let url = fallback_frame_url("https://pcmap.place.naver.com/place/list", "cake shop")
            .unwrap();
        assert_eq!(
            url,
            "https://pcmap.place.naver.com/place/list?query=cake+shop"
        );
    }

    #[test]
    fn frame_src_resolves_relative_to_outer_url() {
        let (p, c) = naver();
        let html = r#"<iframe id="searchIframe" src="/place/list?query=cake"></iframe>"#;
        let got =
            locate_frame_url(html, "https://map.naver.com/p/search/cake?searchType=place", &p, &c)
                .unwrap();
        assert_eq!(got, "https://map.naver.com/place/list?query=cake");
    }

    #[test]
    fn absolute_frame_src_is_kept() {
        let (p, c) = naver();
        let html =
            r#"<iframe id="searchIframe" src="https://pcmap.place.naver.com/x?query=1"></iframe>"#;
        let got = locate_frame_url(html, "https://map.naver.com/p/search/cake", &p, &c).unwrap();
        assert_eq!(got, "https://pcmap.place.naver.com/x?query=1");
    }

    #[test]
    fn missing_frame_falls_back_to_constructed_url() {
        let (p, c) = naver();
        let outer = build_search_url(&p.search_base, "서울 맛집").unwrap();
        let got = locate_frame_url("<html><body></body></html>", &outer, &p, &c).unwrap();
        assert_eq!(
            got,
            "https://pcmap.place.naver.com/place/list?query=%EC%84%9C%EC%9A%B8+%EB%A7%9B%EC%A7%91"
        );
    }

    #[test]
    fn frame_with_wrong_id_falls_back() {
        let (p, c) = naver();
        let html = r#"<iframe id="entryIframe" src="/entry"></iframe>"#;
        let got = locate_frame_url(html, "https://map.naver.com/p/search/cake", &p, &c).unwrap();
        assert!(got.starts_with("https://pcmap.place.naver.com/place/list?query="), "{got}");
    }

    #[test]
    fn empty_frame_src_falls_back() {
        let (p, c) = naver();
        let html = r#"<iframe id="searchIframe" src="  "></iframe>"#;
        let got = locate_frame_url(html, "https://map.naver.com/p/search/cake", &p, &c).unwrap();
        assert!(got.contains("query=cake"), "{got}");
    }

    #[test]
    fn partial_match_ranks_second_behind_ad() {
        let (_, c) = naver();
        let got = rank_in_html(SAMPLE, &c, "Second", MatchStrategy::Partial).unwrap();
        assert_eq!(got.scanned, 2);
        assert_eq!(got.items.len(), 2);
        let hit = got.matched.unwrap();
        assert_eq!(hit.rank, 2);
        assert_eq!(hit.name, "Second Place");
    }

    #[test]
    fn exact_match_agrees_with_partial_on_full_name() {
        let (_, c) = naver();
        let got = rank_in_html(SAMPLE, &c, "Second Place", MatchStrategy::Exact).unwrap();
        let hit = got.matched.unwrap();
        assert_eq!((hit.rank, hit.name.as_str()), (2, "Second Place"));
    }

    #[test]
    fn missing_target_is_not_an_error() {
        let (_, c) = naver();
        let got = rank_in_html(SAMPLE, &c, "Missing", MatchStrategy::Partial).unwrap();
        assert!(got.matched.is_none());
        assert_eq!(got.scanned, 2);
        assert_eq!(got.items.len(), 2);
    }

    #[test]
    fn first_match_wins_but_scan_continues() {
        let (_, c) = naver();
        let html = r#"
<ul class="_3l82D">
  <li><span class="place_bluelink">Cake House</span></li>
  <li><span class="place_bluelink">Cake House Annex</span></li>
</ul>
"#;
        let got = rank_in_html(html, &c, "Cake House", MatchStrategy::Partial).unwrap();
        assert_eq!(got.matched.unwrap().rank, 1);
        // The later match is still listed, unflagged.
        assert_eq!(got.items.len(), 2);
        assert_eq!(got.items[1].name, "Cake House Annex");
    }

    #[test]
    fn empty_list_document_is_structural_failure() {
        let (_, c) = naver();
        let err = rank_in_html("<div></div>", &c, "x", MatchStrategy::Partial).unwrap_err();
        assert!(matches!(err, Error::Structure(_)), "{err}");
    }

    #[test]
    fn rank_in_html_is_idempotent_over_fixed_bytes() {
        let (_, c) = naver();
        let a = rank_in_html(SAMPLE, &c, "Second", MatchStrategy::Partial).unwrap();
        let b = rank_in_html(SAMPLE, &c, "Second", MatchStrategy::Partial).unwrap();
        assert_eq!(a.items, b.items);
        assert_eq!(a.scanned, b.scanned);
        assert_eq!(a.matched, b.matched);
    }
}
