use crate::profile::CompiledProfile;
use html_scraper::{ElementRef, Html, Selector};
use placerank_core::{Error, PlaceItem, Result};

/// Try selectors strictly in priority order; the first one with a non-empty
/// match set wins and later selectors are never consulted. An empty result
/// is a valid outcome here, not an error; the caller decides what emptiness
/// means.
pub fn first_non_empty<'a>(doc: &'a Html, selectors: &[Selector]) -> Vec<ElementRef<'a>> {
    for sel in selectors {
        let hits: Vec<ElementRef<'a>> = doc.select(sel).collect();
        if !hits.is_empty() {
            return hits;
        }
    }
    Vec::new()
}

/// True when the element itself matches, or contains a descendant matching,
/// *any* of the selectors.
///
/// Unlike `first_non_empty` this is an OR over the whole list: ad markers
/// are additive signals, not a priority-ordered fallback.
pub fn any_matches(item: ElementRef<'_>, selectors: &[Selector]) -> bool {
    selectors
        .iter()
        .any(|sel| sel.matches(&item) || item.select(sel).next().is_some())
}

pub fn is_ad(item: ElementRef<'_>, profile: &CompiledProfile) -> bool {
    any_matches(item, &profile.ad_markers)
}

/// First selector whose first match carries non-empty (trimmed) text.
///
/// Only the designated field's own text is taken; sibling badge/label
/// fragments outside the matched node never leak in.
pub fn first_text(item: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    for sel in selectors {
        if let Some(el) = item.select(sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Named organic items in document order.
    pub items: Vec<PlaceItem>,
    /// Organic items walked, named or not.
    pub scanned: u32,
}

/// Walk the result list in document order, skipping ads entirely.
///
/// A non-ad item whose name cannot be extracted still consumes a rank and a
/// scan count: an unresolvable listing occupies a position, it just cannot be
/// reported. Failing to locate the list at all is a structural error,
/// distinct from "list found, zero organic items".
pub fn extract_items(doc: &Html, profile: &CompiledProfile) -> Result<Extraction> {
    let list = first_non_empty(doc, &profile.place_list);
    if list.is_empty() {
        return Err(Error::Structure(
            "no place items matched any list selector".to_string(),
        ));
    }

    let mut out = Extraction::default();
    let mut rank = 0u32;
    for item in list {
        if is_ad(item, profile) {
            continue;
        }
        rank += 1;
        out.scanned += 1;
        let Some(name) = first_text(item, &profile.shop_name) else {
            continue;
        };
        out.items.push(PlaceItem { rank, name });
    }
    Ok(out)
}
