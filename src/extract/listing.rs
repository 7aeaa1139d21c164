//! Listing page extraction
//!
//! Finds the advertisement links on a search results page and the link to
//! the following results page.

use crate::extract::detail::extract_from_scope;
use crate::extract::{select_first, selector};
use crate::storage::CarRecord;
use crate::url::{is_detail_url, resolve};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::HashSet;

/// Item container patterns, most specific first
///
/// The first pattern that matches anything wins; later entries are looser
/// container-level fallbacks for older or redesigned markup.
const ITEM_SELECTORS: &[&str] = &[
    "section.ticket-item",
    "div.ticket-item",
    "div.content-ticket",
    "div.content-bar",
    ".search-result .ticket-item",
    "div.app-catalog .app-catalog-item",
    ".content-bar",
    ".app-catalog a[href*='auto_']",
    "a.address[href*='auto_']",
    "a[href*='auto_'][href$='.html']",
];

const NEXT_PAGE_SELECTORS: &[&str] = &[
    ".pagination .next a[href]",
    ".pager a.next[href]",
    ".pagination a.arrow-right[href]",
    ".search-result-pager a.page-link[rel='next'][href]",
    ".pager a.js-next[href]",
    "a[rel='next'][href]",
];

const ACTIVE_PAGE_SELECTORS: &str = ".pagination .active, .pager .active, .page-item.active";

static RAW_DETAIL_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:href|link|url)=["']?([^"'\s>]+auto_[^"']+\.html)"#)
        .expect("valid raw detail link regex")
});

/// How one listing item points at its advertisement
#[derive(Debug, Clone, Copy)]
enum ItemUrlRule {
    /// The item element is itself an `auto_` link
    SelfLink,
    /// `href` of the first descendant matching the selector
    NestedHref(&'static str),
    /// Named attribute of the first descendant matching the selector
    NestedAttr(&'static str, &'static str),
}

const ITEM_URL_RULES: &[ItemUrlRule] = &[
    ItemUrlRule::SelfLink,
    ItemUrlRule::NestedHref("a[href*='auto_']"),
    ItemUrlRule::NestedAttr("[data-link-to-view]", "data-link-to-view"),
    ItemUrlRule::NestedHref("a.address"),
    ItemUrlRule::NestedHref(".ticket-photo a"),
];

impl ItemUrlRule {
    fn apply(self, item: ElementRef<'_>) -> Option<String> {
        let raw = match self {
            ItemUrlRule::SelfLink => {
                let element = item.value();
                if element.name() != "a" {
                    return None;
                }
                element.attr("href").filter(|href| href.contains("auto_"))
            }
            ItemUrlRule::NestedHref(css) => {
                select_first(item, css).and_then(|el| el.value().attr("href"))
            }
            ItemUrlRule::NestedAttr(css, attr) => {
                select_first(item, css).and_then(|el| el.value().attr(attr))
            }
        };
        raw.map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
    }
}

/// Everything the crawler needs from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Canonical advertisement URLs, de-duplicated; order carries no meaning
    pub item_urls: Vec<String>,
    /// Absolute URL of the next results page, if one is linked
    pub next_page: Option<String>,
}

/// Extracts advertisement links and the next-page link from listing content
///
/// Item links resolve against `base_origin`; the next-page link resolves
/// against `page_url`, the page it was found on.
pub fn extract_listing(html: &str, page_url: &str, base_origin: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut item_urls = item_urls_from_selectors(root, base_origin);
    if item_urls.is_empty() {
        tracing::debug!("No items matched any selector on {}, scanning raw content", page_url);
        item_urls = item_urls_from_raw_scan(html, base_origin);
    }

    let next_page = next_page_in(root, page_url);

    tracing::debug!(
        "Listing {}: {} items, next page {:?}",
        page_url,
        item_urls.len(),
        next_page
    );

    ListingPage {
        item_urls,
        next_page,
    }
}

/// Extracts only the advertisement links from listing content
pub fn extract_item_urls(html: &str, base_origin: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let urls = item_urls_from_selectors(document.root_element(), base_origin);
    if urls.is_empty() {
        item_urls_from_raw_scan(html, base_origin)
    } else {
        urls
    }
}

/// Extracts only the next-page link from listing content
pub fn extract_next_page(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    next_page_in(document.root_element(), page_url)
}

/// Builds one listing-style record per item container
///
/// This is what a saved listing page yields without visiting any detail
/// page: title, price, mileage, seller and photo, but no phone or VIN.
pub fn extract_listing_items(html: &str, base_origin: &str) -> Vec<CarRecord> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    let Some(items) = matched_items(root) else {
        return records;
    };

    for item in items {
        let Some(url) = item_url(item, base_origin) else {
            continue;
        };
        if seen.insert(url.clone()) {
            records.push(extract_from_scope(item, &url, base_origin, true));
        }
    }

    records
}

/// Item elements of the first selector in the chain that matches anything
fn matched_items(root: ElementRef<'_>) -> Option<Vec<ElementRef<'_>>> {
    ITEM_SELECTORS.iter().find_map(|css| {
        let sel = selector(css)?;
        let items: Vec<_> = root.select(&sel).collect();
        if items.is_empty() {
            None
        } else {
            tracing::trace!("Item selector '{}' matched {} elements", css, items.len());
            Some(items)
        }
    })
}

fn item_url(item: ElementRef<'_>, base_origin: &str) -> Option<String> {
    let href = ITEM_URL_RULES.iter().find_map(|rule| rule.apply(item))?;
    resolve(base_origin, &href)
        .ok()
        .filter(|url| is_detail_url(url))
}

fn item_urls_from_selectors(root: ElementRef<'_>, base_origin: &str) -> Vec<String> {
    let Some(items) = matched_items(root) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| item_url(item, base_origin))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn item_urls_from_raw_scan(html: &str, base_origin: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    RAW_DETAIL_LINK
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| resolve(base_origin, m.as_str()).ok())
        .filter(|url| is_detail_url(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn next_page_in(root: ElementRef<'_>, page_url: &str) -> Option<String> {
    let href = NEXT_PAGE_SELECTORS
        .iter()
        .find_map(|css| {
            select_first(root, css)
                .and_then(|el| el.value().attr("href"))
                .map(str::trim)
                .filter(|href| !href.is_empty() && !href.starts_with('#'))
                .map(str::to_string)
        })
        .or_else(|| link_after_active_page(root))?;

    resolve(page_url, &href).ok()
}

/// Link in the sibling element that follows the highlighted page number
fn link_after_active_page(root: ElementRef<'_>) -> Option<String> {
    let sel = selector(ACTIVE_PAGE_SELECTORS)?;
    root.select(&sel).find_map(|active| {
        let sibling = active.next_siblings().find_map(ElementRef::wrap)?;
        let link = if sibling.value().name() == "a" {
            Some(sibling)
        } else {
            select_first(sibling, "a[href]")
        }?;
        link.value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty() && !href.starts_with('#'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://auto.ria.com";
    const PAGE: &str = "https://auto.ria.com/uk/car/used/?page=1";

    fn ticket(id: u32) -> String {
        format!(
            r#"<section class="ticket-item">
                <div class="ticket-title"><a class="address" href="/uk/auto_volkswagen_passat_{id}.html">
                    <span class="blue bold">Volkswagen Passat</span> 2015</a></div>
                <div class="price-ticket"><span class="bold" data-currency="USD">1{id}</span></div>
                <li class="item-char js-race">2{id} тис. км</li>
            </section>"#
        )
    }

    fn listing(ids: &[u32], pager: &str) -> String {
        let items: String = ids.iter().map(|id| ticket(*id)).collect();
        format!(
            "<html><body><div class=\"search-result\">{}</div>{}</body></html>",
            items, pager
        )
    }

    #[test]
    fn test_n_items_give_n_unique_urls() {
        let html = listing(&[101, 102, 103, 104, 105], "");
        let page = extract_listing(&html, PAGE, ORIGIN);

        assert_eq!(page.item_urls.len(), 5);
        let unique: HashSet<_> = page.item_urls.iter().collect();
        assert_eq!(unique.len(), 5);
        assert!(page
            .item_urls
            .contains(&"https://auto.ria.com/uk/auto_volkswagen_passat_103.html".to_string()));
    }

    #[test]
    fn test_duplicate_items_collapse() {
        let html = listing(&[7, 7, 8], "");
        assert_eq!(extract_item_urls(&html, ORIGIN).len(), 2);
    }

    #[test]
    fn test_first_matching_selector_wins() {
        // The loose fallback link must not be added once section.ticket-item matched
        let html = format!(
            "{}<a href=\"/uk/auto_stray_link_999.html\">x</a>",
            listing(&[1, 2], "")
        );
        let urls = extract_item_urls(&html, ORIGIN);
        assert_eq!(urls.len(), 2);
        assert!(!urls.iter().any(|u| u.contains("999")));
    }

    #[test]
    fn test_item_url_rules_in_order() {
        let html = r#"
            <div class="ticket-item"><div data-link-to-view="/uk/auto_ford_focus_11.html"></div></div>
            <div class="ticket-item"><div class="ticket-photo"><a href="https://auto.ria.com/uk/auto_kia_rio_12.html"><img></a></div></div>
            <div class="ticket-item"><span>no link here</span></div>
        "#;
        let urls = extract_item_urls(html, ORIGIN);
        assert_eq!(
            urls,
            vec![
                "https://auto.ria.com/uk/auto_ford_focus_11.html".to_string(),
                "https://auto.ria.com/uk/auto_kia_rio_12.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_self_link_items() {
        let html = r#"<div class="app-catalog">
            <a href="/uk/auto_tesla_model_3_21.html">Tesla</a>
            <a href="/uk/auto_tesla_model_y_22.html">Tesla</a>
        </div>"#;
        assert_eq!(extract_item_urls(html, ORIGIN).len(), 2);
    }

    #[test]
    fn test_raw_scan_fallback() {
        let html = r#"<script>var ads = [{url="/uk/auto_mazda_6_31.html"}];</script>
            <div data-x="1" link='/uk/auto_mazda_cx5_32.html'></div>"#;
        let urls = extract_item_urls(html, ORIGIN);
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://auto.ria.com/uk/auto_mazda_6_31.html".to_string()));
    }

    #[test]
    fn test_empty_listing_is_valid() {
        let page = extract_listing("<html><body><p>Нічого не знайдено</p></body></html>", PAGE, ORIGIN);
        assert!(page.item_urls.is_empty());
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_next_page_resolves_against_current_page() {
        let pager = r#"<nav class="pagination"><span class="next"><a href="?page=2">Далі</a></span></nav>"#;
        let html = listing(&[1], pager);
        let page = extract_listing(&html, PAGE, ORIGIN);
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://auto.ria.com/uk/car/used/?page=2")
        );
    }

    #[test]
    fn test_next_page_rel_next() {
        let html = r#"<link rel="next" href="/x"><a rel="next" href="/uk/car/used/?page=5">next</a>"#;
        assert_eq!(
            extract_next_page(html, PAGE).as_deref(),
            Some("https://auto.ria.com/uk/car/used/?page=5")
        );
    }

    #[test]
    fn test_next_page_after_active_marker() {
        let html = r#"<ul class="pagination">
            <li><a href="?page=1">1</a></li>
            <li class="active"><span>2</span></li>
            <li><a href="?page=3">3</a></li>
        </ul>"#;
        assert_eq!(
            extract_next_page(html, "https://auto.ria.com/uk/car/used/?page=2").as_deref(),
            Some("https://auto.ria.com/uk/car/used/?page=3")
        );
    }

    #[test]
    fn test_no_next_page_on_last_page() {
        let html = r#"<ul class="pagination"><li><a href="?page=1">1</a></li><li class="active"><span>2</span></li></ul>"#;
        assert_eq!(extract_next_page(html, PAGE), None);
    }

    #[test]
    fn test_listing_items_records() {
        let html = listing(&[41, 42], "");
        let records = extract_listing_items(&html, ORIGIN);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.url, "https://auto.ria.com/uk/auto_volkswagen_passat_41.html");
        assert_eq!(first.title, "Volkswagen Passat 2015");
        assert_eq!(first.price_usd, Some(141.0));
        assert_eq!(first.odometer, Some(241_000));
        assert!(first.phone_number.is_none());
    }
}
