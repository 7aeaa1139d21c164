//! HTML extraction for listing and advertisement pages
//!
//! Everything in this module is a pure function of page content. Each field
//! is looked up through its own ordered list of selectors so that markup drift
//! in one place only costs that one field.
//!
//! `scraper::Html` is not `Send`, so documents are parsed and dropped inside
//! these synchronous functions and never held across an await point.

mod detail;
mod listing;

pub use detail::{
    extract_record, extract_static_phone, find_ad_id, is_listing_style, parse_odometer,
    parse_price, parse_vin,
};
pub use listing::{extract_item_urls, extract_listing, extract_listing_items, extract_next_page, ListingPage};

use scraper::{ElementRef, Selector};

/// Parses a CSS selector, returning None for selectors scraper cannot handle
pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Returns the first element matching `css` inside `scope`
pub(crate) fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

/// Returns the first element matched by the earliest selector in `chain` that matches anything
pub(crate) fn first_in_chain<'a>(scope: ElementRef<'a>, chain: &[&str]) -> Option<ElementRef<'a>> {
    chain.iter().find_map(|css| select_first(scope, css))
}

/// Element text with whitespace runs collapsed to single spaces
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Element text, skipping any text that sits inside a descendant matching one of `exclude`
///
/// Used for values decorated with icons and tooltips, such as the VIN badge.
pub(crate) fn text_excluding(element: ElementRef<'_>, exclude: &[&str]) -> String {
    let excluded: Vec<Selector> = exclude.iter().filter_map(|css| selector(css)).collect();
    let mut text = String::new();

    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .filter_map(ElementRef::wrap)
            .any(|ancestor| excluded.iter().any(|sel| sel.matches(&ancestor)));

        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    collapse_whitespace(&text)
}

/// Returns the first non-empty text among the elements matched by `chain`
pub(crate) fn first_text(scope: ElementRef<'_>, chain: &[&str]) -> Option<String> {
    chain.iter().find_map(|css| {
        select_first(scope, css)
            .map(text_of)
            .filter(|text| !text.is_empty())
    })
}

/// Returns the first non-empty attribute value among `(selector, attribute)` pairs
pub(crate) fn first_attr(scope: ElementRef<'_>, chain: &[(&str, &str)]) -> Option<String> {
    chain.iter().find_map(|(css, attr)| {
        select_first(scope, css)
            .and_then(|el| el.value().attr(attr))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First URL of a `srcset` value (`"a.webp 1x, b.webp 2x"` gives `"a.webp"`)
pub(crate) fn first_srcset_url(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_text_excluding_skips_decorations() {
        let html = Html::parse_fragment(
            r#"<span class="label-vin"><svg><title>icon</title></svg> WBA 123
               <span class="popup">Перевірений VIN</span></span>"#,
        );
        let vin = select_first(html.root_element(), ".label-vin").unwrap();
        assert_eq!(text_excluding(vin, &["svg", ".popup"]), "WBA 123");
    }

    #[test]
    fn test_first_in_chain_prefers_earlier_selector() {
        let html = Html::parse_fragment(r#"<p class="b">second</p><p class="a">first</p>"#);
        let found = first_in_chain(html.root_element(), &[".missing", ".a", ".b"]).unwrap();
        assert_eq!(text_of(found), "first");
    }

    #[test]
    fn test_first_attr_skips_empty_values() {
        let html = Html::parse_fragment(
            r#"<span class="phone" data-phone-number=""></span><b data-value="067 111 22 33"></b>"#,
        );
        let value = first_attr(
            html.root_element(),
            &[(".phone", "data-phone-number"), ("[data-value]", "data-value")],
        );
        assert_eq!(value.as_deref(), Some("067 111 22 33"));
    }

    #[test]
    fn test_first_srcset_url() {
        assert_eq!(
            first_srcset_url("https://cdn/a.webp 1x, https://cdn/b.webp 2x"),
            Some("https://cdn/a.webp")
        );
        assert_eq!(first_srcset_url("  "), None);
    }

    #[test]
    fn test_invalid_selector_is_ignored() {
        let html = Html::parse_fragment("<p>x</p>");
        assert!(select_first(html.root_element(), "p[").is_none());
    }
}
