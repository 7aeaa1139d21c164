//! Field extraction for advertisement pages
//!
//! The same extractor runs on full detail pages and on single listing items.
//! Listing-style markup never carries phone, plate or VIN, so those fields are
//! left empty for it instead of being guessed from unrelated elements.

use crate::crawler::normalize_phone;
use crate::extract::{
    collapse_whitespace, first_attr, first_in_chain, first_srcset_url, first_text, select_first,
    selector, text_excluding, text_of,
};
use crate::storage::CarRecord;
use crate::url::{extract_ad_id, resolve};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

/// Containers that only appear on listing pages
const LISTING_MARKERS: &str = ".ticket-item, .content-bar, .content-ticket";

const PRICE_SELECTORS: &[&str] = &[
    r#".price-ticket .bold[data-currency="USD"]"#,
    ".price_value strong",
    r#"[data-currency="USD"]"#,
];

const HEADING_SELECTORS: &[&str] = &["h1.head", "h1.auto-head"];

const LISTING_ODOMETER_SELECTORS: &[&str] = &["li.item-char.js-race", ".characteristic-oil"];

const DETAIL_ODOMETER_SELECTOR: &str = ".base-information .size18";

const SELLER_SELECTORS: &[&str] = &[".seller_info_name", ".seller-info .name"];

const LISTING_SELLER_SELECTORS: &[&str] = &[".seller_info_name", ".user-name", ".seller-info .name"];

const STATIC_PHONE_ATTRS: &[(&str, &str)] = &[
    (".phone[data-phone-number]", "data-phone-number"),
    ("[data-value]", "data-value"),
    ("span.phone[data-phone-unmask]", "data-phone-number"),
];

const GENERIC_IMAGE_SELECTORS: &[&str] = &[
    ".photo-620x465 img[src]",
    ".carousel img[src]",
    ".gallery-order img[src]",
    ".ticket-photo img[src]",
];

const THUMBNAIL_SELECTORS: &str = ".carousel-photo, .photo-620x465, .thumbnail";

const PHOTO_CAPTION_SELECTORS: &[&str] = &[".count-photo .count .mhide", ".count-photo .count .dhide"];

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("valid year regex"));

static LEADING_INT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d(?:[\d\s\u{a0}]*\d)?").expect("valid integer regex"));

static THOUSANDS_KM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:тис|тыс|thousand)\.?\s*(?:км|km)").expect("valid thousands km regex")
});

static VIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-HJ-NPR-Z0-9]{17}\b").expect("valid VIN regex"));

static SHOW_ALL_PHOTOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)всі\s+(\d+)\s+фотограф").expect("valid photo count regex"));

static PHOTO_OF_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"з\s+(\d+)").expect("valid photo caption regex"));

/// Extracts a [`CarRecord`] for `url` from page content
///
/// `base_origin` is used to absolutize image URLs. Fields that cannot be
/// found stay empty; this function never fails.
pub fn extract_record(html: &str, url: &str, base_origin: &str) -> CarRecord {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let listing_style = select_first(root, LISTING_MARKERS).is_some();

    let mut record = extract_from_scope(root, url, base_origin, listing_style);

    if !listing_style {
        record.odometer = record.odometer.or_else(|| thousands_km_in_text(&text_of(root)));
    }

    tracing::debug!(
        "Extracted {} ({}): price={:?} odometer={:?} vin={:?}",
        url,
        if listing_style { "listing" } else { "detail" },
        record.price_usd,
        record.odometer,
        record.car_vin
    );

    record
}

/// Builds a record from one scope, either a whole page or one listing item
pub(crate) fn extract_from_scope(
    scope: ElementRef<'_>,
    url: &str,
    base_origin: &str,
    listing_style: bool,
) -> CarRecord {
    let mut record = CarRecord::new(url);

    record.title = extract_title(scope).unwrap_or_else(|| CarRecord::UNKNOWN_TITLE.to_string());
    record.price_usd = first_in_chain(scope, PRICE_SELECTORS).and_then(|el| parse_price(&text_of(el)));

    let (image_url, images_count) = extract_images(scope, base_origin);
    record.image_url = image_url;
    record.images_count = images_count;

    if listing_style {
        record.odometer = first_in_chain(scope, LISTING_ODOMETER_SELECTORS)
            .and_then(|el| parse_odometer(&text_of(el)));
        record.username = first_text(scope, LISTING_SELLER_SELECTORS);
    } else {
        record.odometer = extract_detail_odometer(scope);
        record.username = extract_seller(scope);
        record.phone_number = static_phone_in(scope);
        record.car_number = select_first(scope, ".state-num")
            .map(|el| text_excluding(el, &[".popup"]))
            .filter(|plate| !plate.is_empty());
        record.car_vin = select_first(scope, ".label-vin")
            .map(|el| text_excluding(el, &["svg", ".popup"]))
            .and_then(|text| parse_vin(&text));
    }

    record
}

/// Returns true if the content is a listing page rather than an advertisement
pub fn is_listing_style(html: &str) -> bool {
    let document = Html::parse_document(html);
    select_first(document.root_element(), LISTING_MARKERS).is_some()
}

/// Phone number present in static markup, normalized
pub fn extract_static_phone(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    static_phone_in(document.root_element())
}

/// Advertisement id from the URL, else from a `data-advertisement-id` attribute
pub fn find_ad_id(html: &str, url: &str) -> Option<String> {
    extract_ad_id(url).or_else(|| {
        let document = Html::parse_document(html);
        first_attr(
            document.root_element(),
            &[("[data-advertisement-id]", "data-advertisement-id")],
        )
    })
}

/// Parses a price string, keeping digits only
///
/// Returns None when there are no digits; a missing price is never zero.
pub fn parse_price(text: &str) -> Option<f64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Parses an odometer string into kilometres
///
/// Takes the leading integer and multiplies it by 1000 only when the text
/// carries a thousands marker (`тис`, `тыс`, `thousand`).
///
/// ```
/// use ria_harvest::extract::parse_odometer;
///
/// assert_eq!(parse_odometer("120 тис. км"), Some(120_000));
/// assert_eq!(parse_odometer("120 км"), Some(120));
/// ```
pub fn parse_odometer(text: &str) -> Option<u32> {
    let number = LEADING_INT.find(text)?;
    let value: u32 = number
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;

    if has_thousands_marker(text) {
        value.checked_mul(1000)
    } else {
        Some(value)
    }
}

/// Extracts a VIN from badge text
///
/// Returns the 17-character VIN when one is present, else the trimmed raw
/// text, else None for empty text.
pub fn parse_vin(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    VIN.find(text)
        .or_else(|| VIN.find(&compact))
        .map(|m| m.as_str().to_uppercase())
        .or_else(|| Some(text.to_string()))
}

fn has_thousands_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("тис") || lower.contains("тыс") || lower.contains("thousand")
}

fn thousands_km_in_text(text: &str) -> Option<u32> {
    THOUSANDS_KM
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .and_then(|value| value.checked_mul(1000))
}

fn extract_title(scope: ElementRef<'_>) -> Option<String> {
    if let Some(ticket_title) = select_first(scope, ".ticket-title") {
        if let Some(brand) = select_first(ticket_title, ".blue.bold") {
            let brand = text_of(brand);
            let year = YEAR
                .captures(&text_of(ticket_title))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let title = format!("{} {}", brand, year).trim().to_string();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }

    first_text(scope, HEADING_SELECTORS)
        .or_else(|| first_attr(scope, &[(r#"meta[property="og:title"]"#, "content")]))
}

fn extract_detail_odometer(scope: ElementRef<'_>) -> Option<u32> {
    if let Some(value) = first_in_chain(scope, LISTING_ODOMETER_SELECTORS)
        .and_then(|el| thousands_km_in_text(&text_of(el)))
    {
        return Some(value);
    }

    let element = select_first(scope, DETAIL_ODOMETER_SELECTOR)?;
    let digits: String = text_of(element).chars().filter(char::is_ascii_digit).collect();
    let value: u32 = digits.parse().ok()?;

    // The unit lives in the parent, next to the number
    let container = element
        .parent()
        .and_then(ElementRef::wrap)
        .map(text_of)
        .unwrap_or_default();

    if has_thousands_marker(&container) {
        value.checked_mul(1000)
    } else {
        Some(value)
    }
}

fn extract_seller(scope: ElementRef<'_>) -> Option<String> {
    first_text(scope, SELLER_SELECTORS).or_else(|| {
        let raw = first_attr(scope, &[("[data-phone-unmask]", "data-phone-unmask")])?;
        let data: serde_json::Value = serde_json::from_str(&raw).ok()?;
        data.get("name")
            .and_then(|name| name.as_str())
            .map(collapse_whitespace)
            .filter(|name| !name.is_empty())
    })
}

fn static_phone_in(scope: ElementRef<'_>) -> Option<String> {
    first_attr(scope, STATIC_PHONE_ATTRS)
        .or_else(|| first_text(scope, &["span.phone[data-phone-unmask]"]))
        .and_then(|raw| normalize_phone(&raw))
}

fn extract_images(scope: ElementRef<'_>, base_origin: &str) -> (Option<String>, u32) {
    let image = find_image_url(scope)
        .and_then(|src| resolve(base_origin, &src).ok().or(Some(src)));
    (image, count_images(scope))
}

fn find_image_url(scope: ElementRef<'_>) -> Option<String> {
    if let Some(photo) = select_first(scope, ".ticket-photo") {
        let from_photo = select_first(photo, "source[srcset]")
            .and_then(|el| el.value().attr("srcset"))
            .and_then(first_srcset_url)
            .map(str::to_string)
            .or_else(|| first_attr(photo, &[("img[src]", "src")]));
        if from_photo.is_some() {
            return from_photo;
        }
    }

    if let Some(carousel) = select_first(scope, ".gallery-order.carousel") {
        let from_carousel = first_attr(carousel, &[(".photo-620x465 img", "src")])
            .or_else(|| json_ld_image(carousel));
        if from_carousel.is_some() {
            return from_carousel;
        }
    }

    select_first(scope, "picture source[srcset]")
        .and_then(|el| el.value().attr("srcset"))
        .and_then(first_srcset_url)
        .map(str::to_string)
        .or_else(|| {
            let chain: Vec<(&str, &str)> =
                GENERIC_IMAGE_SELECTORS.iter().map(|css| (*css, "src")).collect();
            first_attr(scope, &chain)
        })
        .or_else(|| json_ld_image(scope))
}

/// First image `contentUrl` (or plain string) from an embedded JSON-LD block
fn json_ld_image(scope: ElementRef<'_>) -> Option<String> {
    let sel = selector(r#"script[type="application/ld+json"]"#)?;
    scope.select(&sel).find_map(|script| {
        let raw: String = script.text().collect();
        let data: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
        let first = match data.get("image")? {
            serde_json::Value::Array(images) => images.first()?.clone(),
            other => other.clone(),
        };
        match first {
            serde_json::Value::String(url) => Some(url),
            serde_json::Value::Object(map) => map
                .get("contentUrl")
                .and_then(|url| url.as_str())
                .map(str::to_string),
            _ => None,
        }
    })
}

fn count_images(scope: ElementRef<'_>) -> u32 {
    if let Some(count) = select_first(scope, ".show-all")
        .and_then(|el| capture_u32(&SHOW_ALL_PHOTOS, &text_of(el)))
    {
        return count;
    }

    let thumbnails = selector(THUMBNAIL_SELECTORS)
        .map(|sel| scope.select(&sel).count())
        .unwrap_or(0);
    if thumbnails > 0 {
        return thumbnails as u32;
    }

    if let Some(count) = first_attr(scope, &[("[data-photo-count]", "data-photo-count")])
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|count| *count > 0)
    {
        return count;
    }

    first_in_chain(scope, PHOTO_CAPTION_SELECTORS)
        .and_then(|el| capture_u32(&PHOTO_OF_TOTAL, &text_of(el)))
        .unwrap_or(0)
}

fn capture_u32(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
