//! Seller phone lookup
//!
//! Phones are hidden behind a reveal control on detail pages. The browser
//! fetcher clicks through the reveal; both fetchers can fall back to the
//! site's phone endpoint, whose JSON response is parsed here.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::Client;
use serde_json::Value;

/// Controls that reveal the phone when clicked, in priority order
pub const REVEAL_TRIGGERS: &[&str] = &[
    "span.showCenterNumber.bold",
    "a.phone_show_link",
    "a[data-click-call-now]",
];

/// Elements holding the phone text once revealed
pub const REVEALED_PHONE_SELECTORS: &[&str] = &[
    ".show-phone-data",
    ".phone_show_link span",
    ".phone",
    "[data-call-phone]",
];

/// Elements that may show a phone without any click
pub const VISIBLE_PHONE_SELECTORS: &[&str] = &[
    ".phone",
    ".phone-block .phones .item span",
    ".phone-list span",
];

static PHONE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d{7,15}$").expect("valid phone shape regex"));

/// Normalizes a phone to `+38…` form
///
/// Keeps digits and `+`, then makes sure the number carries the `+38`
/// country prefix. Returns None when no digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let digits = kept.trim_start_matches('+');
    if digits.starts_with("38") {
        Some(format!("+{}", digits))
    } else {
        Some(format!("+38{}", digits))
    }
}

/// True when `text`, with separators removed, looks like a bare phone number
pub fn looks_like_phone(text: &str) -> bool {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();
    PHONE_SHAPE.is_match(&compact)
}

/// Reads a phone out of the phone endpoint's JSON body
///
/// Accepts `formattedPhoneNumber`, the first entry of `phones` (either a
/// string or an object with `phoneFormatted`) or a plain `phone` field.
pub fn parse_phone_response(body: &Value) -> Option<String> {
    let non_empty = |value: &Value| {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(phone) = body.get("formattedPhoneNumber").and_then(non_empty) {
        return Some(phone);
    }

    if let Some(first) = body.get("phones").and_then(|p| p.get(0)) {
        let phone = non_empty(first).or_else(|| first.get("phoneFormatted").and_then(non_empty));
        if phone.is_some() {
            return phone;
        }
    }

    body.get("phone").and_then(non_empty)
}

/// URL of the phone endpoint for an advertisement
pub fn phone_endpoint(origin: &str, ad_id: &str) -> String {
    format!("{}/users/phones/{}", origin.trim_end_matches('/'), ad_id)
}

/// Asks the phone endpoint for the seller's number
///
/// Any failure (transport, status or body) yields None; the reveal is
/// best-effort and never fails an item.
pub async fn lookup_phone(client: &Client, origin: &str, ad_id: &str, referer: &str) -> Option<String> {
    let endpoint = phone_endpoint(origin, ad_id);

    let response = match client
        .get(&endpoint)
        .header(REFERER, referer)
        .header("X-Requested-With", "XMLHttpRequest")
        .header(ACCEPT, "application/json")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Phone endpoint {} unreachable: {}", endpoint, e);
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::debug!("Phone endpoint {} returned {}", endpoint, response.status());
        return None;
    }

    match response.json::<Value>().await {
        Ok(body) => parse_phone_response(&body).and_then(|raw| normalize_phone(&raw)),
        Err(e) => {
            tracing::warn!("Phone endpoint {} returned an unreadable body: {}", endpoint, e);
            None
        }
    }
}
