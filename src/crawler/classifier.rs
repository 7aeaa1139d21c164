//! Page classification
//!
//! Decides whether fetched content is a usable page, a block page, an
//! anti-bot challenge or a truncated response. Classification only looks at
//! the content and the final URL, so both fetch strategies share it.

use std::fmt;
use url::Url;

/// Outcome of a single fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageClass {
    /// Content is usable
    Valid,
    /// Content is shorter than the configured minimum
    TooShort,
    /// The site refused the request
    Blocked,
    /// The site served an anti-bot challenge instead of the page
    Challenge,
    /// Transport error, timeout or an unexpected status
    Failed,
}

impl PageClass {
    pub fn is_valid(&self) -> bool {
        matches!(self, PageClass::Valid)
    }

    /// True for classes that call for the longer blocked backoff
    pub fn is_hostile(&self) -> bool {
        matches!(self, PageClass::Blocked | PageClass::Challenge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageClass::Valid => "valid",
            PageClass::TooShort => "too-short",
            PageClass::Blocked => "blocked",
            PageClass::Challenge => "challenge",
            PageClass::Failed => "failed",
        }
    }
}

impl fmt::Display for PageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const BLOCK_MARKERS: &[&str] = &[
    "access denied",
    "you have been blocked",
    "request blocked",
    "доступ заборонено",
    "доступ запрещен",
    "error 1020",
];

/// Signatures of a full-page interstitial
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-challenge",
    "cf_chl_opt",
    "verify you are human",
    "checking your browser",
];

/// Scripts and widgets that ordinary pages embed too; they only mark a
/// challenge when the page around them is too short to be real content
const CHALLENGE_WIDGET_MARKERS: &[&str] = &["challenge-platform", "g-recaptcha", "h-captcha"];

const BLOCK_PATH_SEGMENTS: &[&str] = &["blocked", "denied", "forbidden"];

const CHALLENGE_PATH_SEGMENTS: &[&str] = &["captcha", "security", "check"];

/// Classifies page content fetched from `final_url`
///
/// Absence of any signal means `Valid`. Empty content with no other signal is
/// `TooShort` unless `min_length` is zero.
pub fn classify(content: &str, final_url: &str, min_length: usize) -> PageClass {
    let segments = path_segments(final_url);
    if segments.iter().any(|s| BLOCK_PATH_SEGMENTS.contains(&s.as_str())) {
        return PageClass::Blocked;
    }
    if segments.iter().any(|s| CHALLENGE_PATH_SEGMENTS.contains(&s.as_str())) {
        return PageClass::Challenge;
    }

    let lowered = content.to_lowercase();
    if BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return PageClass::Blocked;
    }
    if CHALLENGE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return PageClass::Challenge;
    }

    if content.trim().chars().count() < min_length {
        if CHALLENGE_WIDGET_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return PageClass::Challenge;
        }
        return PageClass::TooShort;
    }

    PageClass::Valid
}

/// Lowercased path segments of a URL, empty when it does not parse
fn path_segments(url: &str) -> Vec<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .map(|segments| segments.map(|s| s.to_lowercase()).collect())
        })
        .unwrap_or_default()
}
