use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Detail pages look like `/uk/auto_<make>_<model>_<id>.html`
static DETAIL_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/auto_[^/]+\.html$").expect("valid detail path regex"));

static AD_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"auto_[^/]*?_(\d+)\.html").expect("valid ad id regex"));

/// Path fragments that identify listing and search result pages
const LISTING_SEGMENTS: &[&str] = &["/car/", "/search", "/legkovie/", "/newauto/"];

/// Returns true if the URL points at a single advertisement
pub fn is_detail_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => DETAIL_PATH.is_match(parsed.path()),
        Err(_) => false,
    }
}

/// Returns true if the URL points at a listing or search results page
pub fn is_listing_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            !DETAIL_PATH.is_match(path)
                && (path == "/"
                    || LISTING_SEGMENTS.iter().any(|segment| path.contains(segment)))
        }
        Err(_) => false,
    }
}

/// Extracts the numeric advertisement id from a detail URL
///
/// ```
/// use ria_harvest::url::extract_ad_id;
///
/// assert_eq!(
///     extract_ad_id("https://auto.ria.com/uk/auto_bmw_x5_35012345.html").as_deref(),
///     Some("35012345")
/// );
/// assert_eq!(extract_ad_id("https://auto.ria.com/uk/car/used/"), None);
/// ```
pub fn extract_ad_id(url: &str) -> Option<String> {
    AD_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_urls() {
        assert!(is_detail_url("https://auto.ria.com/uk/auto_bmw_x5_35012345.html"));
        assert!(is_detail_url("https://auto.ria.com/auto_skoda_octavia_a7_35000001.html"));
        assert!(is_detail_url("http://127.0.0.1:9000/auto_test_car_1.html"));
        assert!(!is_detail_url("https://auto.ria.com/uk/car/used/"));
        assert!(!is_detail_url("https://auto.ria.com/uk/auto_bmw/photos/"));
        assert!(!is_detail_url("garbage"));
    }

    #[test]
    fn test_listing_urls() {
        assert!(is_listing_url("https://auto.ria.com/uk/car/used/"));
        assert!(is_listing_url("https://auto.ria.com/uk/car/used/?page=4"));
        assert!(is_listing_url("https://auto.ria.com/uk/search/?category_id=1"));
        assert!(is_listing_url("https://auto.ria.com/"));
        assert!(!is_listing_url("https://auto.ria.com/uk/auto_bmw_x5_35012345.html"));
        assert!(!is_listing_url("https://auto.ria.com/captcha/"));
    }

    #[test]
    fn test_ad_id_with_multi_part_model() {
        assert_eq!(
            extract_ad_id("https://auto.ria.com/uk/auto_land_rover_range_rover_sport_34998877.html")
                .as_deref(),
            Some("34998877")
        );
    }

    #[test]
    fn test_ad_id_missing() {
        assert_eq!(extract_ad_id("https://auto.ria.com/uk/auto_bmw.html"), None);
    }
}
