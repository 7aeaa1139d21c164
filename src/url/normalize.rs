use crate::UrlError;
use url::Url;

/// Query parameters that never change the page a URL points to
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "_ga"];

/// Produces the canonical form of an absolute URL
///
/// The canonical form is the uniqueness key for stored records and the key of
/// the per-run seen set, so two links to the same advertisement must map to
/// the same string.
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject schemes other than http and https
/// 3. Lowercase the host (done by the parser) and drop a trailing dot
/// 4. Remove the fragment
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters by key
/// 7. Remove an empty query string
///
/// # Examples
///
/// ```
/// use ria_harvest::url::canonicalize;
///
/// let url = canonicalize("https://AUTO.RIA.com/uk/auto_bmw_x5_35012345.html#photo").unwrap();
/// assert_eq!(url, "https://auto.ria.com/uk/auto_bmw_x5_35012345.html");
/// ```
pub fn canonicalize(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize_url(url).map(String::from)
}

/// Resolves `href` against `base` and canonicalizes the result
///
/// Absolute hrefs are kept as-is (apart from canonicalization); relative and
/// protocol-relative hrefs are joined onto the base.
pub fn resolve(base: &str, href: &str) -> Result<String, UrlError> {
    let base = Url::parse(base).map_err(|e| UrlError::Parse(e.to_string()))?;
    let joined = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize_url(joined).map(String::from)
}

/// Returns `scheme://host[:port]` of a URL
pub fn origin_of(url: &Url) -> Result<String, UrlError> {
    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn canonicalize_url(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_string();
    if let Some(trimmed) = host.strip_suffix('.') {
        url.set_host(Some(trimmed))
            .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts the rest by key
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    // Stable sort keeps repeated keys in their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize("https://auto.ria.com/uk/auto_audi_a4_1.html#gallery").unwrap();
        assert_eq!(result, "https://auto.ria.com/uk/auto_audi_a4_1.html");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = canonicalize("https://AUTO.RIA.COM/uk/Car/Used/").unwrap();
        assert_eq!(result, "https://auto.ria.com/uk/Car/Used/");
    }

    #[test]
    fn test_scheme_is_preserved() {
        let result = canonicalize("http://127.0.0.1:8080/auto_x_1.html").unwrap();
        assert_eq!(result, "http://127.0.0.1:8080/auto_x_1.html");
    }

    #[test]
    fn test_tracking_params_removed() {
        let result =
            canonicalize("https://auto.ria.com/uk/car/used/?page=2&utm_source=x&fbclid=1").unwrap();
        assert_eq!(result, "https://auto.ria.com/uk/car/used/?page=2");

        let result = canonicalize("https://auto.ria.com/a.html?utm_medium=mail").unwrap();
        assert_eq!(result, "https://auto.ria.com/a.html");
    }

    #[test]
    fn test_query_params_sorted() {
        let a = canonicalize("https://auto.ria.com/search/?page=2&category_id=1").unwrap();
        let b = canonicalize("https://auto.ria.com/search/?category_id=1&page=2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://auto.ria.com/search/?category_id=1&page=2");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize("ftp://auto.ria.com/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize("not a url").is_err());
        assert!(canonicalize("/uk/auto_x_1.html").is_err());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = "https://auto.ria.com/uk/car/used/?page=1";
        assert_eq!(
            resolve(base, "/uk/auto_bmw_x5_35012345.html").unwrap(),
            "https://auto.ria.com/uk/auto_bmw_x5_35012345.html"
        );
        assert_eq!(
            resolve(base, "?page=2").unwrap(),
            "https://auto.ria.com/uk/car/used/?page=2"
        );
        assert_eq!(
            resolve(base, "https://other.example/auto_a_1.html").unwrap(),
            "https://other.example/auto_a_1.html"
        );
        assert_eq!(
            resolve(base, "//auto.ria.com/auto_a_2.html").unwrap(),
            "https://auto.ria.com/auto_a_2.html"
        );
    }

    #[test]
    fn test_origin_of() {
        let url = Url::parse("https://auto.ria.com/uk/car/used/?page=3").unwrap();
        assert_eq!(origin_of(&url).unwrap(), "https://auto.ria.com");

        let url = Url::parse("http://127.0.0.1:4321/search").unwrap();
        assert_eq!(origin_of(&url).unwrap(), "http://127.0.0.1:4321");
    }
}
