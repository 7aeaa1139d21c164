//! URL handling module
//!
//! This module provides URL canonicalization, relative link resolution and
//! the URL shape checks used to tell listing pages from advertisement pages.

mod normalize;
mod patterns;

// Re-export main functions
pub use normalize::{canonicalize, origin_of, resolve};
pub use patterns::{extract_ad_id, is_detail_url, is_listing_url};

/// Returns true if a fetch of `requested` that ended on `final_url` left the
/// expected page shape
///
/// A detail request must stay on a detail page, and a listing request must
/// stay on a listing page. Anything else means the site redirected us
/// somewhere we did not ask for, typically a block or verification page.
pub fn redirected_off_shape(requested: &str, final_url: &str) -> bool {
    if canonicalize(requested).ok() == canonicalize(final_url).ok() {
        return false;
    }

    if is_detail_url(requested) {
        !is_detail_url(final_url)
    } else if is_listing_url(requested) {
        !is_listing_url(final_url)
    } else {
        false
    }
}
