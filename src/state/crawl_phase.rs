/// Phase definitions for the crawl state machine
///
/// A run walks listing pages one at a time. Each page is fetched, its item
/// links are extracted and dispatched, and then the run either advances to the
/// next page or stops.
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Active Phases =====
    /// Run has been created but nothing was fetched yet
    Idle,

    /// The current listing page is being fetched (with retries)
    FetchingListing,

    /// Item links and the next-page link are being pulled from the listing
    ExtractingListing,

    /// Detail items of the current page are being fetched and stored
    DispatchingItems,

    /// Deciding whether another listing page should be fetched
    AdvancingPage,

    // ===== Terminal Phases =====
    /// Run finished normally (quota hit, no next page, cycle, or cancellation)
    Done,

    /// A listing page could not be fetched; no further pages were attempted
    Aborted,
}

impl CrawlPhase {
    /// Returns true if the run has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Returns true if moving from `self` to `next` is a legal step
    ///
    /// Every active phase may move straight to `Done`, which is how an external
    /// cancellation ends the run.
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;

        if !self.is_terminal() && next == Done {
            return true;
        }

        matches!(
            (self, next),
            (Idle, FetchingListing)
                | (FetchingListing, ExtractingListing)
                | (FetchingListing, Aborted)
                | (ExtractingListing, DispatchingItems)
                | (DispatchingItems, AdvancingPage)
                | (AdvancingPage, FetchingListing)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FetchingListing => "fetching_listing",
            Self::ExtractingListing => "extracting_listing",
            Self::DispatchingItems => "dispatching_items",
            Self::AdvancingPage => "advancing_page",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
