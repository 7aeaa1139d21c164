//! Browser fingerprint masking and human-like page interaction
//!
//! The stealth script is installed on every new page before any site script
//! runs. The interaction plan is drawn up front so that no random number
//! generator is held across an await point.

use rand::Rng;
use std::time::Duration;

/// Script evaluated on every new document
pub const STEALTH_SCRIPT: &str = r#"
(() => {
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });

    window.chrome = window.chrome || {};
    window.chrome.runtime = window.chrome.runtime || {};
    window.chrome.app = window.chrome.app || { isInstalled: false };

    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
            { name: 'Native Client', filename: 'internal-nacl-plugin' },
        ],
    });

    Object.defineProperty(navigator, 'languages', { get: () => ['uk-UA', 'uk', 'en-US', 'en'] });

    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function (parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter.call(this, parameter);
    };

    if (navigator.permissions && navigator.permissions.query) {
        const query = navigator.permissions.query.bind(navigator.permissions);
        navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : query(parameters);
    }

    window.open = () => null;
})();
"#;

/// Script returning the document ready state
pub const READY_STATE_SCRIPT: &str = "document.readyState";

/// A randomized sequence of scrolls, mouse moves and pauses for one page
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionPlan {
    /// Vertical scroll positions in pixels, each followed by its pause
    pub scrolls: Vec<(i64, Duration)>,

    /// Mouse positions to move through
    pub mouse_moves: Vec<(f64, f64)>,

    /// Whether to click an incidental non-link element
    pub incidental_click: bool,

    /// Final pause before reading the content
    pub reading_pause: Duration,
}

impl InteractionPlan {
    /// Draws a plan for a page of roughly `page_height` pixels
    pub fn random(page_height: i64) -> Self {
        let mut rng = rand::rng();
        let height = page_height.max(1000);

        let steps = rng.random_range(5..=10);
        let scrolls = (1..=steps)
            .map(|step| {
                let target = height * step / steps + rng.random_range(-100..=100);
                let pause = Duration::from_millis(rng.random_range(300..=700));
                (target.max(0), pause)
            })
            .collect();

        let moves = rng.random_range(3..=6);
        let mouse_moves = (0..moves)
            .map(|_| {
                (
                    rng.random_range(200.0..=800.0),
                    rng.random_range(200.0..=600.0),
                )
            })
            .collect();

        Self {
            scrolls,
            mouse_moves,
            incidental_click: rng.random_bool(0.3),
            reading_pause: Duration::from_millis(rng.random_range(1000..=2000)),
        }
    }

    /// Sum of all pauses in the plan
    pub fn total_pause(&self) -> Duration {
        self.scrolls.iter().map(|(_, pause)| *pause).sum::<Duration>() + self.reading_pause
    }
}

/// Script scrolling the window to `y`
pub fn scroll_script(y: i64) -> String {
    format!("window.scrollTo({{ top: {}, behavior: 'smooth' }})", y)
}

/// Script clicking the first visible element that is neither a link nor a button
pub const INCIDENTAL_CLICK_SCRIPT: &str = r#"
(() => {
    const candidates = Array.from(document.querySelectorAll('p, span, h2, h3, li'))
        .filter((el) => !el.closest('a, button, [onclick]') && el.offsetParent !== null);
    if (candidates.length === 0) return false;
    candidates[Math.floor(Math.random() * candidates.length)].click();
    return true;
})()
"#;
