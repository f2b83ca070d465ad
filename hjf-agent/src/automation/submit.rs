//! Submit control discovery and highlighting
//!
//! The submit control is located and visually marked, never clicked.
//! Clicking happens only in the engine's confirm path.

use serde_json::json;
use tracing::{debug, warn};

use super::driver::{DriverError, PageDriver};

/// Candidate submit selectors, highest priority first
pub const SUBMIT_SELECTORS: [&str; 5] = [
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    "xpath=//button[contains(normalize-space(.), 'Submit')]",
    "xpath=//button[contains(normalize-space(.), 'Apply')]",
    "xpath=//button[contains(normalize-space(.), 'Send')]",
];

/// Outlines the control in red and scrolls it into view
const HIGHLIGHT_SCRIPT: &str = r#"
const selector = arguments[0];
let el = null;
if (selector.startsWith('xpath=')) {
  el = document.evaluate(selector.slice(6), document, null,
    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
} else {
  el = document.querySelector(selector);
}
if (!el) { return false; }
el.style.border = '3px solid red';
el.style.boxShadow = '0 0 10px red';
el.scrollIntoView({ behavior: 'smooth', block: 'center' });
return true;
"#;

/// First selector in [`SUBMIT_SELECTORS`] present on the page
///
/// Lookup errors on one selector move on to the next; a closed browser
/// ends the search.
pub async fn locate_submit(page: &dyn PageDriver) -> Result<Option<&'static str>, DriverError> {
    for selector in SUBMIT_SELECTORS {
        match page.exists(selector).await {
            Ok(true) => {
                debug!(selector, "Submit control located");
                return Ok(Some(selector));
            }
            Ok(false) => {}
            Err(DriverError::Closed) => return Err(DriverError::Closed),
            Err(e) => debug!(selector, error = %e, "Submit selector lookup failed"),
        }
    }
    Ok(None)
}

/// Mark the submit control for the operator. Failure is cosmetic.
pub async fn highlight(page: &dyn PageDriver, selector: &str) {
    if let Err(e) = page.evaluate(HIGHLIGHT_SCRIPT, vec![json!(selector)]).await {
        warn!(selector, error = %e, "Could not highlight submit control");
    }
}
