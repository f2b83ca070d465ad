//! Browser automation: driver abstraction, field detection and the
//! human-confirmed application engine

pub mod driver;
pub mod engine;
pub mod field_detector;
pub mod submit;
pub mod webdriver;

pub use driver::{BrowserLauncher, DriverError, Locator, NavigationOutcome, PageDriver};
pub use engine::{AutomationEngine, AutomationError, AutomationTimings};
pub use field_detector::{FieldDetector, FormField, HeuristicFieldDetector, OracleFieldDetector};
pub use webdriver::WebDriverLauncher;
