//! Browser lifecycle management.
//!
//! Two lifecycles live here, deliberately separate:
//! - [`chromium::BrowserManager`]: the process-wide shared instance used by
//!   the quote extractor. Launched lazily, reused across cycles, closed only
//!   on shutdown or after an unexpected disconnect.
//! - [`chromium::EphemeralBrowser`]: a per-call instance for the delivery
//!   escalation path. Launched, used once, always closed.

pub mod chromium;
pub mod shared;

pub use chromium::{BrowserHandle, BrowserManager, EphemeralBrowser};
pub use shared::{InstanceState, SharedInstance};
