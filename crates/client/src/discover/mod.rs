//! Precache manifest discovery.
//!
//! Two sources feed the install-time manifest beyond the fixed shell list:
//! build assets referenced from the shell document's markup, and the URLs
//! listed in the content index document.

pub mod assets;
pub mod content_index;

pub use assets::discover_assets;
pub use content_index::{flatten_content_index, parse_content_index};
