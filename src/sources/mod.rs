//! Record sources.
//!
//! - `HtmlListingSource` - static HTML listing page, configurable CSS selectors

mod html;

pub use html::HtmlListingSource;
