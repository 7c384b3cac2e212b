//! Request list state engine: records, derived views, batching and resend

mod actions;
mod fetch;
mod filters;
mod panel;
mod resend;
mod selectors;
mod sorters;
mod store;
mod url_info;

pub use fetch::{BodyFetcher, CaptureFetcher};
pub use filters::FilterType;
pub use panel::{NetMonitor, PanelEvent, PanelOptions};
pub use resend::{CustomEdit, HttpResendTransport};
pub use selectors::Summary;
pub use sorters::SortType;
pub use store::Record;
pub use url_info::{abbreviated_mime_type, extract_url_info};
