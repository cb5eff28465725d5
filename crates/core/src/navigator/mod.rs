//! Portal navigation: discovering publications and submitting download forms.

mod http;
mod listing;
mod types;

pub use http::{encode_form, HttpPortalNavigator};
pub use listing::{class_range_from_text, local_file_name, parse_listing};
pub use types::*;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Narrow capability over the remote portal.
#[async_trait]
pub trait PortalNavigator: Send + Sync {
    /// Returns the navigator name (e.g., "http").
    fn name(&self) -> &str;

    /// Fetch at most `max_count` listings, newest first.
    ///
    /// Fails when the listing structure cannot be located.
    async fn discover(&self, max_count: usize) -> Result<Vec<Listing>, NavigatorError>;

    /// Submit the target's form and stream the returned PDF into `sink`.
    ///
    /// Returns the number of bytes written.
    async fn submit_form(
        &self,
        target: &DownloadTarget,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, NavigatorError>;
}
