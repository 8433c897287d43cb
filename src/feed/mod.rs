use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::fetch::{FetchError, FetchResponse};

/// Capability seam for the image-of-the-day service.
///
/// The business layer implements this on top of
/// [`Fetcher`](crate::fetch::Fetcher); new sources never require changes
/// to the fetcher itself.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetches today's image metadata from the upstream service.
    async fn image_of_day(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError>;
}
