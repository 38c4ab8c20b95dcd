//! The fetch tier trait and the tier cost constants

use super::task::FetchResult;
use async_trait::async_trait;

/// Cost of the plain blocking-style HTTP tier
pub const LIGHTWEIGHT_COST: u32 = 1;

/// Cost of the streaming HTTP tier
pub const ASYNCHRONOUS_COST: u32 = 2;

/// Cost of the WebDriver browser tier
pub const BROWSER_COST: u32 = 5;

/// One fetch capability in the escalating chain
///
/// Implementations never let an error escape `fetch`: every failure is
/// reported as an error [`FetchResult`] carrying a [`FailureKind`].
///
/// [`FailureKind`]: super::FailureKind
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs and statistics
    fn name(&self) -> &'static str;

    /// Relative cost; the chain tries cheaper tiers first
    fn cost(&self) -> u32;

    /// Cheap check whether this tier should attempt the URL at all
    ///
    /// An `Err` is treated by the chain the same as `Ok(false)`.
    async fn is_suitable(&self, url: &str) -> crate::Result<bool>;

    /// Fetches and cleans the page
    async fn fetch(&self, url: &str) -> FetchResult;

    /// Releases held connections or browser sessions; idempotent
    async fn cleanup(&self);
}
