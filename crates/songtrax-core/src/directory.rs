//! Read-side view of the sample backend used by the proximity tracker.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Location, LocationId};

/// Where locations and their sample links come from.
#[async_trait]
pub trait SampleDirectory: Send + Sync {
    /// Fetch every tagged location.
    async fn locations(&self) -> Result<Vec<Location>>;

    /// Whether at least one sample has been shared to `location`.
    async fn has_samples_at(&self, location: LocationId) -> Result<bool>;
}
