//! Location endpoints and the directory view used for proximity checks.

use async_trait::async_trait;
use songtrax_core::{Error, Location, LocationId, Result, SampleDirectory};
use tracing::{debug, warn};

use crate::{
    types::{RawLocation, RawSampleLink},
    SongtraxClient,
};

impl SongtraxClient {
    /// Fetch every tagged location.
    ///
    /// Rows with unusable coordinates are skipped rather than failing the
    /// whole listing.
    pub async fn get_locations(&self) -> Result<Vec<Location>> {
        let rows: Vec<RawLocation> = self.get("location", &[]).await?;
        Ok(collect_locations(rows))
    }
}

pub(crate) fn collect_locations(rows: Vec<RawLocation>) -> Vec<Location> {
    let total = rows.len();
    let locations: Vec<Location> = rows
        .into_iter()
        .filter_map(|row| match Location::try_from(row) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("Skipping location: {e}");
                None
            }
        })
        .collect();
    debug!("Loaded {} of {total} locations", locations.len());
    locations
}

#[async_trait]
impl SampleDirectory for SongtraxClient {
    async fn locations(&self) -> Result<Vec<Location>> {
        self.get_locations().await.map_err(into_backend_failure)
    }

    async fn has_samples_at(&self, location: LocationId) -> Result<bool> {
        let links: Vec<RawSampleLink> = self
            .get("sampletolocation", &[("location_id", location.to_string())])
            .await
            .map_err(into_backend_failure)?;
        Ok(links.iter().any(|link| link.location_id == location.0))
    }
}

fn into_backend_failure(e: Error) -> Error {
    match e {
        Error::BackendUnavailable(_) => e,
        other => Error::BackendUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_collect_skips_bad_rows() {
        let rows: Vec<RawLocation> = serde_json::from_str(
            r#"[
                {"id": 1, "name": "Library", "latitude": "-27.4960", "longitude": "153.0140"},
                {"id": 2, "name": "Nowhere", "latitude": "", "longitude": "153.0"},
                {"id": 3, "latitude": -27.4990, "longitude": 153.0120}
            ]"#,
        )
        .unwrap();

        let ids: Vec<LocationId> = collect_locations(rows).iter().map(|l| l.id).collect();
        assert_eq!(ids, [LocationId(1), LocationId(3)]);
    }

    #[test]
    fn test_backend_failure_mapping() {
        let mapped = into_backend_failure(Error::Network("reset".to_string()));
        assert!(matches!(mapped, Error::BackendUnavailable(ref m) if m.contains("reset")));

        let mapped = into_backend_failure(Error::BackendUnavailable("down".to_string()));
        assert!(matches!(mapped, Error::BackendUnavailable(ref m) if m == "down"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_reported() {
        let client = SongtraxClient::with_config(
            crate::ApiConfig::default()
                .with_base_url("http://127.0.0.1:9/api")
                .with_timeout(std::time::Duration::from_millis(200)),
        )
        .unwrap();

        let result = client.has_samples_at(LocationId(1)).await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }
}
