//! Sample endpoints.

use songtrax_core::{LocationId, Result, Sample, SampleId, SampleLink};
use tracing::debug;

use crate::{
    types::{RawSample, RawSampleLink},
    SongtraxClient,
};

impl SongtraxClient {
    /// Fetch a sample and decode its recorded grid.
    pub async fn get_sample(&self, id: SampleId) -> Result<Sample> {
        let row: RawSample = self.get(&format!("sample/{id}"), &[]).await?;
        Sample::try_from(row)
    }

    /// Links for every sample shared to `location`.
    pub async fn get_sample_links(&self, location: LocationId) -> Result<Vec<SampleLink>> {
        let rows: Vec<RawSampleLink> = self
            .get("sampletolocation", &[("location_id", location.to_string())])
            .await?;
        Ok(links_at(rows, location))
    }

    /// Fetch every sample shared to `location`, in link order.
    pub async fn get_samples_at(&self, location: LocationId) -> Result<Vec<Sample>> {
        let links = self.get_sample_links(location).await?;
        debug!("{} samples linked to location {location}", links.len());

        let mut samples = Vec::with_capacity(links.len());
        for link in links {
            samples.push(self.get_sample(link.sample_id).await?);
        }
        Ok(samples)
    }
}

/// The backend filters by `location_id`, but rows for other locations are
/// dropped anyway in case the filter is ignored.
fn links_at(rows: Vec<RawSampleLink>, location: LocationId) -> Vec<SampleLink> {
    rows.into_iter()
        .map(SampleLink::from)
        .filter(|link| link.location_id == location)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_links_are_filtered_by_location() {
        let rows: Vec<RawSampleLink> = serde_json::from_str(
            r#"[
                {"id": 1, "sample_id": 10, "location_id": 4},
                {"id": 2, "sample_id": 11, "location_id": 5},
                {"id": 3, "sample_id": 12, "location_id": 4}
            ]"#,
        )
        .unwrap();

        let samples: Vec<SampleId> = links_at(rows, LocationId(4))
            .iter()
            .map(|link| link.sample_id)
            .collect();
        assert_eq!(samples, [SampleId(10), SampleId(12)]);
    }
}
