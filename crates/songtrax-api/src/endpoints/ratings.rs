//! Sample rating endpoint.

use songtrax_core::{Result, SampleId, SampleRating};

use crate::{types::RawRating, SongtraxClient};

impl SongtraxClient {
    /// The rating recorded for `sample`, if anyone has rated it.
    pub async fn get_sample_rating(&self, sample: SampleId) -> Result<Option<SampleRating>> {
        let rows: Vec<RawRating> = self
            .get("samplerating", &[("sample_id", sample.to_string())])
            .await?;
        Ok(first_rating(rows, sample))
    }
}

fn first_rating(rows: Vec<RawRating>, sample: SampleId) -> Option<SampleRating> {
    rows.into_iter()
        .map(SampleRating::from)
        .find(|rating| rating.sample_id == sample)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_first_matching_rating() {
        let rows: Vec<RawRating> = serde_json::from_str(
            r#"[{"id": 8, "sample_id": 3, "rating": 2}, {"id": 9, "sample_id": 4, "rating": 5}]"#,
        )
        .unwrap();
        let rating = first_rating(rows, SampleId(4)).unwrap();
        assert_eq!(rating.id, 9);
        assert_eq!(rating.rating, 5);
    }

    #[test]
    fn test_unrated_sample() {
        assert!(first_rating(Vec::new(), SampleId(1)).is_none());
    }
}
