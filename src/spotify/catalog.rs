use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::UpstreamError,
    types::{Artist, AudioFeatures, Track},
};

use super::SpotifyClient;

/// A catalog resource that can be requested by ID, alone or in batches.
///
/// The batch endpoint is `GET /{COLLECTION}?ids=a,b,c` and answers with an
/// array under `FIELD`, holding `null` for unknown IDs. The single form is
/// `GET /{COLLECTION}/{id}`.
pub trait BatchResource: DeserializeOwned + Clone + Send {
    const COLLECTION: &'static str;
    const FIELD: &'static str;

    fn id(&self) -> &str;
}

impl BatchResource for Artist {
    const COLLECTION: &'static str = "artists";
    const FIELD: &'static str = "artists";

    fn id(&self) -> &str {
        &self.id
    }
}

impl BatchResource for Track {
    const COLLECTION: &'static str = "tracks";
    const FIELD: &'static str = "tracks";

    fn id(&self) -> &str {
        &self.id
    }
}

impl BatchResource for AudioFeatures {
    const COLLECTION: &'static str = "audio-features";
    const FIELD: &'static str = "audio_features";

    fn id(&self) -> &str {
        &self.id
    }
}

impl SpotifyClient {
    /// Fetches one batch of IDs. Unknown IDs come back as `None`.
    pub async fn get_batch<T: BatchResource>(
        &self,
        ids: &[String],
        token: &str,
    ) -> Result<Vec<Option<T>>, UpstreamError> {
        let mut body: Value = self
            .get_json(T::COLLECTION, &[("ids", ids.join(","))], token)
            .await?;

        let items = body
            .get_mut(T::FIELD)
            .map(Value::take)
            .ok_or_else(|| UpstreamError::MalformedPayload(format!("missing `{}`", T::FIELD)))?;

        serde_json::from_value(items).map_err(|e| UpstreamError::MalformedPayload(e.to_string()))
    }

    /// Fetches a single item by ID.
    pub async fn get_one<T: BatchResource>(&self, id: &str, token: &str) -> Result<T, UpstreamError> {
        self.get_json(&format!("{}/{}", T::COLLECTION, id), &[], token)
            .await
    }
}
