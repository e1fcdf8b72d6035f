use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;
use tabled::Tabled;

/// Raw response of the token endpoint, for every grant type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
}

/// A provider paging object; `next` is the cursor to the following page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedTrack {
    pub added_at: Option<String>,
    /// `None` for removed tracks and for local files, which have no catalog ID.
    #[serde(default, deserialize_with = "catalog_track")]
    pub track: Option<Track>,
}

fn catalog_track<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Track>, D::Error> {
    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let local = value.get("is_local").and_then(Value::as_bool).unwrap_or(false);
    if local || value.get("id").is_none_or(Value::is_null) {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(D::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    pub danceability: f64,
    pub energy: f64,
    pub valence: f64,
    pub tempo: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
}

/// One row of a harvest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTrack {
    pub id: String,
    pub name: String,
    pub artists: String,
    pub album: String,
    pub popularity: u32,
    pub genres: String,
    pub duration_ms: u64,
    pub audio_features: Option<AudioFeatures>,
}

/// How much of each batched enrichment step was resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub artists_requested: usize,
    pub artists_resolved: usize,
    pub features_requested: usize,
    pub features_resolved: usize,
    pub saved_tracks_complete: bool,
}

impl Coverage {
    pub fn is_partial(&self) -> bool {
        self.artists_resolved < self.artists_requested
            || self.features_resolved < self.features_requested
            || !self.saved_tracks_complete
    }
}

/// The harvested dataset handed to the recommendation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub user_id: String,
    pub tracks: Vec<SnapshotTrack>,
    pub saved_track_ids: Vec<String>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(rename = "albumImage")]
    pub album_image: Option<String>,
}

#[derive(Tabled)]
pub struct SnapshotTableRow {
    pub name: String,
    pub artists: String,
    pub genres: String,
}

#[derive(Tabled)]
pub struct RecommendationTableRow {
    pub name: String,
    pub artist: String,
    pub id: String,
}
