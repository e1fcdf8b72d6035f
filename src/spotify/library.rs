use crate::{
    error::UpstreamError,
    types::{Page, Track, UserProfile},
};

use super::SpotifyClient;

/// Largest page the library endpoints serve.
pub const LIBRARY_PAGE_LIMIT: u32 = 50;

impl SpotifyClient {
    /// Lightweight identity probe (`GET /me`).
    pub async fn current_user(&self, token: &str) -> Result<UserProfile, UpstreamError> {
        self.get_json("me", &[], token).await
    }

    /// The user's short-term top tracks.
    pub async fn top_tracks(&self, token: &str) -> Result<Vec<Track>, UpstreamError> {
        let page: Page<Track> = self
            .get_json(
                "me/top/tracks",
                &[
                    ("limit", LIBRARY_PAGE_LIMIT.to_string()),
                    ("time_range", "short_term".to_string()),
                ],
                token,
            )
            .await?;
        Ok(page.items)
    }

    /// Start of the saved ("liked") tracks collection; later pages follow `next`.
    pub fn saved_tracks_url(&self) -> String {
        format!(
            "{}?limit={}",
            self.endpoint("me/tracks"),
            LIBRARY_PAGE_LIMIT
        )
    }
}
