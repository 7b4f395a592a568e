pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serenity::model::id::{ChannelId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::track::{Origin, TrackDescriptor, TrackMetadata};

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Qué tipo de pedido hizo el usuario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    YouTubeLink,
    SpotifyTrack,
    SpotifyPlaylist,
    Search,
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        if YouTubeClient::is_youtube_url(query) {
            QueryKind::YouTubeLink
        } else if SpotifyClient::track_id(query).is_some() {
            QueryKind::SpotifyTrack
        } else if SpotifyClient::playlist_id(query).is_some() {
            QueryKind::SpotifyPlaylist
        } else {
            QueryKind::Search
        }
    }
}

/// Resultado de resolver un pedido: nada, una canción o una playlist expandida.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    None,
    Single(TrackDescriptor),
    Playlist(Vec<TrackDescriptor>),
}

/// Convierte el texto de un pedido en descriptores de canciones.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(
        &self,
        query: &str,
        channel_id: Option<ChannelId>,
        user_id: Option<UserId>,
    ) -> Result<Resolution>;
}

/// Resolver sobre YouTube (yt-dlp) y, si hay credenciales, Spotify.
pub struct SourceResolver {
    youtube: Arc<YouTubeClient>,
    spotify: Option<SpotifyClient>,
    max_playlist_size: usize,
}

impl SourceResolver {
    pub fn new(
        youtube: Arc<YouTubeClient>,
        spotify: Option<SpotifyClient>,
        max_playlist_size: usize,
    ) -> Self {
        Self {
            youtube,
            spotify,
            max_playlist_size,
        }
    }

    fn spotify(&self) -> Result<&SpotifyClient> {
        self.spotify
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Spotify no está configurado"))
    }

    async fn resolve_spotify_track(
        &self,
        query: &str,
        channel_id: Option<ChannelId>,
        user_id: Option<UserId>,
    ) -> Result<Resolution> {
        let Some(id) = SpotifyClient::track_id(query) else {
            return Ok(Resolution::None);
        };
        let Some(info) = self.spotify()?.track(&id).await? else {
            return Ok(Resolution::None);
        };

        let Some(hit) = self.youtube.search(&info.search_query()).await? else {
            warn!("Sin resultados en YouTube para {}", info.search_query());
            return Ok(Resolution::None);
        };

        Ok(Resolution::Single(TrackDescriptor {
            origin: Origin::CrossService,
            url: hit.url,
            channel_id,
            queued_by: user_id,
            metadata: Some(hit.metadata),
        }))
    }

    async fn resolve_spotify_playlist(
        &self,
        query: &str,
        channel_id: Option<ChannelId>,
        user_id: Option<UserId>,
    ) -> Result<Resolution> {
        let Some(id) = SpotifyClient::playlist_id(query) else {
            return Ok(Resolution::None);
        };
        let tracks = self
            .spotify()?
            .playlist_tracks(&id, self.max_playlist_size)
            .await?;
        if tracks.is_empty() {
            return Ok(Resolution::None);
        }

        let queries: Vec<String> = tracks.iter().map(|track| track.search_query()).collect();
        let hits = join_all(queries.iter().map(|q| self.youtube.search(q))).await;

        let descriptors: Vec<_> = tracks
            .into_iter()
            .zip(hits)
            .filter_map(|(track, hit)| match hit {
                Ok(Some(hit)) => Some(TrackDescriptor {
                    origin: Origin::PlaylistExpansion,
                    url: hit.url,
                    channel_id,
                    queued_by: user_id,
                    metadata: Some(TrackMetadata {
                        title: track.name.clone(),
                        artist: track.main_artist().to_string(),
                        album: track.album.name.clone(),
                        artwork_url: hit.metadata.artwork_url.or_else(|| track.artwork_url()),
                        duration: track.duration_secs(),
                    }),
                }),
                Ok(None) => None,
                Err(e) => {
                    warn!("Error buscando {}: {:#}", track.search_query(), e);
                    None
                }
            })
            .collect();

        info!("📋 Playlist resuelta: {} canciones", descriptors.len());
        if descriptors.is_empty() {
            Ok(Resolution::None)
        } else {
            Ok(Resolution::Playlist(descriptors))
        }
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(
        &self,
        query: &str,
        channel_id: Option<ChannelId>,
        user_id: Option<UserId>,
    ) -> Result<Resolution> {
        let query = query.trim();
        match QueryKind::classify(query) {
            QueryKind::YouTubeLink => Ok(Resolution::Single(TrackDescriptor {
                origin: Origin::DirectLink,
                url: query.to_string(),
                channel_id,
                queued_by: user_id,
                metadata: None,
            })),
            QueryKind::SpotifyTrack => self.resolve_spotify_track(query, channel_id, user_id).await,
            QueryKind::SpotifyPlaylist => {
                self.resolve_spotify_playlist(query, channel_id, user_id).await
            }
            QueryKind::Search => {
                let Some(hit) = self.youtube.search(query).await? else {
                    return Ok(Resolution::None);
                };
                Ok(Resolution::Single(TrackDescriptor {
                    origin: Origin::SearchResult,
                    url: hit.url,
                    channel_id,
                    queued_by: user_id,
                    metadata: Some(hit.metadata),
                }))
            }
        }
    }
}
