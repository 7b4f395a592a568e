use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

static TRACK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/track/([A-Za-z0-9]*)(?:\?si=.*)?$")
        .expect("regex de Spotify inválida")
});

static PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://open\.spotify\.com/playlist/([A-Za-z0-9]*)(?:\?si=.*)?$")
        .expect("regex de Spotify inválida")
});

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotifyTrack {
    pub name: String,
    pub artists: Vec<SpotifyArtist>,
    pub album: SpotifyAlbum,
    pub duration_ms: u64,
}

impl SpotifyTrack {
    pub fn main_artist(&self) -> &str {
        self.artists.first().map(|a| a.name.as_str()).unwrap_or_default()
    }

    /// Texto usado para buscar la canción en YouTube.
    pub fn search_query(&self) -> String {
        format!("{}, {}", self.name, self.main_artist())
    }

    pub fn duration_secs(&self) -> u64 {
        (self.duration_ms + 500) / 1000
    }

    pub fn artwork_url(&self) -> Option<String> {
        self.album.images.first().map(|image| image.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    // Las canciones locales o borradas vienen como null
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistPage {
    items: Vec<PlaylistItem>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify con credenciales de aplicación.
pub struct SpotifyClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    market: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String, market: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Error creando cliente HTTP de Spotify")?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            market,
            token: Mutex::new(None),
        })
    }

    pub fn track_id(url: &str) -> Option<String> {
        TRACK_URL.captures(url).map(|caps| caps[1].to_string())
    }

    pub fn playlist_id(url: &str) -> Option<String> {
        PLAYLIST_URL.captures(url).map(|caps| caps[1].to_string())
    }

    /// Obtiene un token válido, renovándolo cuando expira
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(cached) = token.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Error pidiendo token de Spotify")?;

        if !response.status().is_success() {
            anyhow::bail!("Spotify rechazó las credenciales: {}", response.status());
        }

        let data: TokenResponse = response.json().await?;
        let value = data.access_token.clone();
        *token = Some(CachedToken {
            value: data.access_token,
            expires_at: Instant::now() + Duration::from_secs(data.expires_in),
        });
        Ok(value)
    }

    /// Obtiene una canción; `None` si Spotify no la conoce.
    pub async fn track(&self, id: &str) -> Result<Option<SpotifyTrack>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/tracks/{}", API_URL, id))
            .query(&[("market", self.market.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            warn!("Spotify no encontró la canción {}: {}", id, status);
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Spotify API error: {} - {}", status, error_text);
        }

        Ok(Some(response.json().await?))
    }

    /// Obtiene las canciones de una playlist (Spotify devuelve como mucho 100 por página).
    pub async fn playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<SpotifyTrack>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/playlists/{}/tracks", API_URL, id))
            .query(&[("market", self.market.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!("Playlist de Spotify {} no encontrada", id);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Spotify API error: {} - {}", status, error_text);
        }

        let page: PlaylistPage = response.json().await?;
        let tracks = tracks_from_page(page, limit);
        info!("📋 Playlist de Spotify {}: {} canciones", id, tracks.len());
        Ok(tracks)
    }
}

fn tracks_from_page(page: PlaylistPage, limit: usize) -> Vec<SpotifyTrack> {
    page.items
        .into_iter()
        .filter_map(|item| item.track)
        .take(limit)
        .collect()
}
