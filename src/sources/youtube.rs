use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    audio::track::{AudioHandle, ContainerType, MediaProbe, MetadataLookup, TrackMetadata},
    error::MusicError,
};

const YTDLP_TIMEOUT: Duration = Duration::from_secs(30);

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?(youtube\.com|youtu\.be)/(watch\?v=)?.*$")
        .expect("regex de YouTube inválida")
});

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Formato elegido por yt-dlp con `-f bestaudio`
#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: String,
    ext: Option<String>,
    acodec: Option<String>,
}

/// Primer resultado de una búsqueda de texto.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub metadata: TrackMetadata,
}

/// Cliente para interactuar con YouTube a través de yt-dlp
pub struct YouTubeClient {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Verifica si una URL es un link directo de YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    /// Obtiene información de una URL específica
    pub async fn get_info(&self, url: &str) -> Result<TrackMetadata> {
        debug!("📊 Obteniendo info de: {}", url);
        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;
        let info: YtDlpInfo =
            serde_json::from_str(stdout.trim()).context("Error al parsear respuesta de yt-dlp")?;
        Ok(info_to_metadata(info))
    }

    /// Busca en YouTube y devuelve el primer resultado
    pub async fn search(&self, query: &str) -> Result<Option<SearchHit>> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;
        Ok(parse_search(&stdout))
    }

    /// Obtiene la URL del mejor stream de audio y su contenedor
    pub async fn get_stream(&self, url: &str) -> Result<AudioHandle> {
        debug!("🎵 Obteniendo stream para: {}", url);
        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--dump-json",
                "--no-warnings",
                url,
            ])
            .await?;
        let format: YtDlpFormat =
            serde_json::from_str(stdout.trim()).context("Error al parsear formato de yt-dlp")?;

        if format.url.is_empty() {
            anyhow::bail!("No se pudo obtener URL de stream");
        }

        Ok(AudioHandle {
            container: container_for(format.ext.as_deref(), format.acodec.as_deref()),
            stream_url: format.url,
            codec: format.acodec,
        })
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = tokio::time::timeout(YTDLP_TIMEOUT, Command::new("yt-dlp").args(args).output())
            .await
            .context("Timeout ejecutando yt-dlp")?
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MetadataLookup for YouTubeClient {
    async fn lookup(&self, url: &str) -> Result<TrackMetadata, MusicError> {
        self.get_info(url)
            .await
            .map_err(|e| MusicError::metadata(url, format!("{e:#}")))
    }
}

#[async_trait]
impl MediaProbe for YouTubeClient {
    async fn probe(&self, url: &str) -> Result<AudioHandle, MusicError> {
        self.get_stream(url).await.map_err(|e| {
            warn!("❌ yt-dlp no pudo preparar {}: {:#}", url, e);
            MusicError::audio(url, format!("{e:#}"))
        })
    }
}

fn parse_search(stdout: &str) -> Option<SearchHit> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .map(|info| SearchHit {
            url: watch_url(&info.id),
            metadata: info_to_metadata(info),
        })
        .find(|hit| !hit.metadata.title.is_empty())
}

fn info_to_metadata(info: YtDlpInfo) -> TrackMetadata {
    let artwork_url = info
        .thumbnail
        .or_else(|| info.thumbnails.last().map(|t| t.url.clone()));

    TrackMetadata {
        title: info.title.unwrap_or_default(),
        artist: info
            .artist
            .or(info.channel)
            .or(info.uploader)
            .unwrap_or_default(),
        album: info.album.unwrap_or_default(),
        artwork_url,
        duration: info.duration.map(|d| d.round() as u64).unwrap_or(0),
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Opus en webm/ogg se puede pasar sin recodificar; el resto lo sondea el decodificador.
fn container_for(ext: Option<&str>, acodec: Option<&str>) -> ContainerType {
    let opus = acodec.is_some_and(|codec| codec.contains("opus"));
    match ext {
        Some("webm") if opus => ContainerType::WebmOpus,
        Some("ogg") | Some("opus") if opus => ContainerType::OggOpus,
        _ => ContainerType::Arbitrary,
    }
}
