use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, UserId};
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MusicError;

/// De dónde salió una canción encolada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Link directo al catálogo de reproducción (YouTube).
    #[serde(rename = "youtube")]
    DirectLink,
    /// Link de otro servicio (Spotify) traducido a una búsqueda.
    #[serde(rename = "spotify")]
    CrossService,
    /// Primer resultado de una búsqueda de texto libre.
    #[serde(rename = "youtube-music")]
    SearchResult,
    /// Una entrada de una playlist expandida.
    #[serde(rename = "spotify-playlist")]
    PlaylistExpansion,
}

/// Metadata visible de una canción. Inmutable una vez resuelta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    /// Duración en segundos.
    pub duration: u64,
}

/// Petición resuelta pero todavía sin cargar, producida por el resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub origin: Origin,
    pub url: String,
    pub channel_id: Option<ChannelId>,
    pub queued_by: Option<UserId>,
    pub metadata: Option<TrackMetadata>,
}

/// Proyección serializable de una canción (API HTTP y notificaciones).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub url: String,
    pub origin: Origin,
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration: u64,
}

/// Tipo de contenedor detectado al sondear el stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    WebmOpus,
    OggOpus,
    /// Cualquier otro formato; el decodificador tiene que sondearlo él mismo.
    Arbitrary,
}

/// Stream de audio listo para entregar al reproductor.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioHandle {
    pub stream_url: String,
    pub container: ContainerType,
    pub codec: Option<String>,
}

/// Búsqueda de metadata contra el catálogo de origen.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, url: &str) -> Result<TrackMetadata, MusicError>;
}

/// Capa de decodificación: convierte una URL en un stream sondeado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<AudioHandle, MusicError>;
}

enum AudioState {
    NotComputed,
    Ready(AudioHandle),
    Failed(String),
}

/// Una canción encolada.
///
/// El `id` se asigna una sola vez al construirla y la metadata nunca cambia.
/// El único estado mutable es el audio cacheado de [`Track::materialize_audio`].
pub struct Track {
    id: Uuid,
    url: String,
    origin: Origin,
    metadata: TrackMetadata,
    channel_id: Option<ChannelId>,
    queued_by: Option<UserId>,
    queued_at: DateTime<Utc>,
    probe: Arc<dyn MediaProbe>,
    audio: Mutex<AudioState>,
}

impl Track {
    pub fn new(
        descriptor: TrackDescriptor,
        metadata: TrackMetadata,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: descriptor.url,
            origin: descriptor.origin,
            metadata,
            channel_id: descriptor.channel_id,
            queued_by: descriptor.queued_by,
            queued_at: Utc::now(),
            probe,
            audio: Mutex::new(AudioState::NotComputed),
        }
    }

    /// Construye una canción completa a partir de un descriptor.
    ///
    /// Si el descriptor no trae metadata se consulta el catálogo; un fallo o
    /// un resultado vacío se reporta como [`MusicError::MetadataUnavailable`].
    pub async fn resolve(
        descriptor: TrackDescriptor,
        lookup: &dyn MetadataLookup,
        probe: Arc<dyn MediaProbe>,
    ) -> Result<Self, MusicError> {
        let metadata = match descriptor.metadata.clone() {
            Some(metadata) => metadata,
            None => {
                debug!("🔍 Buscando metadata para {}", descriptor.url);
                let metadata = lookup.lookup(&descriptor.url).await.map_err(|e| match e {
                    MusicError::MetadataUnavailable { .. } => e,
                    other => MusicError::metadata(&descriptor.url, other),
                })?;
                if metadata.title.trim().is_empty() {
                    return Err(MusicError::metadata(&descriptor.url, "sin resultados"));
                }
                metadata
            }
        };

        Ok(Self::new(descriptor, metadata, probe))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    pub fn queued_by(&self) -> Option<UserId> {
        self.queued_by
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    /// Título para mostrar: los links directos ya son únicos, el resto lleva
    /// el artista para distinguir títulos casi iguales.
    pub fn display_title(&self) -> String {
        match self.origin {
            Origin::DirectLink => self.metadata.title.clone(),
            _ => format!("{} - {}", self.metadata.title, self.metadata.artist),
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            url: self.url.clone(),
            origin: self.origin,
            id: self.id,
            title: self.metadata.title.clone(),
            artist: self.metadata.artist.clone(),
            album: self.metadata.album.clone(),
            artwork_url: self.metadata.artwork_url.clone(),
            duration: self.metadata.duration,
        }
    }

    /// Prepara el stream de audio una sola vez y lo cachea.
    ///
    /// Después de un éxito devuelve el handle cacheado; después de un fallo
    /// vuelve a intentar todo el flujo.
    pub async fn materialize_audio(&self) -> Result<AudioHandle, MusicError> {
        let mut audio = self.audio.lock().await;

        match &*audio {
            AudioState::Ready(handle) => return Ok(handle.clone()),
            AudioState::Failed(reason) => {
                debug!("🔄 Reintentando audio de {} (falló antes: {})", self.url, reason);
            }
            AudioState::NotComputed => {}
        }

        match self.probe.probe(&self.url).await {
            Ok(handle) => {
                info!("🎧 Audio listo para {} ({:?})", self.metadata.title, handle.container);
                *audio = AudioState::Ready(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let e = match e {
                    MusicError::AudioUnavailable { .. } => e,
                    other => MusicError::audio(&self.url, other),
                };
                warn!("❌ No se pudo preparar audio de {}: {}", self.url, e);
                *audio = AudioState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("origin", &self.origin)
            .field("title", &self.metadata.title)
            .field("queued_by", &self.queued_by)
            .finish()
    }
}
