use std::sync::Arc;
use tracing::{info, warn};

use super::{
    queue::{EnqueueOptions, GuildQueue},
    track::{MediaProbe, MetadataLookup, Track, TrackDescriptor},
};
use crate::{error::MusicError, sources::Resolution};

/// Qué pasó al encolar el resultado de un pedido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// El pedido no encontró nada.
    None,
    Single(String),
    Multi(usize),
    /// Ninguna canción pudo construirse.
    Error,
}

/// Catálogo usado para completar descriptores y preparar su audio.
#[derive(Clone)]
pub struct Catalog {
    pub lookup: Arc<dyn MetadataLookup>,
    pub probe: Arc<dyn MediaProbe>,
}

impl Catalog {
    pub async fn build(&self, descriptor: TrackDescriptor) -> Result<Arc<Track>, MusicError> {
        Track::resolve(descriptor, self.lookup.as_ref(), Arc::clone(&self.probe))
            .await
            .map(Arc::new)
    }
}

/// Encola el resultado del resolver.
///
/// Las playlists se encolan con `wait` y arrancan una sola vez al final;
/// `priority` solo aplica a pedidos de una canción. Falla con
/// [`MusicError::NoActiveSession`] si la cola se destruyó mientras tanto.
pub async fn enqueue_resolution(
    queue: &Arc<GuildQueue>,
    catalog: &Catalog,
    resolution: Resolution,
    priority: bool,
) -> Result<EnqueueOutcome, MusicError> {
    match resolution {
        Resolution::None => Ok(EnqueueOutcome::None),
        Resolution::Single(descriptor) => match catalog.build(descriptor).await {
            Ok(track) => {
                let title = track.display_title();
                queue
                    .enqueue(track, EnqueueOptions { wait: false, priority })
                    .await?;
                Ok(EnqueueOutcome::Single(title))
            }
            Err(e) => {
                warn!("⚠️ No se pudo encolar: {}", e);
                Ok(EnqueueOutcome::Error)
            }
        },
        Resolution::Playlist(descriptors) => {
            let mut count = 0;
            for descriptor in descriptors {
                match catalog.build(descriptor).await {
                    Ok(track) => {
                        queue
                            .enqueue(track, EnqueueOptions { wait: true, priority: false })
                            .await?;
                        count += 1;
                    }
                    Err(e) => warn!("⚠️ Saltando canción de playlist: {}", e),
                }
            }

            if count == 0 {
                return Ok(EnqueueOutcome::Error);
            }
            info!("📋 Encoladas {} canciones de playlist", count);
            queue.start();
            Ok(EnqueueOutcome::Multi(count))
        }
    }
}
