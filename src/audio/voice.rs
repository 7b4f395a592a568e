use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::context_data::{DisconnectKind, DisconnectReason},
    id::ChannelId as VoiceChannelId,
    input::{HttpRequest, Input},
    model::CloseCode,
    tracks::TrackHandle,
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock, Weak,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    queue::{
        AudioOutput, DisconnectCause, GuildQueue, QueueEvent, Transport, TransportState,
        CLOSE_CODE_DISCONNECTED,
    },
    track::{AudioHandle, Track},
};
use crate::error::MusicError;

/// Conexión de voz y reproductor de una guild sobre songbird.
///
/// Traduce los eventos del driver y de cada pista a [`QueueEvent`]s y ejecuta
/// las órdenes del motor (reconectar, destruir, reproducir, parar).
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel: Mutex<VoiceChannelId>,
    http: reqwest::Client,
    queue: OnceLock<Weak<GuildQueue>>,
    current: Mutex<Option<TrackHandle>>,
    events_registered: AtomicBool,
}

impl SongbirdVoice {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
        http: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            guild_id,
            channel: Mutex::new(VoiceChannelId::from(channel_id)),
            http,
            queue: OnceLock::new(),
            current: Mutex::new(None),
            events_registered: AtomicBool::new(false),
        })
    }

    /// Conecta los eventos del adaptador con la cola que lo posee.
    pub fn attach(&self, queue: &Arc<GuildQueue>) {
        if self.queue.set(Arc::downgrade(queue)).is_err() {
            warn!("El adaptador de voz de guild {} ya tenía cola", self.guild_id);
        }
    }

    fn queue(&self) -> Weak<GuildQueue> {
        self.queue.get().cloned().unwrap_or_default()
    }

    fn dispatch(&self, event: QueueEvent) {
        if let Some(queue) = self.queue().upgrade() {
            queue.dispatch(event);
        }
    }

    /// Entra al canal de voz. El resultado llega a la cola como evento.
    pub async fn join(&self) -> Result<(), MusicError> {
        self.dispatch(QueueEvent::Transport(TransportState::Signalling));
        self.connect().await
    }

    async fn connect(&self) -> Result<(), MusicError> {
        let channel = *self.channel.lock();
        info!("🔊 Conectando a canal de voz {:?} en guild {}", channel, self.guild_id);

        match self.manager.join(self.guild_id, channel).await {
            Ok(call) => {
                if !self.events_registered.swap(true, Ordering::SeqCst) {
                    let mut call = call.lock().await;
                    let notifier = ConnectionNotifier {
                        guild_id: self.guild_id,
                        queue: self.queue(),
                    };
                    call.add_global_event(Event::Core(CoreEvent::DriverConnect), notifier.clone());
                    call.add_global_event(Event::Core(CoreEvent::DriverReconnect), notifier.clone());
                    call.add_global_event(Event::Core(CoreEvent::DriverDisconnect), notifier);
                }
                self.dispatch(QueueEvent::Transport(TransportState::Ready));
                Ok(())
            }
            Err(e) => {
                error!("❌ Error al unirse al canal de voz en guild {}: {:?}", self.guild_id, e);
                self.dispatch(QueueEvent::Transport(TransportState::Disconnected(
                    DisconnectCause::Other,
                )));
                Err(MusicError::Transport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for SongbirdVoice {
    async fn rejoin(&self) -> Result<(), MusicError> {
        // Si nos movieron de canal, songbird ya conoce el nuevo
        if let Some(call) = self.manager.get(self.guild_id) {
            if let Some(current) = call.lock().await.current_channel() {
                *self.channel.lock() = current;
            }
        }
        self.connect().await
    }

    async fn destroy(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Error al salir del canal de voz en guild {}: {:?}", self.guild_id, e);
        }
    }
}

#[async_trait]
impl AudioOutput for SongbirdVoice {
    async fn play(&self, track: Arc<Track>, audio: AudioHandle) -> Result<(), MusicError> {
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or_else(|| MusicError::Transport("sin conexión de voz".to_string()))?;

        debug!(
            "🎧 {} ({:?}, codec {:?})",
            track.display_title(),
            audio.container,
            audio.codec
        );
        let input: Input = HttpRequest::new(self.http.clone(), audio.stream_url).into();

        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };

        let queue = self.queue();
        let signals = [
            (TrackEvent::Playable, TrackSignal::Started),
            (TrackEvent::End, TrackSignal::Ended),
            (TrackEvent::Error, TrackSignal::Errored),
        ];
        for (event, signal) in signals {
            let notifier = TrackNotifier {
                queue: queue.clone(),
                track: track.id(),
                signal,
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                let _ = handle.stop();
                return Err(MusicError::Playback(e.to_string()));
            }
        }

        if let Some(previous) = self.current.lock().replace(handle) {
            let _ = previous.stop();
        }
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("La pista ya había terminado: {:?}", e);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackSignal {
    Started,
    Ended,
    Errored,
}

/// Handler por pista: reenvía su ciclo de vida a la cola con el id de la canción
struct TrackNotifier {
    queue: Weak<GuildQueue>,
    track: Uuid,
    signal: TrackSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let queue = self.queue.upgrade()?;

        match self.signal {
            TrackSignal::Started => queue.dispatch(QueueEvent::TrackStarted(self.track)),
            TrackSignal::Ended => queue.dispatch(QueueEvent::TrackEnded(self.track)),
            TrackSignal::Errored => {
                let reason = match ctx {
                    EventContext::Track(tracks) => tracks
                        .first()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                queue.dispatch(QueueEvent::TrackErrored {
                    track: self.track,
                    reason,
                });
                // Una pista con error no vuelve a sonar
                queue.dispatch(QueueEvent::TrackEnded(self.track));
            }
        }

        None
    }
}

/// Handler global de la llamada: estado de la conexión
#[derive(Clone)]
struct ConnectionNotifier {
    guild_id: GuildId,
    queue: Weak<GuildQueue>,
}

#[async_trait]
impl VoiceEventHandler for ConnectionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let queue = self.queue.upgrade()?;

        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                info!("🔄 Driver de voz conectado en guild {}", self.guild_id);
                queue.dispatch(QueueEvent::Transport(TransportState::Ready));
            }
            EventContext::DriverDisconnect(data) => {
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?} {:?}",
                    self.guild_id, data.kind, data.reason
                );
                let cause = disconnect_cause(&data.kind, data.reason.as_ref());
                queue.dispatch(QueueEvent::Transport(TransportState::Disconnected(cause)));
            }
            _ => {}
        }

        None
    }
}

fn disconnect_cause(kind: &DisconnectKind, reason: Option<&DisconnectReason>) -> DisconnectCause {
    match (kind, reason) {
        (DisconnectKind::Runtime, Some(DisconnectReason::WsClosed(Some(CloseCode::Disconnected)))) => {
            DisconnectCause::WebSocketClose(Some(CLOSE_CODE_DISCONNECTED))
        }
        (_, Some(DisconnectReason::WsClosed(_))) => DisconnectCause::WebSocketClose(None),
        _ => DisconnectCause::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_close_code_maps_to_move_or_kick() {
        assert_eq!(
            disconnect_cause(
                &DisconnectKind::Runtime,
                Some(&DisconnectReason::WsClosed(Some(CloseCode::Disconnected)))
            ),
            DisconnectCause::WebSocketClose(Some(CLOSE_CODE_DISCONNECTED))
        );
    }

    #[test]
    fn test_other_disconnects() {
        assert_eq!(
            disconnect_cause(
                &DisconnectKind::Runtime,
                Some(&DisconnectReason::WsClosed(Some(CloseCode::SessionTimeout)))
            ),
            DisconnectCause::WebSocketClose(None)
        );
        assert_eq!(
            disconnect_cause(&DisconnectKind::Reconnect, Some(&DisconnectReason::TimedOut)),
            DisconnectCause::Other
        );
        assert_eq!(disconnect_cause(&DisconnectKind::Connect, None), DisconnectCause::Other);
    }
}
