use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    shuffle::shuffle,
    track::{AudioHandle, Track, TrackMetadata, TrackSummary},
};
use crate::error::MusicError;

/// Límite para que la conexión llegue a `Ready` tras entrar en signalling/connecting.
pub const READY_TIMEOUT: Duration = Duration::from_secs(20);
/// Margen para distinguir "movido de canal" de "expulsado" tras un cierre 4014.
pub const MOVE_GRACE: Duration = Duration::from_secs(5);
/// Espera base entre reintentos; el intento `n` espera `n * REJOIN_BACKOFF`.
pub const REJOIN_BACKOFF: Duration = Duration::from_secs(5);
pub const MAX_REJOIN_ATTEMPTS: u32 = 5;

/// Código de cierre del gateway de voz para "desconectado" (movido o expulsado).
pub const CLOSE_CODE_DISCONNECTED: u16 = 4014;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    WebSocketClose(Option<u16>),
    Other,
}

impl DisconnectCause {
    fn is_move_or_kick(&self) -> bool {
        matches!(self, DisconnectCause::WebSocketClose(Some(CLOSE_CODE_DISCONNECTED)))
    }
}

/// Estado de la conexión de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Signalling,
    Connecting,
    Ready,
    Disconnected(DisconnectCause),
    Destroyed,
}

/// Estado del reproductor de audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    Idle,
    Buffering,
    Playing,
}

/// Señales asíncronas que mueven la máquina de estados.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Transport(TransportState),
    TrackStarted(Uuid),
    TrackEnded(Uuid),
    TrackErrored { track: Uuid, reason: String },
}

/// Notificaciones publicadas para el front end y la superficie de estado.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueNotification {
    Next(Uuid),
    Queued(TrackSummary),
    Popped(TrackSummary),
    Clear,
}

/// Datos de la guild capturados al crear la cola; no se refrescan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuildInfo {
    pub name: String,
    pub icon: Option<String>,
    pub acronym: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Mensajes de estado que la cola publica en los canales de texto.
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    NowPlaying {
        url: String,
        metadata: TrackMetadata,
        queued_by: Option<UserId>,
    },
    Warning(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// No dispara el avance; se usa al encolar varias canciones seguidas.
    pub wait: bool,
    /// Pasa al frente de la cola y corta la canción actual.
    pub priority: bool,
}

/// Resultado de deshacer la última canción de la cola.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    Empty,
    /// La última canción no cumple la condición y sigue en la cola.
    Kept(TrackSummary),
    Popped(TrackSummary),
}

/// Vista de solo lectura de una cola.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub status: PlayerStatus,
    pub current: Option<TrackSummary>,
    pub queue: Vec<TrackSummary>,
}

/// Órdenes sobre la conexión de voz. Los cambios de estado llegan como eventos.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn rejoin(&self) -> Result<(), MusicError>;
    async fn destroy(&self);
}

/// Salida de audio: acepta un recurso a la vez.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, track: Arc<Track>, audio: AudioHandle) -> Result<(), MusicError>;
    async fn stop(&self);
}

/// Publica y borra mensajes de estado en los canales de texto.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn post(&self, channel: ChannelId, announcement: Announcement) -> anyhow::Result<MessageRef>;
    async fn delete(&self, message: MessageRef) -> anyhow::Result<()>;
}

struct QueueState {
    pending: VecDeque<Arc<Track>>,
    player: PlayerStatus,
    current: Option<Arc<Track>>,
    advancing: bool,
    awaiting_ready: bool,
    rejoin_attempts: u32,
    last_message: Option<MessageRef>,
    last_channel: Option<ChannelId>,
    // Se incrementa en cada stop() para descartar avances que estaban en vuelo
    epoch: u64,
    torn_down: bool,
}

type DestroyHook = Box<dyn FnOnce() + Send>;

/// Sesión de reproducción de una guild.
///
/// Es dueña exclusiva de la conexión de voz y del reproductor. Todas las
/// transiciones pasan por [`GuildQueue::dispatch`]; como mucho un avance está
/// en curso a la vez y la canción actual nunca está en la lista pendiente.
pub struct GuildQueue {
    guild_id: GuildId,
    info: GuildInfo,
    transport: Arc<dyn Transport>,
    output: Arc<dyn AudioOutput>,
    announcer: Arc<dyn Announcer>,
    state: Mutex<QueueState>,
    transport_state: watch::Sender<TransportState>,
    notifications: broadcast::Sender<QueueNotification>,
    on_destroyed: Mutex<Option<DestroyHook>>,
}

impl GuildQueue {
    pub fn new(
        guild_id: GuildId,
        info: GuildInfo,
        transport: Arc<dyn Transport>,
        output: Arc<dyn AudioOutput>,
        announcer: Arc<dyn Announcer>,
    ) -> Arc<Self> {
        let (transport_state, _) = watch::channel(TransportState::Signalling);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Arc::new(Self {
            guild_id,
            info,
            transport,
            output,
            announcer,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                player: PlayerStatus::Idle,
                current: None,
                advancing: false,
                awaiting_ready: false,
                rejoin_attempts: 0,
                last_message: None,
                last_channel: None,
                epoch: 0,
                torn_down: false,
            }),
            transport_state,
            notifications,
            on_destroyed: Mutex::new(None),
        })
    }

    /// Registra la acción a ejecutar cuando la cola se destruye (p. ej. sacarla del registro).
    pub fn set_on_destroyed(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_destroyed.lock() = Some(Box::new(hook));
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn info(&self) -> &GuildInfo {
        &self.info
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.lock().player
    }

    pub fn current(&self) -> Option<Arc<Track>> {
        self.state.lock().current.clone()
    }

    pub fn pending(&self) -> Vec<Arc<Track>> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn transport_state(&self) -> TransportState {
        *self.transport_state.borrow()
    }

    pub fn is_destroyed(&self) -> bool {
        self.transport_state() == TransportState::Destroyed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueNotification> {
        self.notifications.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let st = self.state.lock();
        QueueSnapshot {
            status: st.player,
            current: st.current.as_ref().map(|track| track.summary()),
            queue: st.pending.iter().map(|track| track.summary()).collect(),
        }
    }

    /// Único punto de entrada para las señales del transporte y del reproductor.
    pub fn dispatch(self: &Arc<Self>, event: QueueEvent) {
        match event {
            QueueEvent::Transport(state) => self.on_transport(state),
            QueueEvent::TrackStarted(id) => {
                if self.is_current(id) {
                    self.transition_player(PlayerStatus::Playing);
                } else {
                    debug!("Ignorando inicio obsoleto de {} en guild {}", id, self.guild_id);
                }
            }
            QueueEvent::TrackEnded(id) => {
                if self.is_current(id) {
                    self.transition_player(PlayerStatus::Idle);
                } else {
                    debug!("Ignorando fin obsoleto de {} en guild {}", id, self.guild_id);
                }
            }
            QueueEvent::TrackErrored { track, reason } => {
                // El error solo avisa; el avance llega con la transición a idle
                let failed = self.current().filter(|current| current.id() == track);
                if let Some(failed) = failed {
                    error!("❌ Error reproduciendo {}: {}", failed.display_title(), reason);
                    self.announce(
                        None,
                        Announcement::Warning(format!("Error Playing {}", failed.display_title())),
                        false,
                    );
                }
            }
        }
    }

    /// Agrega una canción. Con `priority` va al frente y corta la actual.
    ///
    /// Una cola ya destruida no acepta más canciones.
    pub async fn enqueue(
        self: &Arc<Self>,
        track: Arc<Track>,
        options: EnqueueOptions,
    ) -> Result<(), MusicError> {
        let summary = track.summary();
        let active = {
            let mut st = self.state.lock();
            if st.torn_down || self.is_destroyed() {
                debug!("Guild {} destruida, rechazando {}", self.guild_id, summary.title);
                return Err(MusicError::NoActiveSession);
            }
            if options.priority {
                st.pending.push_front(track);
            } else {
                st.pending.push_back(track);
            }
            st.player != PlayerStatus::Idle
        };

        info!("➕ Agregado a la cola de {}: {}", self.guild_id, summary.title);
        self.notify(QueueNotification::Queued(summary));

        if options.priority {
            if active {
                self.output.stop().await;
            }
            self.trigger_advance();
        } else if !options.wait {
            self.trigger_advance();
        }
        Ok(())
    }

    /// Quita la última canción agregada (deshacer) si cumple `accept`.
    ///
    /// La condición se evalúa con la cola bloqueada, así que la canción
    /// revisada es la misma que se quita.
    pub fn pop_queue_if(&self, accept: impl FnOnce(&Track) -> bool) -> PopOutcome {
        let popped = {
            let mut st = self.state.lock();
            let Some(last) = st.pending.back() else {
                return PopOutcome::Empty;
            };
            if !accept(last) {
                return PopOutcome::Kept(last.summary());
            }
            st.pending.pop_back()
        };
        let Some(popped) = popped else {
            return PopOutcome::Empty;
        };

        let summary = popped.summary();
        info!("↩️ Deshecho en guild {}: {}", self.guild_id, summary.title);
        self.notify(QueueNotification::Popped(summary.clone()));
        PopOutcome::Popped(summary)
    }

    /// Vacía la cola y corta la reproducción.
    pub async fn stop(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            st.pending.clear();
            st.epoch += 1;
        }
        self.output.stop().await;
        self.transition_player(PlayerStatus::Idle);
        info!("🗑️ Cola limpiada en guild {}", self.guild_id);
        self.notify(QueueNotification::Clear);
    }

    /// Arranca la reproducción después de encolar varias canciones con `wait`.
    pub fn start(self: &Arc<Self>) {
        let should_start = {
            let st = self.state.lock();
            st.player == PlayerStatus::Idle && !st.pending.is_empty() && !st.advancing
        };
        if should_start {
            self.trigger_advance();
        }
    }

    /// Corta la canción actual; el avance normal elige la siguiente.
    pub async fn skip(self: &Arc<Self>) -> Option<Arc<Track>> {
        let current = {
            let st = self.state.lock();
            if st.player == PlayerStatus::Idle {
                return None;
            }
            st.current.clone()
        };
        self.output.stop().await;
        if let Some(track) = &current {
            info!("⏭️ Saltando {} en guild {}", track.display_title(), self.guild_id);
        }
        current
    }

    pub fn shuffle(&self) {
        let mut st = self.state.lock();
        if st.pending.is_empty() {
            return;
        }
        let items: Vec<_> = st.pending.iter().cloned().collect();
        st.pending = shuffle(&items).into();
        info!("🔀 Cola mezclada en guild {}", self.guild_id);
    }

    /// Quita todas las canciones pendientes de un usuario, conservando el orden del resto.
    pub fn purge_from(&self, user_id: UserId) -> usize {
        let mut st = self.state.lock();
        let before = st.pending.len();
        st.pending.retain(|track| track.queued_by() != Some(user_id));
        let removed = before - st.pending.len();
        if removed > 0 {
            info!("🗑️ Eliminadas {} canciones de {} en guild {}", removed, user_id, self.guild_id);
        }
        removed
    }

    /// Espera a que la conexión esté lista (camino de comandos).
    ///
    /// Si la sesión se destruye mientras tanto devuelve
    /// [`MusicError::TransportFatal`]; si se acaba el tiempo,
    /// [`MusicError::TransportUnready`].
    pub async fn wait_until_ready(&self, limit: Duration) -> Result<(), MusicError> {
        let settled = self
            .wait_for_transport(limit, |state| {
                matches!(state, TransportState::Ready | TransportState::Destroyed)
            })
            .await;

        match (settled, self.transport_state()) {
            (true, TransportState::Ready) => Ok(()),
            (_, TransportState::Destroyed) => Err(MusicError::TransportFatal),
            _ => Err(MusicError::TransportUnready),
        }
    }

    /// Sale del canal de voz a pedido del usuario.
    pub async fn leave(self: &Arc<Self>) {
        info!("👋 Saliendo del canal de voz en guild {}", self.guild_id);
        self.destroy().await;
    }

    /// Destruye la conexión y desmonta la cola. Idempotente.
    pub async fn destroy(self: &Arc<Self>) {
        let mut already = false;
        self.transport_state.send_if_modified(|state| {
            if *state == TransportState::Destroyed {
                already = true;
                false
            } else {
                *state = TransportState::Destroyed;
                true
            }
        });
        if already {
            return;
        }

        info!("💥 Destruyendo conexión de voz en guild {}", self.guild_id);
        self.transport.destroy().await;
        self.teardown().await;
    }

    fn on_transport(self: &Arc<Self>, new: TransportState) {
        let mut previous = None;
        self.transport_state.send_if_modified(|state| {
            if *state == TransportState::Destroyed {
                return false;
            }
            previous = Some(*state);
            *state = new;
            true
        });
        let Some(old) = previous else {
            debug!("Guild {} ya destruida, ignorando {:?}", self.guild_id, new);
            return;
        };
        debug!("🔌 Transporte {:?} -> {:?} en guild {}", old, new, self.guild_id);

        match new {
            TransportState::Disconnected(cause) => {
                tokio::spawn(Arc::clone(self).handle_disconnect(cause));
            }
            TransportState::Destroyed => {
                let queue = Arc::clone(self);
                tokio::spawn(async move { queue.teardown().await });
            }
            TransportState::Signalling | TransportState::Connecting => {
                let start_watchdog = {
                    let mut st = self.state.lock();
                    !std::mem::replace(&mut st.awaiting_ready, true)
                };
                if start_watchdog {
                    tokio::spawn(Arc::clone(self).watch_readiness());
                }
            }
            TransportState::Ready => {
                self.state.lock().rejoin_attempts = 0;
                info!("✅ Conexión de voz lista en guild {}", self.guild_id);
            }
        }
    }

    async fn handle_disconnect(self: Arc<Self>, cause: DisconnectCause) {
        if cause.is_move_or_kick() {
            // Movido de canal o expulsado: si no vuelve a conectar pronto, fue expulsado
            let recovered = self
                .wait_for_transport(MOVE_GRACE, |state| {
                    matches!(
                        state,
                        TransportState::Connecting | TransportState::Ready | TransportState::Destroyed
                    )
                })
                .await;
            if !recovered {
                warn!("🚪 Expulsado del canal de voz en guild {}", self.guild_id);
                self.destroy().await;
            }
            return;
        }

        let attempts = self.state.lock().rejoin_attempts;
        if attempts >= MAX_REJOIN_ATTEMPTS {
            error!(
                "❌ Reintentos agotados ({}) en guild {}, destruyendo",
                attempts, self.guild_id
            );
            self.destroy().await;
            return;
        }

        let delay = REJOIN_BACKOFF * (attempts + 1);
        info!(
            "🔄 Reconectando en {:?} (intento {}) en guild {}",
            delay,
            attempts + 1,
            self.guild_id
        );
        tokio::time::sleep(delay).await;

        if self.is_destroyed() {
            return;
        }
        self.state.lock().rejoin_attempts += 1;
        self.on_transport(TransportState::Signalling);
        if let Err(e) = self.transport.rejoin().await {
            warn!("Error al reconectar en guild {}: {}", self.guild_id, e);
        }
    }

    async fn watch_readiness(self: Arc<Self>) {
        let settled = self
            .wait_for_transport(READY_TIMEOUT, |state| {
                matches!(state, TransportState::Ready | TransportState::Destroyed)
            })
            .await;

        if !settled && !self.is_destroyed() {
            warn!(
                "⏰ La conexión no estuvo lista en {:?} en guild {}",
                READY_TIMEOUT, self.guild_id
            );
            self.destroy().await;
        }
        self.state.lock().awaiting_ready = false;
    }

    async fn teardown(&self) {
        let first = {
            let mut st = self.state.lock();
            !std::mem::replace(&mut st.torn_down, true)
        };
        if !first {
            return;
        }

        {
            let mut st = self.state.lock();
            st.pending.clear();
            st.epoch += 1;
        }
        self.output.stop().await;

        let (stale_message, was_active) = {
            let mut st = self.state.lock();
            let was_active = st.player != PlayerStatus::Idle;
            st.player = PlayerStatus::Idle;
            st.current = None;
            (st.last_message.take(), was_active)
        };
        if was_active {
            if let Some(message) = stale_message {
                self.spawn_delete(message);
            }
        }
        self.notify(QueueNotification::Clear);

        info!("👋 Cola de guild {} desmontada", self.guild_id);
        let hook = self.on_destroyed.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn transition_player(self: &Arc<Self>, new: PlayerStatus) {
        let (old, current, stale_message) = {
            let mut st = self.state.lock();
            let old = st.player;
            st.player = new;
            let stale_message = if new == PlayerStatus::Idle && old != PlayerStatus::Idle {
                st.current = None;
                st.last_message.take()
            } else {
                None
            };
            (old, st.current.clone(), stale_message)
        };

        match new {
            PlayerStatus::Idle if old != PlayerStatus::Idle => {
                // Terminó (o falló) una canción: borrar el "now playing" y avanzar
                match stale_message {
                    Some(message) => self.spawn_delete(message),
                    None => debug!("Sin mensaje previo que borrar en guild {}", self.guild_id),
                }
                self.trigger_advance();
            }
            PlayerStatus::Playing if old != PlayerStatus::Playing => {
                if let Some(track) = current {
                    info!("▶️ Reproduciendo {} en guild {}", track.display_title(), self.guild_id);
                    self.notify(QueueNotification::Next(track.id()));
                    self.announce(
                        track.channel_id(),
                        Announcement::NowPlaying {
                            url: track.url().to_string(),
                            metadata: track.metadata().clone(),
                            queued_by: track.queued_by(),
                        },
                        true,
                    );
                }
            }
            _ => {}
        }
    }

    fn trigger_advance(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).process_queue());
    }

    /// Ciclo de avance: toma la cabeza de la cola y la entrega al reproductor.
    /// Las canciones que fallan se saltan sin frenar la cola.
    async fn process_queue(self: Arc<Self>) {
        loop {
            let (track, epoch) = {
                let mut st = self.state.lock();
                if st.advancing || st.player != PlayerStatus::Idle || st.torn_down {
                    return;
                }
                let Some(track) = st.pending.pop_front() else {
                    return;
                };
                st.advancing = true;
                (track, st.epoch)
            };

            debug!(
                "➡️ Siguiente en cola (FIFO): {} (esperó {}s)",
                track.display_title(),
                (Utc::now() - track.queued_at()).num_seconds()
            );

            let audio = match track.materialize_audio().await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("⏭️ Saltando {}: {}", track.display_title(), e);
                    self.announce_failure(&track);
                    self.state.lock().advancing = false;
                    continue;
                }
            };

            let discarded = {
                let mut st = self.state.lock();
                if st.epoch != epoch || st.torn_down {
                    st.advancing = false;
                    true
                } else {
                    st.player = PlayerStatus::Buffering;
                    st.current = Some(Arc::clone(&track));
                    false
                }
            };
            if discarded {
                debug!("Cola limpiada durante la carga, descartando {}", track.display_title());
                continue;
            }

            let played = self.output.play(Arc::clone(&track), audio).await;
            let stale = {
                let mut st = self.state.lock();
                st.advancing = false;
                let stale = st.epoch != epoch || st.torn_down;
                let is_track = st.current.as_ref().map(|current| current.id()) == Some(track.id());
                if (stale || played.is_err()) && is_track {
                    st.player = PlayerStatus::Idle;
                    st.current = None;
                }
                stale
            };

            match played {
                Ok(()) if stale => {
                    // stop() llegó mientras el reproductor recibía la pista
                    debug!("Cola limpiada durante la entrega, parando {}", track.display_title());
                    self.output.stop().await;
                }
                Ok(()) => return,
                Err(e) => {
                    warn!("❌ El reproductor rechazó {}: {}", track.display_title(), e);
                    self.announce_failure(&track);
                }
            }
        }
    }

    fn announce_failure(self: &Arc<Self>, track: &Track) {
        self.announce(
            track.channel_id(),
            Announcement::Warning(format!("Error Playing {}", track.display_title())),
            false,
        );
    }

    /// Publica un mensaje sin bloquear al llamador; los fallos solo se registran.
    fn announce(self: &Arc<Self>, channel: Option<ChannelId>, announcement: Announcement, remember: bool) {
        let channel = {
            let mut st = self.state.lock();
            match channel {
                Some(channel) => {
                    st.last_channel = Some(channel);
                    Some(channel)
                }
                None => st.last_channel,
            }
        };
        let Some(channel) = channel else {
            debug!("Sin canal para publicar en guild {}", self.guild_id);
            return;
        };

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            match queue.announcer.post(channel, announcement).await {
                Ok(message) => {
                    if remember {
                        queue.state.lock().last_message = Some(message);
                    }
                }
                Err(e) => warn!("Error al publicar en el canal {}: {:?}", channel, e),
            }
        });
    }

    fn spawn_delete(&self, message: MessageRef) {
        let announcer = Arc::clone(&self.announcer);
        tokio::spawn(async move {
            if let Err(e) = announcer.delete(message).await {
                warn!("Error al borrar mensaje {}: {:?}", message.message_id, e);
            }
        });
    }

    fn notify(&self, notification: QueueNotification) {
        // Sin suscriptores no es un error
        let _ = self.notifications.send(notification);
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.state.lock().current.as_ref().map(|track| track.id()) == Some(id)
    }

    async fn wait_for_transport(
        &self,
        limit: Duration,
        mut accept: impl FnMut(&TransportState) -> bool + Send,
    ) -> bool {
        let mut rx = self.transport_state.subscribe();
        let accepted = matches!(
            tokio::time::timeout(limit, rx.wait_for(|state| accept(state))).await,
            Ok(Ok(_))
        );
        accepted
    }

    #[cfg(test)]
    pub(crate) fn rejoin_attempts(&self) -> u32 {
        self.state.lock().rejoin_attempts
    }

    #[cfg(test)]
    pub(crate) fn set_rejoin_attempts(&self, attempts: u32) {
        self.state.lock().rejoin_attempts = attempts;
    }

    #[cfg(test)]
    pub(crate) fn awaiting_ready(&self) -> bool {
        self.state.lock().awaiting_ready
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use tokio::time::{sleep, timeout, Instant};

    const SHORT: Duration = Duration::from_millis(10);

    async fn next_play(h: &mut Harness) -> Uuid {
        timeout(Duration::from_secs(1), h.plays.recv())
            .await
            .expect("no llegó ninguna reproducción")
            .expect("canal cerrado")
    }

    /// Simula que la pista actual arranca y termina.
    async fn finish_current(h: &Harness, id: Uuid) {
        h.queue.dispatch(QueueEvent::TrackStarted(id));
        h.queue.dispatch(QueueEvent::TrackEnded(id));
        sleep(SHORT).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_in_fifo_order() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let tracks: Vec<_> = (0..4)
            .map(|i| track(&format!("yt:{i}"), &format!("Song {i}"), 100, 5, &probe))
            .collect();

        for track in &tracks {
            h.queue.enqueue(track.clone(), EnqueueOptions::default()).await.unwrap();
        }

        for track in &tracks {
            let played = next_play(&mut h).await;
            assert_eq!(played, track.id());
            finish_current(&h, played).await;
        }
        assert!(h.queue.pending().is_empty());
        assert_eq!(h.queue.status(), PlayerStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_current_and_pending() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:abc", "Song A", 180, 5, &probe);
        let b = track("yt:def", "Song B", 200, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();

        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));

        let snapshot = h.queue.snapshot();
        assert_eq!(snapshot.status, PlayerStatus::Playing);
        assert_eq!(snapshot.current.as_ref().map(|c| c.title.as_str()), Some("Song A"));
        assert_eq!(snapshot.queue.len(), 1);
        assert_eq!(snapshot.queue[0].title, "Song B");
        assert_eq!(snapshot.queue[0].duration, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_triggers_dispatch_once() {
        let mut h = harness();
        let probe = probe(&[], Duration::from_millis(200));
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        sleep(SHORT).await;
        // A se está cargando: este enqueue vuelve a disparar el avance
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.start();

        assert_eq!(next_play(&mut h).await, a.id());
        sleep(Duration::from_secs(2)).await;
        assert!(h.plays.try_recv().is_err());
        assert_eq!(h.queue.pending().len(), 1);
        assert_eq!(h.queue.status(), PlayerStatus::Buffering);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_track_is_skipped_with_warning() {
        let mut h = harness();
        let probe = probe(&["yt:broken"], SHORT);
        let a = track("yt:broken", "Song A", 100, 5, &probe);
        let b = track("yt:fine", "Song B", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        h.queue.start();

        assert_eq!(next_play(&mut h).await, b.id());

        let (channel, announcement) = timeout(Duration::from_secs(1), h.posts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel, ChannelId::new(77));
        assert_eq!(announcement, Announcement::Warning("Error Playing Song A".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_queue_on_empty_list() {
        let h = harness();
        let mut notifications = h.queue.subscribe();

        assert_eq!(h.queue.pop_queue_if(|_| true), PopOutcome::Empty);
        assert!(h.queue.pending().is_empty());
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_queue_removes_most_recent() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);
        let c = track("yt:c", "C", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(c.clone(), EnqueueOptions::default()).await.unwrap();

        let PopOutcome::Popped(popped) = h.queue.pop_queue_if(|_| true) else {
            panic!("se esperaba quitar C");
        };
        assert_eq!(popped.title, "C");
        let pending: Vec<_> = h.queue.pending().iter().map(|t| t.id()).collect();
        assert_eq!(pending, vec![b.id()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_queue_if_checks_the_track_it_removes() {
        let h = harness();
        let probe = probe(&[], SHORT);
        let mine = track("yt:mine", "Mine", 100, 5, &probe);
        let theirs = track("yt:theirs", "Theirs", 100, 6, &probe);
        let mut notifications = h.queue.subscribe();

        h.queue.enqueue(mine.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        h.queue.enqueue(theirs.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        while notifications.try_recv().is_ok() {}

        let is_mine = |last: &Track| last.queued_by() == Some(UserId::new(5));
        let PopOutcome::Kept(kept) = h.queue.pop_queue_if(is_mine) else {
            panic!("la última canción no es del usuario");
        };
        assert_eq!(kept.title, "Theirs");
        assert_eq!(h.queue.pending().len(), 2);
        assert!(notifications.try_recv().is_err());

        h.queue.pop_queue_if(|_| true);
        let PopOutcome::Popped(popped) = h.queue.pop_queue_if(is_mine) else {
            panic!("se esperaba quitar la canción propia");
        };
        assert_eq!(popped.id, mine.id());
        assert!(h.queue.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_and_idles() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);
        let mut notifications = h.queue.subscribe();

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));

        h.queue.stop().await;
        sleep(Duration::from_secs(1)).await;

        assert!(h.queue.pending().is_empty());
        assert_eq!(h.queue.status(), PlayerStatus::Idle);
        assert!(h.queue.current().is_none());
        assert!(h.plays.try_recv().is_err());

        let mut saw_clear = false;
        while let Ok(notification) = notifications.try_recv() {
            saw_clear |= notification == QueueNotification::Clear;
        }
        assert!(saw_clear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_from_keeps_order() {
        let h = harness();
        let probe = probe(&[], SHORT);
        let u1 = track("yt:1", "U1", 100, 10, &probe);
        let v = track("yt:2", "V", 100, 20, &probe);
        let u2 = track("yt:3", "U2", 100, 10, &probe);
        for t in [&u1, &v, &u2] {
            h.queue.enqueue(t.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        }

        assert_eq!(h.queue.purge_from(UserId::new(10)), 2);
        let pending = h.queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].queued_by(), Some(UserId::new(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffle_keeps_same_tracks() {
        let h = harness();
        let probe = probe(&[], SHORT);
        let tracks: Vec<_> = (0..8)
            .map(|i| track(&format!("yt:{i}"), &format!("{i}"), 100, 5, &probe))
            .collect();
        for t in &tracks {
            h.queue.enqueue(t.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        }

        h.queue.shuffle();

        let mut before: Vec<_> = tracks.iter().map(|t| t.id()).collect();
        let mut after: Vec<_> = h.queue.pending().iter().map(|t| t.id()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_kicks_off_waited_tracks() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions { wait: true, priority: false }).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert!(h.plays.try_recv().is_err());

        h.queue.start();
        assert_eq!(next_play(&mut h).await, a.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_preempts_current_track() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);
        let p = track("yt:p", "P", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));

        h.queue.enqueue(p.clone(), EnqueueOptions { wait: false, priority: true }).await.unwrap();

        assert_eq!(next_play(&mut h).await, p.id());
        assert_eq!(h.voice.stops.load(Ordering::SeqCst), 1);
        let pending: Vec<_> = h.queue.pending().iter().map(|t| t.id()).collect();
        assert_eq!(pending, vec![b.id()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_advances_to_next() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);

        assert!(h.queue.skip().await.is_none());

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));

        let skipped = h.queue.skip().await.unwrap();
        assert_eq!(skipped.id(), a.id());
        assert_eq!(next_play(&mut h).await, b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_playing_posted_and_deleted() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let mut notifications = h.queue.subscribe();

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));

        let (channel, announcement) = timeout(Duration::from_secs(1), h.posts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel, ChannelId::new(77));
        assert!(matches!(announcement, Announcement::NowPlaying { .. }));

        assert!(matches!(notifications.recv().await, Ok(QueueNotification::Queued(_))));
        assert_eq!(notifications.recv().await, Ok(QueueNotification::Next(a.id())));

        sleep(SHORT).await;
        h.queue.dispatch(QueueEvent::TrackEnded(a.id()));
        sleep(SHORT).await;
        assert_eq!(h.announcer.deleted.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_error_warns_without_advancing() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());
        h.queue.dispatch(QueueEvent::TrackStarted(a.id()));
        let _now_playing = h.posts.recv().await;

        h.queue.dispatch(QueueEvent::TrackErrored {
            track: a.id(),
            reason: "decoder".to_string(),
        });
        let (_, warning) = timeout(Duration::from_secs(1), h.posts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(warning, Announcement::Warning("Error Playing A".to_string()));
        sleep(Duration::from_secs(1)).await;
        assert!(h.plays.try_recv().is_err());

        h.queue.dispatch(QueueEvent::TrackEnded(a.id()));
        assert_eq!(next_play(&mut h).await, b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_are_ignored() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());

        h.queue.dispatch(QueueEvent::TrackEnded(b.id()));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(h.queue.status(), PlayerStatus::Buffering);
        assert!(h.plays.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_backs_off_then_rejoins() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        h.queue.set_rejoin_attempts(2);

        let started = Instant::now();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Disconnected(
            DisconnectCause::WebSocketClose(Some(4006)),
        )));

        sleep(Duration::from_secs(14)).await;
        assert!(h.voice.rejoins.lock().is_empty());

        sleep(Duration::from_secs(2)).await;
        let rejoins = h.voice.rejoins.lock().clone();
        assert_eq!(rejoins.len(), 1);
        assert_eq!(rejoins[0] - started, Duration::from_secs(15));
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        assert_eq!(h.queue.rejoin_attempts(), 3);
        assert_eq!(h.queue.transport_state(), TransportState::Signalling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_exhausted_attempts_destroys() {
        let h = harness();
        let removed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = removed.clone();
        h.queue.set_on_destroyed(move || flag.store(true, Ordering::SeqCst));
        h.queue.set_rejoin_attempts(MAX_REJOIN_ATTEMPTS);

        h.queue.dispatch(QueueEvent::Transport(TransportState::Disconnected(DisconnectCause::Other)));
        sleep(SHORT).await;

        assert!(h.voice.destroyed.load(Ordering::SeqCst));
        assert!(h.voice.rejoins.lock().is_empty());
        assert!(h.queue.is_destroyed());
        assert!(removed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_destroys_after_grace() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        h.queue.dispatch(QueueEvent::Transport(TransportState::Disconnected(
            DisconnectCause::WebSocketClose(Some(CLOSE_CODE_DISCONNECTED)),
        )));

        sleep(Duration::from_secs(4)).await;
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        sleep(Duration::from_secs(2)).await;
        assert!(h.voice.destroyed.load(Ordering::SeqCst));
        assert!(h.voice.rejoins.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_move_recovers() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        h.queue.dispatch(QueueEvent::Transport(TransportState::Disconnected(
            DisconnectCause::WebSocketClose(Some(CLOSE_CODE_DISCONNECTED)),
        )));

        sleep(Duration::from_secs(2)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Connecting));
        sleep(Duration::from_secs(1)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));

        sleep(Duration::from_secs(30)).await;
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        assert_eq!(h.queue.transport_state(), TransportState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_watchdog_destroys_stuck_connection() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Connecting));

        sleep(Duration::from_secs(19)).await;
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        sleep(Duration::from_secs(2)).await;
        assert!(h.voice.destroyed.load(Ordering::SeqCst));
        assert!(h.queue.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_watchdog_satisfied_by_ready() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Signalling));
        sleep(Duration::from_secs(3)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Connecting));
        sleep(Duration::from_secs(3)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));

        sleep(Duration::from_secs(60)).await;
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        assert_eq!(h.queue.rejoin_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_event_tears_down() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);
        h.voice.end_on_stop.store(false, Ordering::SeqCst);
        let mut notifications = h.queue.subscribe();

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, a.id());

        h.queue.dispatch(QueueEvent::Transport(TransportState::Destroyed));
        sleep(SHORT).await;

        assert!(h.queue.pending().is_empty());
        assert_eq!(h.queue.status(), PlayerStatus::Idle);
        let mut saw_clear = false;
        while let Ok(notification) = notifications.try_recv() {
            saw_clear |= notification == QueueNotification::Clear;
        }
        assert!(saw_clear);

        // Después de destruida, nada la revive
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        assert_eq!(h.queue.transport_state(), TransportState::Destroyed);
        assert_eq!(
            h.queue.enqueue(b.clone(), EnqueueOptions::default()).await,
            Err(MusicError::NoActiveSession)
        );
        sleep(Duration::from_secs(1)).await;
        assert!(h.plays.try_recv().is_err());
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_player_installs_track() {
        let mut h = harness();
        let probe = probe(&[], SHORT);
        let a = track("yt:a", "A", 100, 5, &probe);
        let b = track("yt:b", "B", 100, 5, &probe);
        *h.voice.play_delay.lock() = Duration::from_millis(100);

        h.queue.enqueue(a.clone(), EnqueueOptions::default()).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(h.queue.status(), PlayerStatus::Buffering);

        h.queue.stop().await;
        // La pista llega al reproductor después de limpiar la cola
        assert_eq!(next_play(&mut h).await, a.id());
        sleep(SHORT).await;

        assert_eq!(h.queue.status(), PlayerStatus::Idle);
        assert!(h.queue.current().is_none());
        assert_eq!(h.voice.playing(), None);

        // El avance no quedó bloqueado
        *h.voice.play_delay.lock() = Duration::ZERO;
        h.queue.enqueue(b.clone(), EnqueueOptions::default()).await.unwrap();
        assert_eq!(next_play(&mut h).await, b.id());
        assert_eq!(h.voice.playing(), Some(b.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_connecting_shares_one_watchdog() {
        let h = harness();
        h.queue.dispatch(QueueEvent::Transport(TransportState::Signalling));
        h.queue.dispatch(QueueEvent::Transport(TransportState::Connecting));
        assert!(h.queue.awaiting_ready());

        sleep(Duration::from_secs(5)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        sleep(SHORT).await;
        assert!(!h.queue.awaiting_ready());

        // Un nuevo intento arranca su propio plazo de 20 s
        sleep(Duration::from_secs(5)).await;
        h.queue.dispatch(QueueEvent::Transport(TransportState::Connecting));
        assert!(h.queue.awaiting_ready());

        sleep(Duration::from_secs(19)).await;
        assert!(!h.voice.destroyed.load(Ordering::SeqCst));
        sleep(Duration::from_secs(2)).await;
        assert!(h.voice.destroyed.load(Ordering::SeqCst));
        assert!(!h.queue.awaiting_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_ready() {
        let h = harness();
        let queue = h.queue.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            queue.dispatch(QueueEvent::Transport(TransportState::Ready));
        });
        assert_eq!(h.queue.wait_until_ready(READY_TIMEOUT).await, Ok(()));

        let stuck = harness();
        assert_eq!(
            stuck.queue.wait_until_ready(Duration::from_secs(3)).await,
            Err(MusicError::TransportUnready)
        );

        let failed = harness();
        let queue = failed.queue.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            queue.destroy().await;
        });
        assert_eq!(
            failed.queue.wait_until_ready(READY_TIMEOUT).await,
            Err(MusicError::TransportFatal)
        );
    }
}
