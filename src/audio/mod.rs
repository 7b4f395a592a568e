//! # Audio Module
//!
//! Motor de reproducción por guild.
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild Queue
//! - Máquina de estados explícita: transporte (`signalling`, `connecting`,
//!   `ready`, `disconnected`, `destroyed`) × reproductor (`idle`, `buffering`,
//!   `playing`), con un único despachador [`queue::GuildQueue::dispatch`]
//! - Avance de cola single-flight con salto de canciones que fallan
//! - Reconexión con backoff lineal (5s × intento, máximo 5 intentos)
//!
//! ### [`track`] - Track entity
//! - Metadata inmutable e id único asignado al construir
//! - Audio preparado bajo demanda y cacheado (no calculado / listo / falló)
//!
//! ### [`registry`] - Queue Registry
//! - Una cola por guild; la cola se saca sola al destruirse
//!
//! ### [`voice`] - Adaptador songbird
//! - Implementa [`queue::Transport`] y [`queue::AudioOutput`] y traduce los
//!   eventos del driver y de cada pista a [`queue::QueueEvent`]
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let voice = SongbirdVoice::new(manager, guild_id, channel_id, reqwest::Client::new());
//! let queue = registry.get_or_create(guild_id, || {
//!     let queue = GuildQueue::new(guild_id, info, voice.clone(), voice.clone(), announcer);
//!     voice.attach(&queue);
//!     queue
//! });
//!
//! voice.join().await?;
//! queue.wait_until_ready(READY_TIMEOUT).await?;
//! queue.enqueue(track, EnqueueOptions::default()).await?;
//! ```

pub mod enqueue;
pub mod queue;
pub mod registry;
pub mod shuffle;
pub mod track;
pub mod voice;
