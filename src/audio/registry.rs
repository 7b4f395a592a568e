use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use super::queue::GuildQueue;

/// Mapa guild → cola activa. Como mucho una cola por guild.
///
/// Las colas se sacan solas del registro cuando se destruyen; si ya fueron
/// reemplazadas por una nueva, la entrada nueva no se toca.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    queues: Arc<DashMap<GuildId, Arc<GuildQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildQueue>> {
        self.queues.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Devuelve la cola viva de la guild o registra la que construye `create`.
    ///
    /// Todo ocurre con la entrada bloqueada: dos pedidos simultáneos para la
    /// misma guild obtienen la misma cola y `create` corre una sola vez.
    /// `create` no debe tocar el registro.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        create: impl FnOnce() -> Arc<GuildQueue>,
    ) -> Arc<GuildQueue> {
        match self.queues.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_destroyed() => Arc::clone(entry.get()),
            Entry::Occupied(mut entry) => {
                debug!("Reemplazando la cola destruida de guild {}", guild_id);
                let queue = self.register(create());
                entry.insert(Arc::clone(&queue));
                queue
            }
            Entry::Vacant(entry) => {
                let queue = self.register(create());
                entry.insert(Arc::clone(&queue));
                queue
            }
        }
    }

    /// Engancha la remoción de la cola al destruirse.
    fn register(&self, queue: Arc<GuildQueue>) -> Arc<GuildQueue> {
        let guild_id = queue.guild_id();
        let queues = Arc::clone(&self.queues);
        let registered = Arc::downgrade(&queue);

        queue.set_on_destroyed(move || {
            let removed = queues.remove_if(&guild_id, |_, current| {
                std::ptr::eq(Arc::as_ptr(current), registered.as_ptr())
            });
            if removed.is_some() {
                debug!("Cola de guild {} eliminada del registro", guild_id);
            }
        });

        info!("📋 Cola registrada para guild {}", guild_id);
        queue
    }
}
