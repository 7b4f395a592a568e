//! # Bot Module
//!
//! Discord front end for Sputnik.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command handling and replies ([`handlers`])
//! - DJ role checks ([`roles`])
//! - Status messages posted by each guild queue ([`announcer`])
//!
//! ## Architecture
//!
//! [`SputnikBot`] implements Serenity's [`EventHandler`] trait. It owns the
//! [`QueueRegistry`] that maps every guild to its [`GuildQueue`] and hands it
//! to the command handlers; it never plays audio itself.
//!
//! [`GuildQueue`]: crate::audio::queue::GuildQueue

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;
pub mod roles;

use crate::{
    audio::{
        enqueue::Catalog,
        queue::{QueueEvent, TransportState},
        registry::QueueRegistry,
    },
    config::Config,
    sources::TrackResolver,
};

/// Main Discord event handler.
///
/// Cheap to share: every field is either immutable or internally synchronized.
pub struct SputnikBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// One queue per guild, shared with the status API
    registry: QueueRegistry,
    /// Turns `/play` queries into track descriptors
    resolver: Arc<dyn TrackResolver>,
    /// Completes descriptors and probes their audio
    catalog: Catalog,
    /// HTTP client used to stream audio into songbird
    http_client: reqwest::Client,
}

impl SputnikBot {
    pub fn new(
        config: Config,
        registry: QueueRegistry,
        resolver: Arc<dyn TrackResolver>,
        catalog: Catalog,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            resolver,
            catalog,
            http_client: reqwest::Client::new(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate almost immediately;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for SputnikBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Only slash commands are handled; errors are logged and never reach other guilds.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Reports bot moves between voice channels to the guild queue.
    ///
    /// A move arrives from the voice gateway as a disconnect with close code
    /// 4014; telling the queue it is `connecting` lets it keep the session.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(queue) = self.registry.get(guild_id) else {
            return;
        };

        let previous = old.and_then(|state| state.channel_id);
        match (previous, new.channel_id) {
            (Some(from), Some(to)) if from != to => {
                info!("🔀 Bot movido de {} a {} en guild {}", from, to, guild_id);
                queue.dispatch(QueueEvent::Transport(TransportState::Connecting));
            }
            (_, None) => {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            }
            _ => debug!("Estado de voz actualizado en guild {}", guild_id),
        }
    }
}
