use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{announcer::ChannelAnnouncer, commands, roles, SputnikBot};
use crate::{
    audio::{
        enqueue::{enqueue_resolution, EnqueueOutcome},
        queue::{GuildInfo, GuildQueue, PlayerStatus, PopOutcome, QueueNotification, READY_TIMEOUT},
        voice::SongbirdVoice,
    },
    error::MusicError,
    sources::Resolution,
    ui::{
        embeds::{self, ReplyStatus},
        format::name_acronym,
    },
};

const JOIN_FIRST: &str = "Join a voice channel and then try that again";
const JOIN_TIMEOUT: &str = "Failed to join voice channel within 20 seconds, please try again later!";
const COMING_SOON: &str = "```\nFunctionality coming soon!\n```";

/// Respuesta de un comando, antes de convertirse en mensaje de Discord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Embed { text: String, status: ReplyStatus },
    Text { content: String, ephemeral: bool },
}

impl Reply {
    pub fn log(text: impl Into<String>) -> Self {
        Reply::Embed {
            text: text.into(),
            status: ReplyStatus::Log,
        }
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Reply::Embed {
            text: text.into(),
            status: ReplyStatus::Warn,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Reply::Text {
            content: content.into(),
            ephemeral: false,
        }
    }

    fn message(self) -> CreateInteractionResponseMessage {
        match self {
            Reply::Embed { text, status } => {
                CreateInteractionResponseMessage::new().embed(embeds::create_reply(text, status))
            }
            Reply::Text { content, ephemeral } => CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
        }
    }

    fn followup(self) -> CreateInteractionResponseFollowup {
        match self {
            Reply::Embed { text, status } => {
                CreateInteractionResponseFollowup::new().embed(embeds::create_reply(text, status))
            }
            Reply::Text { content, ephemeral } => CreateInteractionResponseFollowup::new()
                .content(content)
                .ephemeral(ephemeral),
        }
    }
}

/// Convierte un error de comando en la respuesta que ve el usuario.
pub fn error_reply(error: &MusicError) -> Reply {
    match error {
        MusicError::NoActiveSession => Reply::text(error.to_string()),
        MusicError::PermissionDenied(reason) => Reply::text(reason.clone()),
        MusicError::TransportUnready | MusicError::TransportFatal => Reply::warn(JOIN_TIMEOUT),
        _ => Reply::warn("Something went wrong, please try again later!"),
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &SputnikBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if let Err(denied) = check_permissions(ctx, &command, guild_id, bot) {
        info!("🚫 {} no puede usar /{}", command.user.name, command.data.name);
        return respond(ctx, &command, error_reply(&denied), false).await;
    }

    // Los comandos que pueden tener que entrar al canal responden después
    let deferred = matches!(
        command.data.name.as_str(),
        commands::PLAY | commands::SPECIAL | commands::JOIN
    );
    if deferred {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
    }

    let reply = match run_command(ctx, &command, guild_id, bot).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
            error_reply(&e)
        }
    };

    respond(ctx, &command, reply, deferred).await
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    reply: Reply,
    deferred: bool,
) -> Result<()> {
    if deferred {
        command.create_followup(&ctx.http, reply.followup()).await?;
    } else {
        command
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply.message()))
            .await?;
    }
    Ok(())
}

async fn run_command(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &SputnikBot,
) -> Result<Reply, MusicError> {
    let user = command.user.id;
    let queue = bot.registry.get(guild_id);

    match command.data.name.as_str() {
        commands::PLAY => {
            let Some(song) = string_option(command, "song") else {
                return Ok(Reply::warn("We're not sure what to do with your song request... Sorry!"));
            };
            let Some(queue) = ensure_session(ctx, command, guild_id, bot).await? else {
                return Ok(Reply::warn(JOIN_FIRST));
            };
            play(bot, &queue, song, command.channel_id, user, false).await
        }
        commands::SKIP => skip(queue, user).await,
        commands::UNDO => undo(queue, user),
        commands::QUEUE => describe_queue(queue),
        commands::CLEAR => clear(queue).await,
        commands::LEAVE => leave(queue).await,
        commands::SHUFFLE => shuffle(queue, user),
        commands::GUI | commands::SEARCH => Ok(Reply::log(COMING_SOON)),
        commands::API => Ok(Reply::text(format!(
            "{}/{}",
            bot.config.public_api_url.trim_end_matches('/'),
            guild_id
        ))),
        commands::JOIN => match ensure_session(ctx, command, guild_id, bot).await? {
            Some(_) => Ok(Reply::log("Joined channel!")),
            None => Ok(Reply::warn(JOIN_FIRST)),
        },
        commands::SPECIAL => {
            let arg = string_option(command, "arg").unwrap_or_default();
            let Some(queue) = ensure_session(ctx, command, guild_id, bot).await? else {
                return Ok(Reply::warn(JOIN_FIRST));
            };
            special(bot, &queue, arg, command.channel_id, user).await
        }
        _ => Ok(Reply::text("Unknown Command")),
    }
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn check_permissions(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &SputnikBot,
) -> Result<(), MusicError> {
    let dj_role = bot.config.dj_role.as_deref();
    let dj_ban_role = bot.config.dj_ban_role.as_deref();
    if dj_role.is_none() && dj_ban_role.is_none() {
        return Ok(());
    }

    let member_roles = member_role_names(ctx, command, guild_id);
    roles::check_dj(dj_role, dj_ban_role, member_roles.as_deref())
}

fn member_role_names(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Option<Vec<String>> {
    let member = command.member.as_ref()?;
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    Some(
        member
            .roles
            .iter()
            .filter_map(|role_id| guild.roles.get(role_id))
            .map(|role| role.name.clone())
            .collect(),
    )
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn guild_info(ctx: &Context, guild_id: GuildId) -> GuildInfo {
    match guild_id.to_guild_cached(&ctx.cache) {
        Some(guild) => GuildInfo {
            name: guild.name.clone(),
            icon: guild.icon.as_ref().map(|hash| hash.to_string()),
            acronym: name_acronym(&guild.name),
        },
        None => GuildInfo::default(),
    }
}

/// Devuelve la sesión de la guild, creándola en el canal de voz del usuario.
///
/// `Ok(None)` si no hay sesión y el usuario no está en un canal de voz.
async fn ensure_session(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &SputnikBot,
) -> Result<Option<Arc<GuildQueue>>, MusicError> {
    let live = bot.registry.get(guild_id).filter(|queue| !queue.is_destroyed());
    let queue = match live {
        Some(queue) => queue,
        None => {
            let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
                return Ok(None);
            };
            let manager = songbird::get(ctx)
                .await
                .ok_or_else(|| MusicError::Transport("songbird no inicializado".to_string()))?;

            // Solo el pedido que crea la cola entra al canal
            let mut created = None;
            let queue = bot.registry.get_or_create(guild_id, || {
                let voice = SongbirdVoice::new(manager, guild_id, channel_id, bot.http_client.clone());
                let queue = GuildQueue::new(
                    guild_id,
                    guild_info(ctx, guild_id),
                    voice.clone(),
                    voice.clone(),
                    ChannelAnnouncer::new(ctx.http.clone()),
                );
                voice.attach(&queue);
                created = Some(voice);
                queue
            });

            if let Some(voice) = created {
                info!("🆕 Nueva cola para guild {} en canal {}", guild_id, channel_id);
                tokio::spawn(log_notifications(queue.subscribe(), guild_id));
                if let Err(e) = voice.join().await {
                    error!("❌ No se pudo entrar al canal de voz en guild {}: {}", guild_id, e);
                }
            }
            queue
        }
    };

    queue.wait_until_ready(READY_TIMEOUT).await?;
    Ok(Some(queue))
}

/// Registra la actividad de una cola hasta que se libera.
async fn log_notifications(mut notifications: broadcast::Receiver<QueueNotification>, guild_id: GuildId) {
    loop {
        match notifications.recv().await {
            Ok(QueueNotification::Next(id)) => debug!("🎵 [{}] siguiente: {}", guild_id, id),
            Ok(QueueNotification::Queued(track)) => debug!("➕ [{}] encolada: {}", guild_id, track.title),
            Ok(QueueNotification::Popped(track)) => debug!("↩️ [{}] deshecha: {}", guild_id, track.title),
            Ok(QueueNotification::Clear) => debug!("🗑️ [{}] cola vacía", guild_id),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("[{}] {} notificaciones perdidas", guild_id, skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn play(
    bot: &SputnikBot,
    queue: &Arc<GuildQueue>,
    query: &str,
    channel_id: ChannelId,
    user: UserId,
    priority: bool,
) -> Result<Reply, MusicError> {
    let resolution = match bot.resolver.resolve(query, Some(channel_id), Some(user)).await {
        Ok(resolution) => resolution,
        Err(e) => {
            warn!("⚠️ No se pudo resolver '{}': {:?}", query, e);
            Resolution::None
        }
    };

    let outcome = enqueue_resolution(queue, &bot.catalog, resolution, priority).await?;
    Ok(enqueue_reply(&outcome, user))
}

pub fn enqueue_reply(outcome: &EnqueueOutcome, user: UserId) -> Reply {
    match outcome {
        EnqueueOutcome::Single(title) => Reply::log(format!("Enqueued **{}** [<@{}>]", title, user)),
        EnqueueOutcome::Multi(count) => {
            Reply::log(format!("Enqueued **{} Tracks** from playlist", count))
        }
        EnqueueOutcome::Error => Reply::warn("Failed to enqueue playlist, please try again later!"),
        EnqueueOutcome::None => {
            Reply::warn("We're not sure what to do with your song request... Sorry!")
        }
    }
}

async fn skip(queue: Option<Arc<GuildQueue>>, user: UserId) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;
    let skipped = queue.skip().await.ok_or(MusicError::NoActiveSession)?;
    Ok(Reply::log(format!(
        "<@{}> skipped **{}**",
        user,
        skipped.display_title()
    )))
}

/// Deshace la última canción encolada, solo si la pidió el mismo usuario.
fn undo(queue: Option<Arc<GuildQueue>>, user: UserId) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;

    match queue.pop_queue_if(|last| last.queued_by() == Some(user)) {
        PopOutcome::Popped(popped) => Ok(Reply::log(format!("<@{}> undid **{}**", user, popped.title))),
        PopOutcome::Kept(_) => Ok(Reply::warn(format!(
            "<@{}> you can't undo someone else's track",
            user
        ))),
        PopOutcome::Empty => Err(MusicError::NoActiveSession),
    }
}

fn describe_queue(queue: Option<Arc<GuildQueue>>) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;
    let current = queue.current();

    match current {
        Some(current) if queue.status() != PlayerStatus::Idle => Ok(Reply::log(
            embeds::queue_description(&current, &queue.pending()),
        )),
        _ => Ok(Reply::log("Nothing is currently in the queue")),
    }
}

async fn clear(queue: Option<Arc<GuildQueue>>) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;
    queue.stop().await;
    Ok(Reply::log("Current queue cleared"))
}

async fn leave(queue: Option<Arc<GuildQueue>>) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;
    queue.leave().await;
    Ok(Reply::Text {
        content: "Left channel!".to_string(),
        ephemeral: true,
    })
}

fn shuffle(queue: Option<Arc<GuildQueue>>, user: UserId) -> Result<Reply, MusicError> {
    let queue = queue.ok_or(MusicError::NoActiveSession)?;
    queue.shuffle();
    Ok(Reply::log(format!("[<@{}>] just shuffled the queue", user)))
}

async fn special(
    bot: &SputnikBot,
    queue: &Arc<GuildQueue>,
    arg: &str,
    channel_id: ChannelId,
    user: UserId,
) -> Result<Reply, MusicError> {
    match (arg, bot.config.skip_target_user) {
        (commands::SPECIAL_SKIP_WILL, Some(target)) => {
            queue.purge_from(UserId::new(target));
            Ok(Reply::log("👍 All Good"))
        }
        (commands::SPECIAL_EDS_HERE, _) => {
            play(bot, queue, &bot.config.anthem_url, channel_id, user, true).await
        }
        _ => Ok(Reply::warn("I don't know that command, sorry")),
    }
}
