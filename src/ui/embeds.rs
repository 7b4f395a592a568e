use serenity::{
    all::Colour,
    builder::{CreateEmbed, CreateEmbedAuthor},
    model::id::UserId,
};
use std::sync::Arc;

use super::format::{format_to_width, seconds_to_duration};
use crate::audio::{queue::Announcement, track::{Track, TrackMetadata}};

/// Paleta de colores del bot
pub mod colors {
    use serenity::all::Colour;

    pub const PRIMARY: Colour = Colour::from_rgb(205, 0, 1);
    pub const WARNING: Colour = Colour::from_rgb(255, 193, 7);
}

/// Ancho de los nombres en el listado de la cola
const TRACK_NAME_WIDTH: usize = 40;
const QUEUE_PREVIEW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyStatus {
    #[default]
    Log,
    Warn,
}

/// Crea la respuesta estándar de los comandos
pub fn create_reply(text: impl Into<String>, status: ReplyStatus) -> CreateEmbed {
    let colour: Colour = match status {
        ReplyStatus::Log => colors::PRIMARY,
        ReplyStatus::Warn => colors::WARNING,
    };
    CreateEmbed::default().description(text.into()).color(colour)
}

/// Crea el embed de "Now Playing"
pub fn create_now_playing(metadata: &TrackMetadata, url: &str, queued_by: Option<UserId>) -> CreateEmbed {
    let description = match queued_by {
        Some(user) => format!("{}\n\n[YouTube]({})\n\n[<@{}>]", metadata.artist, url, user),
        None => format!("{}\n\n", metadata.artist),
    };

    let mut embed = CreateEmbed::default()
        .author(CreateEmbedAuthor::new("Now Playing..."))
        .title(&metadata.title)
        .description(description)
        .color(colors::PRIMARY);

    if let Some(artwork) = &metadata.artwork_url {
        embed = embed.thumbnail(artwork);
    }

    embed
}

/// Convierte un mensaje de la cola en su embed
pub fn announcement_embed(announcement: &Announcement) -> CreateEmbed {
    match announcement {
        Announcement::NowPlaying {
            url,
            metadata,
            queued_by,
        } => create_now_playing(metadata, url, *queued_by),
        Announcement::Warning(text) => create_reply(text.as_str(), ReplyStatus::Warn),
    }
}

/// Texto del comando `queue`: la canción actual y las próximas 10
pub fn queue_description(current: &Track, pending: &[Arc<Track>]) -> String {
    let now_playing = format!(
        "**Now Playing:** \n```nim\n-> {} ({})\n```",
        format_to_width(&current.display_title(), TRACK_NAME_WIDTH),
        seconds_to_duration(current.metadata().duration)
    );

    let listed: Vec<String> = pending
        .iter()
        .take(QUEUE_PREVIEW)
        .enumerate()
        .map(|(index, track)| {
            format!(
                "{}) {} ({})",
                index + 1,
                format_to_width(&track.display_title(), TRACK_NAME_WIDTH),
                seconds_to_duration(track.metadata().duration)
            )
        })
        .collect();

    let body = if listed.is_empty() {
        "*end of queue*".to_string()
    } else {
        listed.join("\n")
    };

    let remaining = pending.len().saturating_sub(listed.len());
    let more = if remaining > 0 {
        format!("\nand **{}** more", remaining)
    } else {
        String::new()
    };

    format!("{}\n**Queue:**\n```nim\n{}```{}", now_playing, body, more)
}
