use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

pub const PLAY: &str = "play";
pub const SKIP: &str = "skip";
pub const QUEUE: &str = "queue";
pub const CLEAR: &str = "clear";
pub const LEAVE: &str = "leave";
pub const GUI: &str = "gui";
pub const SEARCH: &str = "search";
pub const API: &str = "api";
pub const SHUFFLE: &str = "shuffle";
pub const UNDO: &str = "undo";
pub const SPECIAL: &str = "special";
pub const JOIN: &str = "join";

/// Argumentos de `/special`
pub const SPECIAL_SKIP_WILL: &str = "skip will";
pub const SPECIAL_EDS_HERE: &str = "eds here";

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        CreateCommand::new(SKIP).description("Skip to the next song in the queue"),
        CreateCommand::new(QUEUE).description("See the music queue"),
        CreateCommand::new(CLEAR).description("Clear the music queue"),
        CreateCommand::new(LEAVE).description("Leave the voice channel"),
        CreateCommand::new(GUI).description("Shows a link to the queue manager"),
        CreateCommand::new(SEARCH).description("Search for a song by name"),
        CreateCommand::new(API).description("Returns the API url for your queue"),
        CreateCommand::new(SHUFFLE).description("Shuffle the current queue"),
        CreateCommand::new(UNDO).description("Undo your last addition to the queue"),
        special_command(),
        CreateCommand::new(JOIN).description("Join your voice channel"),
    ]
}

fn play_command() -> CreateCommand {
    CreateCommand::new(PLAY).description("Plays a song").add_option(
        CreateCommandOption::new(CommandOptionType::String, "song", "The URL of the song to play")
            .required(true),
    )
}

fn special_command() -> CreateCommand {
    CreateCommand::new(SPECIAL).description("Special Actions").add_option(
        CreateCommandOption::new(CommandOptionType::String, "arg", "The special argument")
            .required(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_names() {
        let names: Vec<String> = all_commands()
            .into_iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![PLAY, SKIP, QUEUE, CLEAR, LEAVE, GUI, SEARCH, API, SHUFFLE, UNDO, SPECIAL, JOIN]
        );
    }

    #[test]
    fn test_play_requires_song() {
        let json = serde_json::to_value(play_command()).unwrap();
        assert_eq!(json["options"][0]["name"], "song");
        assert_eq!(json["options"][0]["required"], true);
    }
}
