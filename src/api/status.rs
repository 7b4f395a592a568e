use serde::Serialize;
use serenity::model::id::GuildId;

use crate::audio::{
    queue::{GuildInfo, GuildQueue, PlayerStatus},
    track::TrackSummary,
};

/// Cuerpo de `GET /{guild_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub status: PlayerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<TrackSummary>,
    pub queue: Vec<TrackSummary>,
    pub guild: GuildStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuildStatus {
    pub name: String,
    pub icon_url: Option<String>,
    pub acronym: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

impl GuildStatus {
    pub fn new(guild_id: GuildId, info: &GuildInfo) -> Self {
        Self {
            name: info.name.clone(),
            icon_url: info.icon.as_ref().map(|icon| icon_url(guild_id, icon)),
            acronym: info.acronym.clone(),
        }
    }
}

impl From<&GuildQueue> for QueueStatus {
    fn from(queue: &GuildQueue) -> Self {
        let snapshot = queue.snapshot();
        Self {
            status: snapshot.status,
            current: snapshot.current,
            queue: snapshot.queue,
            guild: GuildStatus::new(queue.guild_id(), queue.info()),
        }
    }
}

pub fn icon_url(guild_id: GuildId, icon: &str) -> String {
    format!(
        "https://cdn.discordapp.com/icons/{}/{}.png?size=128",
        guild_id, icon
    )
}
