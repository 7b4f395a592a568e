use anyhow::Result;
use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::{
    audio::queue::{Announcement, Announcer, MessageRef},
    ui::embeds::announcement_embed,
};

/// Publica los avisos de la cola en el canal de texto donde se pidió la canción.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Arc<Self> {
        Arc::new(Self { http })
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn post(&self, channel: ChannelId, announcement: Announcement) -> Result<MessageRef> {
        let message = channel
            .send_message(
                &self.http,
                CreateMessage::new().embed(announcement_embed(&announcement)),
            )
            .await?;

        Ok(MessageRef {
            channel_id: message.channel_id,
            message_id: message.id,
        })
    }

    async fn delete(&self, message: MessageRef) -> Result<()> {
        message
            .channel_id
            .delete_message(&self.http, message.message_id)
            .await?;
        Ok(())
    }
}
