use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::warn;

use crate::{
    audio::backend::{Notice, NotificationSink},
    ui::embeds,
};

/// Publica los avisos de una sesión en el canal de texto donde se pidió
/// la primera canción. Los envíos no bloquean a la sesión.
pub struct ChannelSink {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

impl NotificationSink for ChannelSink {
    fn send(&self, notice: Notice) {
        let http = self.http.clone();
        let channel_id = self.channel_id;
        let message = CreateMessage::new().embed(embeds::notice_embed(&notice));

        tokio::spawn(async move {
            if let Err(e) = channel_id.send_message(&http, message).await {
                warn!("⚠️ No se pudo enviar aviso al canal {}: {:?}", channel_id, e);
            }
        });
    }
}
