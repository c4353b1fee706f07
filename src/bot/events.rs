use serenity::{async_trait, model::id::GuildId};
use songbird::{Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler};
use tracing::{debug, warn};

use crate::audio::backend::{ConnectionSignals, TrackSignals};

/// Handler para cuando termina un track (natural o por stop)
pub struct TrackEndNotifier {
    pub guild_id: GuildId,
    pub signals: TrackSignals,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!(
            "🎵 Track {:?} terminó en guild {}",
            self.signals.token(),
            self.guild_id
        );
        self.signals.finished();
        None
    }
}

/// Handler para errores de tracks
pub struct TrackErrorNotifier {
    pub guild_id: GuildId,
    pub signals: TrackSignals,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let reason = match ctx {
            EventContext::Track(track_list) => track_list
                .iter()
                .map(|(state, _handle)| format!("{:?}", state.playing))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "error desconocido".to_string(),
        };

        warn!("❌ Error en track para guild {}: {}", self.guild_id, reason);
        self.signals.errored(reason);
        None
    }
}

/// Handler para desconexiones del driver de voz
pub struct DisconnectNotifier {
    pub guild_id: GuildId,
    pub signals: ConnectionSignals,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild_id, data.reason
            );
            self.signals.disconnected();
        }

        None
    }
}
