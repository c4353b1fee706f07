//! Capabilities the playback session consumes from the outside world.
//!
//! The session never talks to Discord directly. It asks a [`VoiceBackend`]
//! for a playback engine, a voice connection and audio streams, and it
//! reports to the users through a [`NotificationSink`]. Engines and
//! connections talk back through [`TrackSignals`] and [`ConnectionSignals`],
//! which feed the session's signal pump (see [`crate::audio::registry`]).

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::track::TrackDescriptor;

/// Identifica la generación de la cabeza de la cola a la que pertenece una
/// reproducción. Cambia cada vez que la cabeza se elimina.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayToken(pub(crate) u64);

/// Eventos asíncronos que llegan a una sesión desde el motor o la conexión
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    TrackFinished(PlayToken),
    TrackErrored { token: PlayToken, reason: String },
    Disconnected,
}

/// Handle given to the engine with every `play`, used to report how that
/// particular track ended.
#[derive(Debug, Clone)]
pub struct TrackSignals {
    token: PlayToken,
    tx: UnboundedSender<SessionSignal>,
}

impl TrackSignals {
    pub(crate) fn new(token: PlayToken, tx: UnboundedSender<SessionSignal>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> PlayToken {
        self.token
    }

    /// El track terminó solo o fue detenido
    pub fn finished(&self) {
        // Si la sesión ya no existe no hay nadie a quien avisar
        let _ = self.tx.send(SessionSignal::TrackFinished(self.token));
    }

    /// El motor falló a mitad de la reproducción
    pub fn errored(&self, reason: impl Into<String>) {
        let _ = self.tx.send(SessionSignal::TrackErrored {
            token: self.token,
            reason: reason.into(),
        });
    }
}

/// Handle given to the voice transport on `join`.
#[derive(Debug, Clone)]
pub struct ConnectionSignals {
    tx: UnboundedSender<SessionSignal>,
}

impl ConnectionSignals {
    pub(crate) fn new(tx: UnboundedSender<SessionSignal>) -> Self {
        Self { tx }
    }

    pub fn disconnected(&self) {
        let _ = self.tx.send(SessionSignal::Disconnected);
    }
}

/// Mensajes que la sesión publica en el canal de texto
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Track agregado detrás de otro que ya suena; `position` es su índice
    /// en la cola (0 es el que suena).
    Queued {
        track: TrackDescriptor,
        position: usize,
    },
    NowPlaying {
        track: TrackDescriptor,
    },
    /// No se pudo abrir el stream; el track sigue en la cabeza de la cola.
    StreamFailed {
        track: TrackDescriptor,
        reason: String,
    },
    /// Fallo a mitad de reproducción; el track se descarta.
    PlaybackError {
        track: TrackDescriptor,
        reason: String,
    },
    /// No se pudo entrar al canal de voz; la cola entera se descartó.
    ConnectionFailed {
        dropped: Vec<TrackDescriptor>,
        reason: String,
    },
}

/// Destino fire-and-forget de los avisos de una sesión.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn send(&self, notice: Notice);
}

/// One audio player, exclusively owned by a session for its whole life.
#[async_trait]
pub trait PlaybackEngine: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Replaces whatever is playing with `stream`. The engine must report
    /// the end of this track through `signals`.
    async fn play(&self, stream: Self::Stream, signals: TrackSignals) -> Result<()>;

    fn stop(&self);

    /// `false` when the engine refused (already paused, nothing loaded)
    fn pause(&self) -> bool;

    /// `false` when the engine refused (not paused, nothing loaded)
    fn unpause(&self) -> bool;

    /// Stores the level for future tracks; returns whether a loaded track
    /// received it too.
    fn set_volume(&self, volume: f32) -> bool;

    fn volume(&self) -> f32;
}

/// Live voice connection for one guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    type Engine: PlaybackEngine;

    /// Routes the engine's output into this connection
    fn bind_consumer(&self, engine: &Self::Engine);

    /// Leaves the channel. Must tolerate an already dropped connection.
    async fn destroy(&self);
}

/// Voice transport, engine factory and stream opener in one place, since the
/// three must agree on the stream type.
#[async_trait]
pub trait VoiceBackend: Send + Sync + 'static {
    type Engine: PlaybackEngine;
    type Connection: VoiceConnection<Engine = Self::Engine>;

    fn create_engine(&self, guild_id: GuildId) -> Self::Engine;

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<Self::Connection>;

    /// May fail; may also never return if the remote end stalls.
    async fn open_stream(&self, url: &str) -> Result<<Self::Engine as PlaybackEngine>::Stream>;
}
