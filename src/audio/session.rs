//! # Playback Session
//!
//! One per guild with something queued. Owns the queue, the playback engine
//! and the voice connection, and moves between idle, playing and paused in
//! response to user commands and to the signals of the engine and the
//! voice connection.
//!
//! ## Queue
//!
//! Strict FIFO. Position 0 is the track that is playing (or about to).
//! Tracks are only appended by [`PlaybackSession::enqueue`], and only
//! removed from the head (advance) or all at once (teardown).
//!
//! ## Races
//!
//! Opening a stream and handing it to the engine both happen without
//! holding the state lock. Every head-of-queue generation gets a
//! [`PlayToken`]; a stream that finishes opening after the head changed, or
//! after teardown, is dropped without being played, and one that reached
//! the engine in the meantime is stopped again. Hand-offs to the engine are
//! serialized so a stale track can never stop a newer one. Engine signals carry the token of the
//! track they refer to, so a late or duplicated signal cannot advance the
//! queue twice.

use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedSender, Mutex};
use tracing::{debug, info, warn};

use crate::audio::{
    backend::{
        ConnectionSignals, Notice, NotificationSink, PlayToken, PlaybackEngine, SessionSignal,
        TrackSignals, VoiceBackend, VoiceConnection,
    },
    registry::SessionRegistry,
    track::TrackDescriptor,
};

#[derive(Debug, Error)]
pub enum SessionError {
    /// La sesión se cerró antes de aceptar el track; se puede reintentar
    /// con una sesión nueva.
    #[error("la sesión de este servidor ya fue cerrada")]
    Closed,
    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),
}

/// Resultado de [`PlaybackSession::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// La cola estaba vacía: el track pasó a la cabeza y se empezó a abrir.
    Started,
    /// Ya había algo sonando; el track quedó en `position`.
    Queued { position: usize },
    /// La sesión se detuvo mientras se conectaba la voz; la cola se descartó.
    Abandoned,
}

/// Resultado de pausar o reanudar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// El motor ya estaba en ese estado o no había nada cargado
    Unchanged,
}

/// Copia de sólo lectura del estado, para listar la cola
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub tracks: Vec<TrackDescriptor>,
    pub playing: bool,
    pub paused: bool,
    pub connected: bool,
    pub volume: f32,
}

enum VoiceLink<C> {
    Detached,
    Joining,
    Attached(C),
}

struct SessionState<C> {
    queue: VecDeque<TrackDescriptor>,
    link: VoiceLink<C>,
    playing: bool,
    paused: bool,
    /// Generación de la cabeza de la cola
    epoch: u64,
    /// Generación cuyo stream se está abriendo
    opening: Option<u64>,
}

#[derive(Debug, Clone)]
enum Teardown {
    Stopped,
    Disconnected,
    JoinFailed(String),
}

pub struct PlaybackSession<B: VoiceBackend> {
    guild_id: GuildId,
    voice_channel: ChannelId,
    sink: Arc<dyn NotificationSink>,
    backend: Arc<B>,
    engine: B::Engine,
    signals: UnboundedSender<SessionSignal>,
    registry: Weak<SessionRegistry<B>>,
    live: AtomicBool,
    state: Mutex<SessionState<B::Connection>>,
    /// Serializa las entregas de streams al motor
    play_lock: Mutex<()>,
}

impl<B: VoiceBackend> PlaybackSession<B> {
    pub(crate) fn new(
        guild_id: GuildId,
        voice_channel: ChannelId,
        sink: Arc<dyn NotificationSink>,
        backend: Arc<B>,
        signals: UnboundedSender<SessionSignal>,
        registry: Weak<SessionRegistry<B>>,
    ) -> Self {
        let engine = backend.create_engine(guild_id);

        Self {
            guild_id,
            voice_channel,
            sink,
            backend,
            engine,
            signals,
            registry,
            live: AtomicBool::new(true),
            play_lock: Mutex::new(()),
            state: Mutex::new(SessionState {
                queue: VecDeque::new(),
                link: VoiceLink::Detached,
                playing: false,
                paused: false,
                epoch: 0,
                opening: None,
            }),
        }
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.voice_channel
    }

    /// `false` desde que la sesión empezó a desmontarse
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Agrega un track al final de la cola.
    ///
    /// The first enqueue of a session joins the voice channel. When the
    /// queue was empty the track starts right away (this call waits for the
    /// stream to open); otherwise a "queued" notice is published with the
    /// resulting position.
    pub async fn enqueue(&self, track: TrackDescriptor) -> Result<EnqueueOutcome, SessionError> {
        let (position, needs_join) = {
            let mut state = self.state.lock().await;
            if !self.is_live() {
                return Err(SessionError::Closed);
            }

            state.queue.push_back(track.clone());
            let needs_join = matches!(state.link, VoiceLink::Detached);
            if needs_join {
                state.link = VoiceLink::Joining;
            }
            (state.queue.len() - 1, needs_join)
        };

        info!(
            "➕ Agregado a la cola en guild {}: {} (posición {})",
            self.guild_id,
            track.title(),
            position
        );

        if needs_join && !self.connect().await? {
            return Ok(EnqueueOutcome::Abandoned);
        }

        if position == 0 {
            self.start_current().await;
            Ok(EnqueueOutcome::Started)
        } else {
            self.sink.send(Notice::Queued { track, position });
            Ok(EnqueueOutcome::Queued { position })
        }
    }

    /// Detiene el track actual; la señal de fin del motor hace el avance.
    ///
    /// When the head never started (its stream failed to open, or is still
    /// opening) there is no engine signal to wait for, so the head is
    /// dropped here. Returns `false` on an empty queue.
    pub async fn skip(&self) -> bool {
        let epoch = {
            let state = self.state.lock().await;
            if !self.is_live() || state.queue.is_empty() {
                debug!("⏭️ Skip ignorado en guild {}: cola vacía", self.guild_id);
                return false;
            }
            if state.playing {
                info!("⏭️ Saltando track en guild {}", self.guild_id);
                self.engine.stop();
                return true;
            }
            state.epoch
        };

        info!("⏭️ Descartando cabeza sin reproducir en guild {}", self.guild_id);
        self.advance(Some(epoch)).await;
        true
    }

    /// Vacía la cola, detiene el motor, sale del canal de voz y se borra
    /// del registro. Las llamadas repetidas no hacen nada.
    pub async fn stop(&self) {
        self.teardown(Teardown::Stopped).await;
    }

    pub async fn pause(&self) -> Transition {
        let mut state = self.state.lock().await;
        if !self.is_live() || !state.playing || !self.engine.pause() {
            return Transition::Unchanged;
        }
        state.paused = true;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Transition::Applied
    }

    pub async fn resume(&self) -> Transition {
        let mut state = self.state.lock().await;
        if !self.is_live() || !state.playing || !self.engine.unpause() {
            return Transition::Unchanged;
        }
        state.paused = false;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Transition::Applied
    }

    /// Ajusta el volumen (0.0 - 2.0) del track actual y de los siguientes.
    /// Devuelve si había un track cargado.
    pub async fn set_volume(&self, volume: f32) -> bool {
        let volume = volume.clamp(0.0, 2.0);
        let _state = self.state.lock().await;
        info!(
            "🔊 Volumen ajustado a {}% en guild {}",
            (volume * 100.0) as u32,
            self.guild_id
        );
        self.engine.set_volume(volume)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            tracks: state.queue.iter().cloned().collect(),
            playing: state.playing,
            paused: state.paused,
            connected: matches!(state.link, VoiceLink::Attached(_)),
            volume: self.engine.volume(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_playing(&self) -> bool {
        self.state.lock().await.playing
    }

    // Señales

    pub(crate) async fn handle_signal(&self, signal: SessionSignal) {
        match signal {
            SessionSignal::TrackFinished(token) => self.on_track_finished(token).await,
            SessionSignal::TrackErrored { token, reason } => {
                self.on_track_error(token, &reason).await
            }
            SessionSignal::Disconnected => self.on_disconnected().await,
        }
    }

    /// El motor quedó inactivo: el track terminó o lo detuvo un skip.
    pub async fn on_track_finished(&self, token: PlayToken) {
        debug!("🎵 Track terminó en guild {}", self.guild_id);
        self.advance(Some(token.0)).await;
    }

    /// Fallo a mitad de stream: se avisa y se descarta el track sin
    /// reintentarlo.
    pub async fn on_track_error(&self, token: PlayToken, reason: &str) {
        let failed = {
            let state = self.state.lock().await;
            if !self.is_live() || state.epoch != token.0 {
                debug!("Error de un track ya reemplazado en guild {}", self.guild_id);
                return;
            }
            state.queue.front().cloned()
        };

        if let Some(track) = failed {
            warn!(
                "❌ Error en track para guild {}: {} - {}",
                self.guild_id,
                track.title(),
                reason
            );
            self.sink.send(Notice::PlaybackError {
                track,
                reason: reason.to_string(),
            });
        }

        self.advance(Some(token.0)).await;
    }

    /// La conexión de voz se cayó: la sesión se abandona sin reconectar.
    pub async fn on_disconnected(&self) {
        self.teardown(Teardown::Disconnected).await;
    }

    // Funciones privadas

    /// Quita la cabeza y arranca la siguiente. Con `expected` sólo avanza si
    /// la cabeza sigue siendo esa generación.
    async fn advance(&self, expected: Option<u64>) {
        {
            let mut state = self.state.lock().await;
            if !self.is_live() {
                return;
            }
            if let Some(epoch) = expected {
                if state.epoch != epoch {
                    debug!("Señal obsoleta ignorada en guild {}", self.guild_id);
                    return;
                }
            }

            state.queue.pop_front();
            state.epoch += 1;
            state.playing = false;
            state.paused = false;

            if state.queue.is_empty() {
                info!("📭 Cola vacía en guild {}, esperando más canciones", self.guild_id);
                return;
            }
        }

        self.start_current().await;
    }

    /// Abre el stream de la cabeza y lo entrega al motor. Si falla la
    /// apertura se avisa y la cabeza se queda donde está.
    async fn start_current(&self) {
        let (epoch, track) = {
            let mut state = self.state.lock().await;
            if !self.is_live() || state.playing || !matches!(state.link, VoiceLink::Attached(_))
            {
                return;
            }
            let Some(track) = state.queue.front().cloned() else {
                return;
            };
            if state.opening == Some(state.epoch) {
                return;
            }
            state.opening = Some(state.epoch);
            (state.epoch, track)
        };

        debug!("🔗 Abriendo stream: {}", track.url());
        let opened = self.backend.open_stream(track.url()).await;

        let _play_guard = self.play_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            if !self.is_live() || state.epoch != epoch {
                if state.opening == Some(epoch) {
                    state.opening = None;
                }
                debug!(
                    "🗑️ Stream descartado en guild {}: la cola cambió mientras se abría",
                    self.guild_id
                );
                return;
            }
        }

        // El motor puede tardar (songbird espera el lock de la Call): sin el
        // lock de estado, para no bloquear pause/skip/stop/snapshot
        let started = match opened {
            Ok(stream) => {
                let signals = TrackSignals::new(PlayToken(epoch), self.signals.clone());
                self.engine.play(stream, signals).await
            }
            Err(e) => Err(e),
        };

        let mut state = self.state.lock().await;
        if state.opening == Some(epoch) {
            state.opening = None;
        }
        if !self.is_live() || state.epoch != epoch {
            if started.is_ok() {
                self.engine.stop();
            }
            debug!(
                "🗑️ Track detenido en guild {}: la cola cambió mientras se cargaba",
                self.guild_id
            );
            return;
        }

        match started {
            Ok(()) => {
                state.playing = true;
                state.paused = false;
                drop(state);

                info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title());
                self.sink.send(Notice::NowPlaying { track });
            }
            Err(e) => {
                drop(state);

                warn!(
                    "❌ No se pudo reproducir {} en guild {}: {}",
                    track.url(),
                    self.guild_id,
                    e
                );
                self.sink.send(Notice::StreamFailed {
                    track,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Conecta al canal de voz. `Ok(false)` si la sesión se detuvo mientras
    /// tanto.
    async fn connect(&self) -> Result<bool, SessionError> {
        let joined = self
            .backend
            .join(
                self.guild_id,
                self.voice_channel,
                ConnectionSignals::new(self.signals.clone()),
            )
            .await;

        let connection = match joined {
            Ok(connection) => connection,
            Err(e) => {
                warn!("🔌 Error al conectar en guild {}: {:?}", self.guild_id, e);
                self.teardown(Teardown::JoinFailed(e.to_string())).await;
                return Err(SessionError::Join(e.to_string()));
            }
        };

        let mut state = self.state.lock().await;
        if !self.is_live() {
            drop(state);
            debug!("Conexión descartada: la sesión se cerró durante el join");
            connection.destroy().await;
            return Ok(false);
        }

        connection.bind_consumer(&self.engine);
        state.link = VoiceLink::Attached(connection);
        info!(
            "🔊 Conectado al canal de voz {} en guild {}",
            self.voice_channel, self.guild_id
        );
        Ok(true)
    }

    async fn teardown(&self, reason: Teardown) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }

        let (dropped, link) = {
            let mut state = self.state.lock().await;
            let dropped: Vec<_> = std::mem::take(&mut state.queue).into();
            state.playing = false;
            state.paused = false;
            state.epoch += 1;
            state.opening = None;
            self.engine.stop();
            (dropped, std::mem::replace(&mut state.link, VoiceLink::Detached))
        };

        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.guild_id, self);
        }

        if let VoiceLink::Attached(connection) = link {
            connection.destroy().await;
        }

        match reason {
            Teardown::Stopped => info!("⏹️ Reproducción detenida en guild {}", self.guild_id),
            Teardown::Disconnected => {
                warn!("🔌 Bot desconectado del canal de voz en guild {}", self.guild_id)
            }
            Teardown::JoinFailed(reason) => {
                warn!(
                    "🗑️ Sesión descartada en guild {}: {} canciones perdidas",
                    self.guild_id,
                    dropped.len()
                );
                // Otros usuarios pudieron encolar mientras se conectaba
                self.sink.send(Notice::ConnectionFailed { dropped, reason });
            }
        }
    }
}
