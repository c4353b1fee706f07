use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    events::CoreEvent,
    input::{Input, YoutubeDl},
    tracks::TrackHandle,
    Call, Event, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::backend::{
        ConnectionSignals, PlaybackEngine, TrackSignals, VoiceBackend, VoiceConnection,
    },
    bot::events::{DisconnectNotifier, TrackEndNotifier, TrackErrorNotifier},
};

/// Backend de voz sobre songbird: una `Call` por guild y yt-dlp para los
/// streams.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    default_volume: f32,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, default_volume: f32) -> Self {
        Self {
            manager,
            http,
            default_volume,
        }
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    type Engine = SongbirdEngine;
    type Connection = SongbirdConnection;

    fn create_engine(&self, guild_id: GuildId) -> SongbirdEngine {
        SongbirdEngine::new(guild_id, self.default_volume)
    }

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<SongbirdConnection> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("Error al conectar al canal de voz: {:?}", e))?;

        {
            let mut handler = call.lock().await;
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier { guild_id, signals },
            );
        }

        Ok(SongbirdConnection {
            guild_id,
            call,
            manager: self.manager.clone(),
        })
    }

    async fn open_stream(&self, url: &str) -> Result<Input> {
        let input: Input = YoutubeDl::new(self.http.clone(), url.to_string()).into();

        // Forzar la apertura ahora para que un fallo se vea antes de reproducir
        input
            .make_live_async()
            .await
            .map_err(|e| anyhow::anyhow!("No se pudo abrir el stream: {}", e))
    }
}

pub struct SongbirdConnection {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    type Engine = SongbirdEngine;

    fn bind_consumer(&self, engine: &SongbirdEngine) {
        *engine.call.lock() = Some(self.call.clone());
    }

    async fn destroy(&self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            // Ya no había llamada: la desconexión vino de afuera
            Err(e) => debug!("Llamada ya cerrada en guild {}: {:?}", self.guild_id, e),
        }
    }
}

struct ActiveTrack {
    handle: TrackHandle,
    paused: bool,
}

/// Reproductor de una sesión. Sólo hay un track cargado a la vez.
pub struct SongbirdEngine {
    guild_id: GuildId,
    call: Mutex<Option<Arc<tokio::sync::Mutex<Call>>>>,
    current: Mutex<Option<ActiveTrack>>,
    volume: Mutex<f32>,
}

impl SongbirdEngine {
    fn new(guild_id: GuildId, volume: f32) -> Self {
        Self {
            guild_id,
            call: Mutex::new(None),
            current: Mutex::new(None),
            volume: Mutex::new(volume),
        }
    }
}

#[async_trait]
impl PlaybackEngine for SongbirdEngine {
    type Stream = Input;

    async fn play(&self, stream: Input, signals: TrackSignals) -> Result<()> {
        let call = self
            .call
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("El reproductor no tiene conexión de voz"))?;

        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            let _ = previous.handle.stop();
        }

        let handle = {
            let mut handler = call.lock().await;
            handler.play_input(stream)
        };

        let volume = *self.volume.lock();
        let _ = handle.set_volume(volume);

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    guild_id: self.guild_id,
                    signals: signals.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    guild_id: self.guild_id,
                    signals,
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        *self.current.lock() = Some(ActiveTrack {
            handle,
            paused: false,
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(track) = self.current.lock().take() {
            let _ = track.handle.stop();
        }
    }

    fn pause(&self) -> bool {
        match self.current.lock().as_mut() {
            Some(track) if !track.paused => {
                track.paused = track.handle.pause().is_ok();
                track.paused
            }
            _ => false,
        }
    }

    fn unpause(&self) -> bool {
        match self.current.lock().as_mut() {
            Some(track) if track.paused => {
                let resumed = track.handle.play().is_ok();
                track.paused = !resumed;
                resumed
            }
            _ => false,
        }
    }

    fn set_volume(&self, volume: f32) -> bool {
        *self.volume.lock() = volume;
        match self.current.lock().as_ref() {
            Some(track) => track.handle.set_volume(volume).is_ok(),
            None => false,
        }
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}
