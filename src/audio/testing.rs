//! Dobles de prueba para las capacidades de voz.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Notify;

use crate::audio::{
    backend::{
        ConnectionSignals, Notice, NotificationSink, PlaybackEngine, TrackSignals, VoiceBackend,
        VoiceConnection,
    },
    track::TrackDescriptor,
};

pub fn guild(id: u64) -> GuildId {
    GuildId::new(id)
}

pub fn track(title: &str) -> TrackDescriptor {
    TrackDescriptor::new(
        title,
        format!("https://www.youtube.com/watch?v={}", title),
        Duration::from_secs(180),
        "<@42>",
    )
}

/// Reintenta `condition` cediendo el turno entre intentos.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..1000 {
        if condition().await {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("la condición nunca se cumplió");
}

/// Punto de espera controlado por el test: `entered` avisa que la operación
/// llegó, `release` la deja seguir.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn send(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

#[derive(Debug)]
pub struct FakeStream {
    url: String,
}

/// Lo que hizo un motor, compartido con el test
pub struct EngineLog {
    plays: Mutex<Vec<(String, TrackSignals)>>,
    stops: AtomicUsize,
    loaded: AtomicBool,
    paused: AtomicBool,
    bound: AtomicBool,
    volume: Mutex<f32>,
    play_gate: Mutex<Option<Arc<Gate>>>,
}

impl Default for EngineLog {
    fn default() -> Self {
        Self {
            plays: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            bound: AtomicBool::new(false),
            volume: Mutex::new(0.5),
            play_gate: Mutex::new(None),
        }
    }
}

impl EngineLog {
    pub fn played_urls(&self) -> Vec<String> {
        self.plays.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn last_signals(&self) -> Option<TrackSignals> {
        self.plays.lock().last().map(|(_, signals)| signals.clone())
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// `true` mientras haya un track cargado en el motor
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Frena el próximo `play` hasta que el test lo libere
    pub fn gate_play(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.play_gate.lock() = Some(gate.clone());
        gate
    }
}

pub struct FakeEngine {
    log: Arc<EngineLog>,
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    type Stream = FakeStream;

    async fn play(&self, stream: FakeStream, signals: TrackSignals) -> Result<()> {
        let gate = self.log.play_gate.lock().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        self.log.plays.lock().push((stream.url, signals));
        self.log.loaded.store(true, Ordering::SeqCst);
        self.log.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
        self.log.loaded.store(false, Ordering::SeqCst);
    }

    fn pause(&self) -> bool {
        self.log.loaded.load(Ordering::SeqCst) && !self.log.paused.swap(true, Ordering::SeqCst)
    }

    fn unpause(&self) -> bool {
        self.log.loaded.load(Ordering::SeqCst) && self.log.paused.swap(false, Ordering::SeqCst)
    }

    fn set_volume(&self, volume: f32) -> bool {
        *self.log.volume.lock() = volume;
        self.log.loaded.load(Ordering::SeqCst)
    }

    fn volume(&self) -> f32 {
        *self.log.volume.lock()
    }
}

pub struct FakeConnection {
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    type Engine = FakeEngine;

    fn bind_consumer(&self, engine: &FakeEngine) {
        engine.log.bound.store(true, Ordering::SeqCst);
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeBackend {
    joins: AtomicUsize,
    fail_joins: AtomicBool,
    join_gate: Mutex<Option<Arc<Gate>>>,
    destroyed: Arc<AtomicUsize>,
    failing_urls: Mutex<HashSet<String>>,
    stream_gates: Mutex<HashMap<String, Arc<Gate>>>,
    engines: Mutex<HashMap<GuildId, Arc<EngineLog>>>,
    connections: Mutex<HashMap<GuildId, ConnectionSignals>>,
}

impl FakeBackend {
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn engine(&self, guild_id: GuildId) -> Arc<EngineLog> {
        self.engines
            .lock()
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| panic!("sin motor para guild {}", guild_id))
    }

    pub fn connection_signals(&self, guild_id: GuildId) -> Option<ConnectionSignals> {
        self.connections.lock().get(&guild_id).cloned()
    }

    pub fn fail_joins(&self) {
        self.fail_joins.store(true, Ordering::SeqCst);
    }

    pub fn fail_stream(&self, url: &str) {
        self.failing_urls.lock().insert(url.to_string());
    }

    pub fn gate_join(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.join_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn gate_stream(&self, url: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.stream_gates.lock().insert(url.to_string(), gate.clone());
        gate
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    type Engine = FakeEngine;
    type Connection = FakeConnection;

    fn create_engine(&self, guild_id: GuildId) -> FakeEngine {
        let log = Arc::new(EngineLog::default());
        self.engines.lock().insert(guild_id, log.clone());
        FakeEngine { log }
    }

    async fn join(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
        signals: ConnectionSignals,
    ) -> Result<FakeConnection> {
        self.joins.fetch_add(1, Ordering::SeqCst);

        let gate = self.join_gate.lock().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.fail_joins.load(Ordering::SeqCst) {
            anyhow::bail!("canal lleno");
        }

        self.connections.lock().insert(guild_id, signals);
        Ok(FakeConnection {
            destroyed: self.destroyed.clone(),
        })
    }

    async fn open_stream(&self, url: &str) -> Result<FakeStream> {
        let gate = self.stream_gates.lock().remove(url);
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.failing_urls.lock().contains(url) {
            anyhow::bail!("stream no disponible: {}", url);
        }
        Ok(FakeStream {
            url: url.to_string(),
        })
    }
}
