use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::audio::{
    backend::{NotificationSink, SessionSignal, VoiceBackend},
    session::{EnqueueOutcome, PlaybackSession, SessionError},
    track::TrackDescriptor,
};

/// Mapa guild → sesión activa.
///
/// Se crea vacío al arrancar y se comparte con los comandos; cada sesión se
/// borra sola cuando se detiene o pierde la conexión de voz.
/// [`SessionRegistry::shutdown`] desmonta todo al salir.
pub struct SessionRegistry<B: VoiceBackend> {
    backend: Arc<B>,
    sessions: DashMap<GuildId, Arc<PlaybackSession<B>>>,
}

impl<B: VoiceBackend> SessionRegistry<B> {
    pub fn new(backend: Arc<B>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            sessions: DashMap::new(),
        })
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession<B>>> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.clone())
            .filter(|s| s.is_live())
    }

    /// Devuelve la sesión del guild o crea una nueva ligada a ese canal de
    /// voz y a ese destino de avisos.
    pub fn get_or_create(
        self: &Arc<Self>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<PlaybackSession<B>> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if entry.get().is_live() => entry.get().clone(),
            Entry::Occupied(mut entry) => {
                // Sesión muerta que todavía no se había borrado
                let session = self.spawn_session(guild_id, voice_channel, sink);
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => {
                let session = self.spawn_session(guild_id, voice_channel, sink);
                entry.insert(session.clone());
                session
            }
        }
    }

    /// Borra la entrada del guild sin condiciones. No falla si no existe.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession<B>>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Borra la entrada sólo si sigue siendo `session`, para que una sesión
    /// vieja no se lleve por delante a la que la reemplazó.
    pub(crate) fn release(&self, guild_id: GuildId, session: &PlaybackSession<B>) {
        let removed = self
            .sessions
            .remove_if(&guild_id, |_, current| {
                std::ptr::eq(Arc::as_ptr(current), session)
            })
            .is_some();

        if removed {
            debug!("🗑️ Sesión eliminada del registro para guild {}", guild_id);
        }
    }

    /// Encola en la sesión del guild, creándola si hace falta. Si la sesión
    /// encontrada se cerró entre la búsqueda y la llamada, reintenta una vez
    /// con una sesión nueva.
    pub async fn enqueue(
        self: &Arc<Self>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        sink: Arc<dyn NotificationSink>,
        track: TrackDescriptor,
    ) -> Result<EnqueueOutcome, SessionError> {
        let session = self.get_or_create(guild_id, voice_channel, sink.clone());
        match session.enqueue(track.clone()).await {
            Err(SessionError::Closed) => {
                debug!("Sesión cerrada durante enqueue en guild {}, reintentando", guild_id);
                self.get_or_create(guild_id, voice_channel, sink)
                    .enqueue(track)
                    .await
            }
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Saca todas las sesiones del registro y las detiene (motor y conexión
    /// de voz).
    pub async fn shutdown(&self) {
        info!("⚠️ Cerrando {} sesiones de reproducción", self.len());
        let guilds: Vec<GuildId> = self.sessions.iter().map(|e| *e.key()).collect();
        let sessions: Vec<_> = guilds
            .into_iter()
            .filter_map(|guild_id| self.remove(guild_id))
            .collect();

        futures::future::join_all(sessions.iter().map(|session| session.stop())).await;

        if !self.is_empty() {
            warn!("⚠️ {} sesiones se crearon durante el cierre", self.len());
        }
    }

    fn spawn_session(
        self: &Arc<Self>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        sink: Arc<dyn NotificationSink>,
    ) -> Arc<PlaybackSession<B>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(PlaybackSession::new(
            guild_id,
            voice_channel,
            sink,
            self.backend.clone(),
            tx,
            Arc::downgrade(self),
        ));

        tokio::spawn(pump_signals(Arc::downgrade(&session), rx));
        info!("🆕 Sesión creada para guild {}", guild_id);
        session
    }
}

/// Entrega las señales de una sesión de a una y en orden.
async fn pump_signals<B: VoiceBackend>(
    session: Weak<PlaybackSession<B>>,
    mut rx: UnboundedReceiver<SessionSignal>,
) {
    while let Some(signal) = rx.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        session.handle_signal(signal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{guild, track, wait_until, FakeBackend, RecordingSink};
    use crate::audio::backend::Notice;
    use pretty_assertions::assert_eq;

    fn setup() -> (Arc<FakeBackend>, Arc<SessionRegistry<FakeBackend>>, Arc<RecordingSink>) {
        let backend = Arc::new(FakeBackend::default());
        let registry = SessionRegistry::new(backend.clone());
        (backend, registry, Arc::new(RecordingSink::default()))
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let (_backend, registry, _sink) = setup();
        assert!(registry.is_empty());
        assert!(registry.get(guild(1)).is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_live_session() {
        let (_backend, registry, sink) = setup();

        let first = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        let second = registry.get_or_create(guild(1), ChannelId::new(99), sink.clone());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.voice_channel(), ChannelId::new(10));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_guilds_are_isolated() {
        let (backend, registry, sink) = setup();
        let a = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        let b = registry.get_or_create(guild(2), ChannelId::new(20), sink.clone());

        a.enqueue(track("A")).await.unwrap();
        b.enqueue(track("B")).await.unwrap();
        b.enqueue(track("C")).await.unwrap();

        a.stop().await;

        assert!(registry.get(guild(1)).is_none());
        let b_snapshot = registry.get(guild(2)).unwrap().snapshot().await;
        assert!(b_snapshot.playing);
        assert_eq!(b_snapshot.tracks.len(), 2);
        assert_eq!(backend.joins(), 2);
        assert_eq!(backend.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_unconditional_and_tolerates_absence() {
        let (_backend, registry, sink) = setup();
        registry.get_or_create(guild(1), ChannelId::new(10), sink);

        assert!(registry.remove(guild(1)).is_some());
        assert!(registry.remove(guild(1)).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_session_does_not_erase_its_replacement() {
        let (_backend, registry, sink) = setup();
        let old = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        old.enqueue(track("A")).await.unwrap();
        registry.remove(guild(1));

        let new = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        old.stop().await;

        let current = registry.get(guild(1)).unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn test_enqueue_creates_fresh_session_after_stop() {
        let (backend, registry, sink) = setup();
        registry
            .enqueue(guild(1), ChannelId::new(10), sink.clone(), track("A"))
            .await
            .unwrap();
        let old = registry.get(guild(1)).unwrap();
        old.stop().await;

        let outcome = registry
            .enqueue(guild(1), ChannelId::new(10), sink.clone(), track("B"))
            .await
            .unwrap();

        assert_eq!(outcome, EnqueueOutcome::Started);
        let new = registry.get(guild(1)).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(backend.joins(), 2);
    }

    #[tokio::test]
    async fn test_concrete_scenario() {
        let (backend, registry, sink) = setup();

        let outcome = registry
            .enqueue(guild(1), ChannelId::new(10), sink.clone(), track("A"))
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Started);

        let outcome = registry
            .enqueue(guild(1), ChannelId::new(10), sink.clone(), track("B"))
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued { position: 1 });

        let session = registry.get(guild(1)).unwrap();
        let engine = backend.engine(guild(1));
        engine.last_signals().unwrap().finished();

        wait_until(|| {
            let session = session.clone();
            async move { session.snapshot().await.tracks.len() == 1 }
        })
        .await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.tracks, vec![track("B")]);
        assert!(snapshot.playing);
        assert_eq!(
            sink.notices(),
            vec![
                Notice::NowPlaying { track: track("A") },
                Notice::Queued {
                    track: track("B"),
                    position: 1
                },
                Notice::NowPlaying { track: track("B") },
            ]
        );

        session.stop().await;
        assert!(session.is_empty().await);
        assert!(registry.get(guild(1)).is_none());
    }

    #[tokio::test]
    async fn test_error_signal_through_pump() {
        let (backend, registry, sink) = setup();
        let session = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        session.enqueue(track("A")).await.unwrap();
        session.enqueue(track("B")).await.unwrap();

        backend.engine(guild(1)).last_signals().unwrap().errored("mid-stream");

        wait_until(|| {
            let session = session.clone();
            async move { session.snapshot().await.tracks == vec![track("B")] }
        })
        .await;
        assert!(session.is_playing().await);
        assert!(sink.notices().iter().any(|n| matches!(
            n,
            Notice::PlaybackError { track, .. } if track.title() == "A"
        )));
    }

    #[tokio::test]
    async fn test_disconnect_signal_through_pump() {
        let (backend, registry, sink) = setup();
        let session = registry.get_or_create(guild(1), ChannelId::new(10), sink.clone());
        session.enqueue(track("A")).await.unwrap();
        session.enqueue(track("B")).await.unwrap();

        backend.connection_signals(guild(1)).unwrap().disconnected();

        wait_until(|| {
            let registry = registry.clone();
            async move { registry.get(guild(1)).is_none() }
        })
        .await;
        assert!(session.is_empty().await);
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_session() {
        let (backend, registry, sink) = setup();
        for id in 1..=3 {
            registry
                .enqueue(guild(id), ChannelId::new(10 + id), sink.clone(), track("A"))
                .await
                .unwrap();
        }
        assert_eq!(registry.len(), 3);

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert_eq!(backend.destroyed(), 3);
        for id in 1..=3 {
            assert!(backend.engine(guild(id)).stops() >= 1);
            assert!(registry.get(guild(id)).is_none());
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_sessions_already_removed() {
        let (backend, registry, sink) = setup();
        registry
            .enqueue(guild(1), ChannelId::new(10), sink.clone(), track("A"))
            .await
            .unwrap();
        let session = registry.get(guild(1)).unwrap();

        registry.shutdown().await;

        // Detenida aunque ya no tenga entrada en el registro
        assert!(!session.is_live());
        assert!(session.snapshot().await.tracks.is_empty());
        assert_eq!(backend.destroyed(), 1);
        assert!(registry.remove(guild(1)).is_none());
    }
}
