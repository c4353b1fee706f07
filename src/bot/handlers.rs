use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    audio::session::{EnqueueOutcome, SessionSnapshot, Transition},
    bot::{sink::ChannelSink, JukeboxBot},
    ui::embeds,
};

const NO_SESSION: &str = "No hay nada reproduciéndose en este servidor";
const EMPTY_QUEUE: &str = "La cola está vacía";
const NOT_PLAYING: &str = "No hay ninguna canción sonando";

/// Cuánto espera `/play` antes de responder sin el resultado del enqueue
const PLAY_REPLY_WAIT: Duration = Duration::from_secs(3);

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "pause" => handle_pause(ctx, &command, guild_id, bot).await?,
        "resume" => handle_resume(ctx, &command, guild_id, bot).await?,
        "skip" => handle_skip(ctx, &command, guild_id, bot).await?,
        "stop" => handle_stop(ctx, &command, guild_id, bot).await?,
        "queue" => handle_queue(ctx, &command, guild_id, bot).await?,
        "volume" => handle_volume(ctx, &command, guild_id, bot).await?,
        "help" => handle_help(ctx, &command).await?,
        _ => reply_warning(ctx, &command, "Comando no reconocido").await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .map(str::trim)
        .unwrap_or_default();

    if query.is_empty() {
        return reply_warning(ctx, command, "Proporciona un enlace o nombre de canción").await;
    }

    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_warning(ctx, command, "Debes estar en un canal de voz").await;
    };

    // Defer la respuesta ya que resolver y conectar puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let requested_by = format!("<@{}>", command.user.id);
    let track = match bot.resolver().resolve(query, &requested_by).await {
        Ok(track) => track,
        Err(e) => {
            warn!("❌ No se pudo resolver '{}': {:?}", query, e);
            let embed = embeds::create_error_embed("Sin resultados", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    let title = track.title().to_string();
    let sink = Arc::new(ChannelSink::new(ctx.http.clone(), command.channel_id));
    let registry = bot.registry().clone();
    let enqueue = tokio::spawn(async move {
        registry
            .enqueue(guild_id, voice_channel_id, sink, track)
            .await
    });

    // El primer track espera el join y la apertura del stream, que no tienen
    // timeout; pasado el plazo se responde y el canal recibe los avisos
    let content = match wait_or_detach(enqueue, PLAY_REPLY_WAIT).await? {
        None => format!(
            "⏳ **{}** agregada, cargando... te aviso en este canal",
            title
        ),
        Some(Ok(outcome)) => play_reply(&title, outcome),
        Some(Err(e)) => {
            warn!("❌ Error al encolar en guild {}: {}", guild_id, e);
            let embed = embeds::create_error_embed("No se pudo reproducir", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(session) = bot.registry().get(guild_id) else {
        return reply_warning(ctx, command, NO_SESSION).await;
    };
    if !session.is_playing().await {
        return reply_warning(ctx, command, NOT_PLAYING).await;
    }

    match session.pause().await {
        Transition::Applied => reply_content(ctx, command, "⏸️ Reproducción pausada").await,
        Transition::Unchanged => reply_warning(ctx, command, "La reproducción ya está pausada").await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(session) = bot.registry().get(guild_id) else {
        return reply_warning(ctx, command, NO_SESSION).await;
    };
    if !session.is_playing().await {
        return reply_warning(ctx, command, NOT_PLAYING).await;
    }

    match session.resume().await {
        Transition::Applied => reply_content(ctx, command, "▶️ Reproducción reanudada").await,
        Transition::Unchanged => {
            reply_warning(ctx, command, "La reproducción ya está en curso").await
        }
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(session) = bot.registry().get(guild_id) else {
        return reply_warning(ctx, command, NO_SESSION).await;
    };

    if session.is_empty().await {
        return reply_warning(ctx, command, EMPTY_QUEUE).await;
    }

    // La cola pudo vaciarse entre la consulta y el skip
    if session.skip().await {
        reply_content(ctx, command, "⏭️ Canción saltada").await
    } else {
        reply_warning(ctx, command, EMPTY_QUEUE).await
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(session) = bot.registry().get(guild_id) else {
        return reply_warning(ctx, command, NO_SESSION).await;
    };

    session.stop().await;

    reply_content(ctx, command, "⏹️ Reproducción detenida y cola limpiada").await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let snapshot = match bot.registry().get(guild_id) {
        Some(session) => Some(session.snapshot().await),
        None => None,
    };
    let snapshot = match require_tracks(snapshot.as_ref()) {
        Ok(snapshot) => snapshot,
        Err(reason) => return reply_warning(ctx, command, reason).await,
    };

    let embed = embeds::create_queue_embed(snapshot, bot.config().queue_preview_len);
    reply_embed(ctx, command, embed).await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(session) = bot.registry().get(guild_id) else {
        return reply_warning(ctx, command, NO_SESSION).await;
    };

    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64());

    let volume = match level {
        Some(level) => {
            let volume = volume_from_level(level);
            session.set_volume(volume).await;
            volume
        }
        None => session.snapshot().await.volume,
    };

    reply_embed(ctx, command, embeds::create_volume_embed(volume)).await
}

async fn handle_help(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_help_embed())
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn play_reply(title: &str, outcome: EnqueueOutcome) -> String {
    match outcome {
        EnqueueOutcome::Started => format!("🎵 Empezando **{}**", title),
        EnqueueOutcome::Queued { position } => {
            format!("📥 **{}** agregada en la posición {}", title, position)
        }
        EnqueueOutcome::Abandoned => {
            "⏹️ La reproducción se detuvo antes de conectar al canal".to_string()
        }
    }
}

/// Espera a `task` como mucho `wait`. Si tarda más devuelve `None` y la
/// tarea sigue en segundo plano.
async fn wait_or_detach<T>(mut task: JoinHandle<T>, wait: Duration) -> Result<Option<T>> {
    match tokio::time::timeout(wait, &mut task).await {
        Ok(joined) => Ok(Some(joined?)),
        Err(_) => Ok(None),
    }
}

fn require_tracks(snapshot: Option<&SessionSnapshot>) -> Result<&SessionSnapshot, &'static str> {
    match snapshot {
        None => Err(NO_SESSION),
        Some(snapshot) if snapshot.tracks.is_empty() => Err(EMPTY_QUEUE),
        Some(snapshot) => Ok(snapshot),
    }
}

/// `/volume` acepta 0-200 (%); el motor trabaja con 0.0-2.0
fn volume_from_level(level: i64) -> f32 {
    (level as f32 / 100.0).clamp(0.0, 2.0)
}

async fn reply_content(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: serenity::builder::CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn reply_warning(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_warning_embed(message))
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::Notice,
        registry::SessionRegistry,
        testing::{guild, track, wait_until, FakeBackend, RecordingSink},
    };
    use pretty_assertions::assert_eq;

    fn snapshot(tracks: usize) -> SessionSnapshot {
        SessionSnapshot {
            tracks: (0..tracks).map(|i| track(&format!("T{}", i))).collect(),
            playing: tracks > 0,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn test_queue_guards() {
        assert_eq!(require_tracks(None), Err(NO_SESSION));
        assert_eq!(require_tracks(Some(&snapshot(0))), Err(EMPTY_QUEUE));

        let listed = snapshot(2);
        assert_eq!(require_tracks(Some(&listed)), Ok(&listed));
    }

    #[test]
    fn test_volume_level_is_clamped() {
        assert_eq!(volume_from_level(50), 0.5);
        assert_eq!(volume_from_level(200), 2.0);
        assert_eq!(volume_from_level(500), 2.0);
        assert_eq!(volume_from_level(-3), 0.0);
    }

    #[test]
    fn test_play_reply() {
        assert_eq!(
            play_reply("Song", EnqueueOutcome::Queued { position: 2 }),
            "📥 **Song** agregada en la posición 2"
        );
        assert!(play_reply("Song", EnqueueOutcome::Started).contains("Song"));
    }

    #[tokio::test]
    async fn test_wait_or_detach_returns_quick_results() {
        let task = tokio::spawn(async { 7 });

        let result = wait_or_detach(task, Duration::from_secs(1)).await.unwrap();

        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn test_stalled_first_track_does_not_hold_the_reply() {
        let backend = Arc::new(FakeBackend::default());
        let registry = SessionRegistry::new(backend.clone());
        let sink = Arc::new(RecordingSink::default());
        let gate = backend.gate_stream(track("A").url());

        let enqueue = tokio::spawn({
            let registry = registry.clone();
            let sink = sink.clone();
            async move {
                registry
                    .enqueue(guild(1), ChannelId::new(10), sink, track("A"))
                    .await
            }
        });

        let result = wait_or_detach(enqueue, Duration::from_millis(50)).await.unwrap();
        assert!(result.is_none());

        // El track ya está en la cola y la carga sigue en segundo plano
        gate.entered.notified().await;
        let session = registry.get(guild(1)).unwrap();
        assert_eq!(session.snapshot().await.tracks, vec![track("A")]);

        gate.release.notify_one();
        wait_until(|| {
            let session = session.clone();
            async move { session.is_playing().await }
        })
        .await;
        assert_eq!(sink.notices(), vec![Notice::NowPlaying { track: track("A") }]);
    }
}
