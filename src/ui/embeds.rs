use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    backend::Notice,
    session::SessionSnapshot,
    track::{queue_lines, TrackDescriptor},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Límite de Discord para la descripción de un embed
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Embed correspondiente a cada aviso de una sesión
pub fn notice_embed(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying { track } => create_now_playing_embed(track),
        Notice::Queued { track, position } => create_track_queued_embed(track, *position),
        Notice::StreamFailed { track, reason } => create_error_embed(
            "No se pudo reproducir",
            &format!(
                "**{}**\n{}\n\n💡 Usa `/skip` para pasar a la siguiente",
                track.title(),
                reason
            ),
        ),
        Notice::PlaybackError { track, reason } => create_error_embed(
            "Error durante la reproducción",
            &format!("**{}** se descartó de la cola\n{}", track.title(), reason),
        ),
        Notice::ConnectionFailed { dropped, reason } => create_error_embed(
            "No se pudo conectar al canal de voz",
            &format!(
                "Se descartaron {} canciones de la cola\n{}\n\n💡 Usa `/play` para intentarlo de nuevo",
                dropped.len(),
                reason
            ),
        ),
    }
}

pub fn create_now_playing_embed(track: &TrackDescriptor) -> CreateEmbed {
    track_embed(track)
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_track_queued_embed(track: &TrackDescriptor, position: usize) -> CreateEmbed {
    track_embed(track)
        .title("✅ Canción Agregada a la Cola")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title()
        ))
        .color(colors::MUSIC_PURPLE)
        .field("📍 Posición", position.to_string(), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
}

fn track_embed(track: &TrackDescriptor) -> CreateEmbed {
    let duration = if track.duration().is_zero() {
        "🔴 En vivo".to_string()
    } else {
        track.formatted_duration()
    };

    let mut embed = CreateEmbed::default()
        .field("⏱️ Duración", duration, true)
        .field("👤 Solicitado por", track.requested_by(), true)
        .url(track.url())
        .timestamp(Timestamp::now());

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

/// Listado de cola: las primeras `limit` entradas, la que suena primero.
pub fn create_queue_embed(snapshot: &SessionSnapshot, limit: usize) -> CreateEmbed {
    let tracks = &snapshot.tracks;
    let description = queue_description(&queue_lines(tracks, limit), tracks.len());

    let status = if !snapshot.connected {
        "🔌 Conectando"
    } else if snapshot.paused {
        "⏸️ En pausa"
    } else if snapshot.playing {
        "▶️ Sonando"
    } else {
        "⏳ Esperando"
    };

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(description)
        .color(colors::INFO_BLUE)
        .field("Estado", status, true)
        .field(
            "🔊 Volumen",
            format!("{}%", (snapshot.volume * 100.0).round() as u32),
            true,
        )
        .footer(CreateEmbedFooter::new(format!(
            "Total: {} canciones • Guild Jukebox",
            tracks.len()
        )))
        .timestamp(Timestamp::now())
}

/// Une las líneas del listado sin pasarse del límite de Discord; lo que no
/// entra se resume en una última línea con lo que falta.
fn queue_description(lines: &[String], total: usize) -> String {
    // Reserva para la línea de resumen
    const SUMMARY_RESERVE: usize = 32;

    let mut description = String::new();
    let mut shown = 0;
    for line in lines {
        let needed = line.chars().count() + usize::from(shown > 0);
        if description.chars().count() + needed > EMBED_DESCRIPTION_LIMIT - SUMMARY_RESERVE {
            break;
        }
        if shown > 0 {
            description.push('\n');
        }
        description.push_str(line);
        shown += 1;
    }

    if total > shown {
        description.push_str(&format!("\n… y {} más", total - shown));
    }
    description
}

pub fn create_volume_embed(volume: f32) -> CreateEmbed {
    let percent = (volume * 100.0).round() as u32;
    let icon = match percent {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volumen", icon))
        .description(format!("**{}%**", percent))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .description("Una cola de reproducción por servidor, alimentada con yt-dlp")
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o encola una canción\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip` - Salta a la siguiente canción\n\
            • `/stop` - Detiene, limpia la cola y sale del canal",
            false,
        )
        .field(
            "📜 Cola y Audio",
            "• `/queue` - Muestra la cola\n\
            • `/volume [nivel]` - Muestra o ajusta el volumen (0-200)",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de aviso para comandos que no aplican en el estado actual
pub fn create_warning_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ Atención")
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
