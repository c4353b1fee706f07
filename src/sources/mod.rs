use anyhow::Result;
use songbird::input::{AuxMetadata, Compose, YoutubeDl};
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::track::TrackDescriptor;

const UNKNOWN_TRACK_TITLE: &str = "Canción desconocida";

/// Resuelve lo que escribe el usuario (URL o búsqueda) a un track listo
/// para encolar, usando yt-dlp a través de songbird.
pub struct TrackResolver {
    http: reqwest::Client,
}

impl TrackResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn resolve(&self, query: &str, requested_by: &str) -> Result<TrackDescriptor> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Proporciona un enlace o nombre de canción");
        }

        let mut ytdl = if is_url(query) {
            debug!("🔗 Resolviendo URL: {}", query);
            YoutubeDl::new(self.http.clone(), query.to_string())
        } else {
            debug!("🔍 Buscando: {}", query);
            YoutubeDl::new_search(self.http.clone(), query.to_string())
        };

        let metadata = ytdl
            .aux_metadata()
            .await
            .map_err(|e| anyhow::anyhow!("No se encontraron resultados: {}", e))?;

        let track = track_from_metadata(metadata, requested_by)?;
        info!("✅ Resuelto: {} ({})", track.title(), track.url());
        Ok(track)
    }
}

/// Sólo http(s) cuenta como enlace; lo demás es una búsqueda.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

pub fn track_from_metadata(metadata: AuxMetadata, requested_by: &str) -> Result<TrackDescriptor> {
    let url = metadata
        .source_url
        .ok_or_else(|| anyhow::anyhow!("El resultado no tiene URL reproducible"))?;

    let mut track = TrackDescriptor::new(
        metadata
            .title
            .unwrap_or_else(|| UNKNOWN_TRACK_TITLE.to_string()),
        url,
        metadata.duration.unwrap_or(Duration::ZERO),
        requested_by,
    );

    if let Some(thumbnail) = metadata.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Ok(track)
}
