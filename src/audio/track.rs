use std::time::Duration;

/// Canción ya resuelta, lista para encolar.
///
/// Se construye una vez a partir de lo que devuelve el resolver y no se
/// modifica nunca: el hueco de la cola que la contiene es su único dueño.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    title: String,
    url: String,
    duration: Duration,
    thumbnail: Option<String>,
    requested_by: String,
}

impl TrackDescriptor {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        duration: Duration,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            // Sólo segundos enteros
            duration: Duration::from_secs(duration.as_secs()),
            thumbnail: None,
            requested_by: requested_by.into(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    /// Duración formateada (`m:ss` o `h:mm:ss`)
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }
}

/// Formatea una duración como `m:ss`, o `h:mm:ss` a partir de una hora.
fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Líneas del listado de cola: la posición 0 se marca con ▶️, el resto con
/// su índice. Sólo se devuelven las primeras `limit` entradas.
pub fn queue_lines(tracks: &[TrackDescriptor], limit: usize) -> Vec<String> {
    tracks
        .iter()
        .take(limit)
        .enumerate()
        .map(|(position, track)| {
            let marker = if position == 0 {
                "▶️".to_string()
            } else {
                format!("{}.", position)
            };
            format!(
                "{} [{}]({}) - `{}`",
                marker,
                track.title(),
                track.url(),
                track.formatted_duration()
            )
        })
        .collect()
}
