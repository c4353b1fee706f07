use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Más entradas que esto no caben en la descripción de un embed
pub const MAX_QUEUE_PREVIEW_LEN: usize = 25;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // UI
    pub queue_preview_len: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,

            // UI
            queue_preview_len: std::env::var("QUEUE_PREVIEW_LEN")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - The queue preview must show between 1 and [`MAX_QUEUE_PREVIEW_LEN`] tracks
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.queue_preview_len == 0 {
            anyhow::bail!("Queue preview length must be greater than 0");
        }

        if self.queue_preview_len > MAX_QUEUE_PREVIEW_LEN {
            anyhow::bail!(
                "Queue preview length cannot exceed {}, got: {}",
                MAX_QUEUE_PREVIEW_LEN,
                self.queue_preview_len
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            UI: {} tracks in queue preview",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.queue_preview_len,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            default_volume: 0.5,
            queue_preview_len: 10,
        }
    }
}
