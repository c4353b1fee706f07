//! # Bot Module
//!
//! Discord side of the jukebox: slash-command registration, command
//! dispatch and the gateway events that matter to playback.
//!
//! The [`JukeboxBot`] handler owns the [`SessionRegistry`] shared by every
//! command, so all guilds go through the same registry and each guild gets
//! exactly one playback session at a time.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod sink;

use crate::{
    audio::{driver::SongbirdBackend, registry::SessionRegistry},
    config::Config,
    sources::TrackResolver,
};

pub type Registry = SessionRegistry<SongbirdBackend>;

/// Main Discord event handler.
///
/// - `config`: Bot configuration (tokens, defaults)
/// - `registry`: One playback session per guild
/// - `resolver`: Turns `/play` queries into tracks
pub struct JukeboxBot {
    config: Arc<Config>,
    registry: Arc<Registry>,
    resolver: TrackResolver,
}

impl JukeboxBot {
    pub fn new(config: Config, registry: Arc<Registry>, resolver: TrackResolver) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            resolver,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.resolver
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second;
    /// global ones can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si sacan al bot del canal de voz, la sesión del guild se abandona.
    /// Songbird también avisa por su lado; la segunda señal no hace nada.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if let Some(session) = self.registry.get(guild_id) {
            debug!(
                "Abandonando sesión del canal {} en guild {}",
                session.voice_channel(),
                guild_id
            );
            session.on_disconnected().await;
        }
    }
}
