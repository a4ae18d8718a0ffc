//! # Bot Module
//!
//! Discord side of the music bot: text command routing and gateway events.
//!
//! ## Architecture
//!
//! The bot is built around the [`MusicBot`] struct which implements
//! Serenity's [`EventHandler`] trait:
//!
//! - `message`: prefix commands are parsed by [`commands::Command::parse`] and
//!   routed by [`handlers::handle_command`]
//! - `voice_state_update`: an external disconnect of the bot tears the guild
//!   queue down
//! - `ready`: sets the activity and starts the hourly maintenance task
//!
//! Playback itself lives in [`AudioPlayer`]; songbird track events reach it
//! through [`events::TrackEventRelay`].

use serenity::{
    all::{ActivityData, Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::player::{AudioPlayer, VoiceLink},
    config::Config,
    storage::PlaylistBook,
    ui::embeds,
};
use commands::Command;

/// Intervalo de las tareas de mantenimiento
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, prefix, limits)
/// - `player`: Playback for every guild; cheap to clone
/// - `playlists`: Named playlists available to `askloop`
pub struct MusicBot {
    pub config: Arc<Config>,
    pub player: AudioPlayer,
    pub playlists: Arc<PlaylistBook>,
}

impl MusicBot {
    pub fn new(config: Config, player: AudioPlayer, playlists: PlaylistBook) -> Self {
        Self {
            config: Arc::new(config),
            player,
            playlists: Arc::new(playlists),
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    /// Called when the bot is ready and connected to Discord.
    ///
    /// Sets the activity status and starts the background maintenance task.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Establecer estado del bot
        ctx.set_activity(Some(ActivityData::listening(format!(
            "{}help",
            self.config.command_prefix
        ))));

        let player = self.player.clone();
        tokio::spawn(async move {
            maintenance_tasks(player).await;
        });
    }

    /// Routes prefix commands; bots, DMs and unknown commands are ignored.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }

        let Some(command) = Command::parse(&msg.content, &self.config.command_prefix) else {
            return;
        };

        if let Err(e) = handlers::handle_command(&ctx, &msg, command, self).await {
            error!("Error manejando comando: {:?}", e);
            let embed = embeds::error_embed(
                "Error inesperado",
                "No se pudo completar el comando. Inténtalo de nuevo en un momento.",
            );
            if let Err(e) = handlers::send_embed(&ctx, msg.channel_id, embed).await {
                warn!("⚠️ No se pudo enviar el mensaje de error: {:?}", e);
            }
        }
    }

    /// Handles voice state updates for the bot itself.
    ///
    /// When the bot leaves voice without a `stop` (kicked, channel deleted),
    /// the guild queue is torn down.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if !self.player.has_queue(guild_id) {
            debug!("🔌 Desconexión en guild {} sin cola activa", guild_id);
            return;
        }

        match VoiceLink::from_context(&ctx).await {
            Ok(link) => {
                let left_channel = old.and_then(|state| state.channel_id);
                self.player.handle_disconnect(&link, guild_id, left_channel).await;
            }
            Err(e) => error!("Error al limpiar la cola tras la desconexión: {:?}", e),
        }
    }
}

/// Runs periodic maintenance tasks in the background.
///
/// Every hour: checks that yt-dlp still runs and logs playback and learning
/// stats. Failures are logged as warnings and never stop the cycle.
async fn maintenance_tasks(player: AudioPlayer) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        // Verificar dependencias yt-dlp
        match player.verify_sources().await {
            Ok(version) => debug!("✅ yt-dlp {} disponible", version),
            Err(e) => warn!("Error verificando dependencias: {:?}", e),
        }

        let learner = player.learner();
        info!(
            "🧹 Mantenimiento: {} colas activas, {} reproducciones, {} duraciones aprendidas ({} confiables)",
            player.active_queues(),
            player.history().total(),
            learner.len(),
            learner.trusted_count()
        );
    }
}
