use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::player::AudioPlayer;
use crate::bot::MusicBot;
use crate::config::Config;
use crate::sources::{default_resolver, YouTubeClient};
use crate::storage::PlaylistBook;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("noretry_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando No-Retry Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let search = YouTubeClient::new(config.ytdlp_path.clone(), config.api_timeout());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&search).await;
    }

    let resolver = default_resolver(&config)?;
    info!("🔗 Proveedores de stream: {}", resolver.provider_names().join(" → "));

    let playlists = PlaylistBook::load(config.playlists_path.as_deref()).await?;
    let player = AudioPlayer::new(&config, resolver, search);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let token = config.discord_token.clone();
    let handler = MusicBot::new(config, player, playlists);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(search: &YouTubeClient) -> Result<()> {
    // Verificar dependencias críticas
    let version = search.verify().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
