use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod catalogue;
mod config;
mod error;
mod sources;
mod storage;
mod ui;

use crate::audio::player::AudioPlayer;
use crate::audio::registry::SessionRegistry;
use crate::audio::transport::SongbirdTransportFactory;
use crate::bot::{ChatNotifier, JukeboxBot};
use crate::catalogue::UploadCatalogue;
use crate::config::Config;
use crate::sources::{LocalFileProbe, SourceResolver, YtDlpClient};
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let ytdlp = YtDlpClient::new(
        config.ytdlp_path.clone(),
        config.cache_dir.clone(),
        config.resolve_timeout,
        config.max_song_duration,
    );

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let version = ytdlp.verify().await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    match ytdlp.verify().await {
        Ok(version) => info!("✅ yt-dlp {} disponible", version),
        Err(e) => warn!("⚠️ yt-dlp no responde, los enlaces fallarán: {:?}", e),
    }
    ytdlp.purge_stale().await;

    // Catálogo de archivos subidos
    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);
    let catalogue = Arc::new(UploadCatalogue::load(storage, config.uploads_dir.clone()).await);

    // Núcleo de reproducción
    let songbird = Songbird::serenity();
    let notifier = ChatNotifier::spawn(Arc::new(Http::new(&config.discord_token)));
    let sessions = SessionRegistry::new(
        config.session_settings(),
        Arc::new(SongbirdTransportFactory::new(songbird.clone())),
        Arc::new(SourceResolver::new(ytdlp, LocalFileProbe::new())),
        notifier.clone(),
    );
    let player = Arc::new(AudioPlayer::new(sessions, catalogue, config.queue_page_size));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = JukeboxBot::new(config.clone(), player, notifier);
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
