use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{enqueue::Catalog, registry::QueueRegistry};
use crate::bot::SputnikBot;
use crate::config::Config;
use crate::sources::{SourceResolver, SpotifyClient, YouTubeClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sputnik=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🛰️ Iniciando Sputnik v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Fuentes de canciones
    let youtube = Arc::new(YouTubeClient::new());
    let spotify = match config.spotify_credentials() {
        Some((id, secret)) => Some(SpotifyClient::new(id, secret, config.spotify_market.clone())?),
        None => {
            warn!("⚠️ Spotify no configurado, solo se aceptan enlaces y búsquedas de YouTube");
            None
        }
    };
    let resolver = Arc::new(SourceResolver::new(
        youtube.clone(),
        spotify,
        config.max_playlist_size,
    ));
    let catalog = Catalog {
        lookup: youtube.clone(),
        probe: youtube,
    };

    // Registro compartido entre el bot y la API
    let registry = QueueRegistry::new();

    let api_registry = registry.clone();
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_registry, api_port).await {
            error!("❌ La API de estado se detuvo: {:?}", e);
        }
    });

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = SputnikBot::new(config, registry, resolver, catalog);

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
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

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // yt-dlp resuelve todo el audio
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no disponible");
    }
}
