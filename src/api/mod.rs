//! API HTTP de solo lectura con el estado de cada cola.
//!
//! - `GET /` saludo
//! - `GET /{guild_id}` estado de la cola, o 400 si la guild no tiene cola

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serenity::model::id::GuildId;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

pub mod status;

use self::status::{ErrorBody, QueueStatus};
use crate::audio::registry::QueueRegistry;

pub fn router(registry: QueueRegistry) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/{guild_id}", get(queue_status))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

/// Sirve la API hasta que el proceso termine.
pub async fn serve(registry: QueueRegistry, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 API de estado escuchando en {}", addr);
    axum::serve(listener, router(registry)).await?;
    Ok(())
}

async fn hello() -> &'static str {
    "Hello World"
}

async fn queue_status(
    State(registry): State<QueueRegistry>,
    Path(guild_id): Path<String>,
) -> Response {
    let queue = guild_id
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .and_then(|id| registry.get(GuildId::new(id)));

    match queue {
        Some(queue) => Json(QueueStatus::from(queue.as_ref())).into_response(),
        None => {
            debug!("Consulta de estado para cola inexistente: {}", guild_id);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Invalid Queue ID",
                }),
            )
                .into_response()
        }
    }
}
