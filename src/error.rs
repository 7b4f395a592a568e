use thiserror::Error;

/// Errores del motor de colas y de la resolución de canciones.
///
/// Los errores de audio/metadata se recuperan dentro del motor (saltando la
/// canción); los de comando se convierten en respuestas para el usuario en
/// [`crate::bot::handlers`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    /// La búsqueda en el catálogo falló o no devolvió nada.
    #[error("no se pudo obtener la metadata de {url}: {reason}")]
    MetadataUnavailable { url: String, reason: String },

    /// No se pudo preparar el stream decodificable de una canción ya encolada.
    #[error("no se pudo preparar el audio de {url}: {reason}")]
    AudioUnavailable { url: String, reason: String },

    /// La conexión de voz no llegó a `ready` dentro del tiempo límite.
    #[error("la conexión de voz no estuvo lista a tiempo")]
    TransportUnready,

    /// No hay cola registrada para la guild.
    #[error("Not playing in this server!")]
    NoActiveSession,

    /// El chequeo de roles del front end rechazó el comando.
    #[error("permiso denegado: {0}")]
    PermissionDenied(String),

    /// La sesión se destruyó (reintentos agotados, expulsión) antes de estar lista.
    #[error("la conexión de voz falló definitivamente")]
    TransportFatal,

    /// Fallo del adaptador de voz al ejecutar una orden.
    #[error("error de transporte: {0}")]
    Transport(String),

    /// El reproductor rechazó el recurso de audio.
    #[error("error de reproducción: {0}")]
    Playback(String),
}

impl MusicError {
    pub fn metadata(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MetadataUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn audio(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::AudioUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
