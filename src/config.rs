use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_API_PORT: u16 = 5000;
const DEFAULT_MARKET: &str = "AU";
const DEFAULT_ANTHEM_URL: &str = "https://www.youtube.com/watch?v=73vP02w3mwo";
const DEFAULT_MAX_PLAYLIST_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // API de estado
    pub api_port: u16,
    pub public_api_url: String,

    // Permisos
    pub dj_role: Option<String>,
    pub dj_ban_role: Option<String>,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_market: String,

    // Comando special
    pub skip_target_user: Option<u64>,
    pub anthem_url: String,

    // Límites
    pub max_playlist_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_port = match var("API_PORT") {
            Some(port) => port.parse().context("API_PORT inválido")?,
            None => DEFAULT_API_PORT,
        };

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            api_port,
            public_api_url: var("PUBLIC_API_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", api_port)),

            dj_role: var("DJ_ROLE"),
            dj_ban_role: var("DJ_BAN_ROLE"),

            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),
            spotify_market: var("SPOTIFY_MARKET").unwrap_or_else(|| DEFAULT_MARKET.to_string()),

            skip_target_user: match var("SKIP_TARGET_USER") {
                Some(id) => Some(id.parse().context("SKIP_TARGET_USER inválido")?),
                None => None,
            },
            anthem_url: var("ANTHEM_URL").unwrap_or_else(|| DEFAULT_ANTHEM_URL.to_string()),

            max_playlist_size: match var("MAX_PLAYLIST_SIZE") {
                Some(size) => size.parse().context("MAX_PLAYLIST_SIZE inválido")?,
                None => DEFAULT_MAX_PLAYLIST_SIZE,
            },
        })
    }

    /// Credenciales de Spotify, si están completas.
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Validates configuration values for correctness.
    ///
    /// - The API port must not be 0
    /// - Playlist size must be between 1 and 100 (Spotify page size)
    /// - Spotify credentials must be given together
    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API port must be greater than 0");
        }

        if self.max_playlist_size == 0 || self.max_playlist_size > 100 {
            anyhow::bail!(
                "Max playlist size must be between 1 and 100, got: {}",
                self.max_playlist_size
            );
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like tokens and secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            API: port {} ({})\n  \
            Roles: DJ={}, Ban={}\n  \
            Spotify: {} (market {})\n  \
            Limits: {} playlist tracks",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.api_port,
            self.public_api_url,
            self.dj_role.as_deref().unwrap_or("-"),
            self.dj_ban_role.as_deref().unwrap_or("-"),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
            self.spotify_market,
            self.max_playlist_size,
        )
    }
}
