use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Reject tokens that no longer match the one stored on the user (e.g. after logout).
    pub enforce_stored_token: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarConfig {
    pub avatars_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    pub avatars: AvatarConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userhub-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(23 * 60),
        };
        let auth = AuthConfig {
            enforce_stored_token: std::env::var("AUTH_ENFORCE_STORED_TOKEN")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        let public_dir = PathBuf::from(std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".into()));
        let avatars = AvatarConfig {
            avatars_dir: std::env::var("AVATARS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| public_dir.join("avatars")),
            tmp_dir: PathBuf::from(std::env::var("UPLOAD_TMP_DIR").unwrap_or_else(|_| "tmp".into())),
            max_bytes: std::env::var("AVATAR_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(5 * 1024 * 1024),
        };
        Ok(Self {
            database_url,
            jwt,
            auth,
            avatars,
        })
    }
}
