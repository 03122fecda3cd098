use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::repo::{MemoryUserStore, PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::storage::{AvatarStorage, LocalAvatarStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub avatars: Arc<dyn AvatarStorage>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("database migrations applied");
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory user store");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        tokio::fs::create_dir_all(&config.avatars.tmp_dir)
            .await
            .with_context(|| format!("create upload dir {}", config.avatars.tmp_dir.display()))?;
        let storage = LocalAvatarStorage::new(&config.avatars.avatars_dir, "avatars");
        storage.ensure_dir().await?;
        info!(
            avatars_dir = %storage.dir().display(),
            tmp_dir = %config.avatars.tmp_dir.display(),
            "avatar directories ready"
        );

        Ok(Self::from_parts(config, users, Arc::new(storage)))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        avatars: Arc<dyn AvatarStorage>,
    ) -> Self {
        Self {
            config,
            users,
            avatars,
        }
    }
}
