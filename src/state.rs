use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::repositories::{
    ChecklistRepository, PgChecklistRepository, PgQuestionRepository, PgSessionRepository,
    PgStoreRepository, PgUserRepository, QuestionRepository, SessionRepository, StoreRepository,
    UserRepository,
};
use crate::services::identity_provider::{AzureIdentityProvider, IdentityProvider};
use crate::services::images::ImageStore;
use crate::services::sessions::SessionManager;

/// The persistence and provider handles a running application needs.
pub struct Backends {
    pub sessions: Arc<dyn SessionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub checklists: Arc<dyn ChecklistRepository>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Session lifecycle over the session repository.
    pub sessions: SessionManager,
    pub users: Arc<dyn UserRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub checklists: Arc<dyn ChecklistRepository>,
    /// The external identity provider.
    pub identity: Arc<dyn IdentityProvider>,
    /// Where checklist photos are written.
    pub images: ImageStore,
}

impl AppState {
    /// Creates the production state: one PostgreSQL pool shared by every
    /// repository, and the Microsoft identity platform client.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_size)?;
        // Fail at startup rather than on the first request.
        drop(db.get().await?);
        tracing::info!(
            "PostgreSQL pool initialized (max {} connections)",
            config.db_pool_size
        );

        let backends = Backends {
            sessions: Arc::new(PgSessionRepository::new(db.clone())),
            users: Arc::new(PgUserRepository::new(db.clone())),
            questions: Arc::new(PgQuestionRepository::new(db.clone())),
            stores: Arc::new(PgStoreRepository::new(db.clone())),
            checklists: Arc::new(PgChecklistRepository::new(db)),
            identity: Arc::new(AzureIdentityProvider::new(config.oauth.clone())),
        };

        tokio::fs::create_dir_all(&config.upload_dir).await?;
        tracing::info!("Image store at {}", config.upload_dir.display());

        Ok(Self::from_backends(config.clone(), backends))
    }

    /// Assembles the state from already-built backends.
    pub fn from_backends(config: Config, backends: Backends) -> Self {
        let sessions = SessionManager::new(backends.sessions, config.session_ttl());
        let images = ImageStore::new(config.upload_dir.clone(), config.max_image_bytes);

        AppState {
            config,
            sessions,
            users: backends.users,
            questions: backends.questions,
            stores: backends.stores,
            checklists: backends.checklists,
            identity: backends.identity,
            images,
        }
    }
}
