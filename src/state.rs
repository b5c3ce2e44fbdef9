use std::{future::Future, sync::Arc};

use crate::{
    auth::{jwt::JwtKeys, repo::PgUserStore, repo::UserStore, AuthService},
    books::{
        files::Blobs,
        repo::{BookStore, PgBookStore},
    },
    config::AppConfig,
    db::{self, bounded, StoreError},
    error::AppError,
    storage::{self, BlobStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
    pub books: Arc<dyn BookStore>,
    pub storage: Arc<dyn BlobStore>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let storage = storage::from_config(&config.storage).await?;
        let users = Arc::new(PgUserStore::new(pool.clone())) as Arc<dyn UserStore>;
        let books = Arc::new(PgBookStore::new(pool)) as Arc<dyn BookStore>;

        Ok(Self::from_parts(Arc::new(config), users, books, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        books: Arc<dyn BookStore>,
        storage: Arc<dyn BlobStore>,
    ) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let auth = AuthService::new(users, keys, config.store_timeout());
        Self {
            config,
            auth,
            books,
            storage,
        }
    }

    pub fn blobs(&self) -> Blobs<'_> {
        Blobs::new(&*self.storage, self.config.store_timeout())
    }

    /// Bounded store call for handlers outside the auth boundary.
    pub async fn store<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(bounded(self.config.store_timeout(), fut).await?)
    }
}
