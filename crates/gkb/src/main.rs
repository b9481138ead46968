use std::sync::Arc;

use gkb_core::{
    config::Config,
    ports::{CatalogStore, CredentialStore, SessionStore},
};
use gkb_mongo::{MongoCatalogStore, MongoCredentialStore, MongoSessionStore};

#[tokio::main]
async fn main() -> Result<(), gkb_core::Error> {
    gkb_core::logging::init("gkb")?;

    let cfg = Arc::new(Config::load()?);

    let db = gkb_mongo::connect(&cfg.mongodb_uri, &cfg.mongodb_database).await?;
    tracing::info!(database = %cfg.mongodb_database, "connected to MongoDB");

    let sessions: Arc<dyn SessionStore> = Arc::new(MongoSessionStore::new(&db));
    let catalog: Arc<dyn CatalogStore> = Arc::new(MongoCatalogStore::new(&db));
    let credentials: Arc<dyn CredentialStore> = Arc::new(MongoCredentialStore::new(&db));

    gkb_telegram::router::run_polling(cfg, sessions, catalog, credentials)
        .await
        .map_err(|e| gkb_core::Error::Transport(format!("telegram bot failed: {e}")))?;

    Ok(())
}
