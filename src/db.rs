use mongodb::{error::Error as MongoError, options::ClientOptions, Client, Database};
use tracing::info;

use crate::config::MongoConfig;
use crate::services::store::{MongoProductStore, StoreError};

pub async fn mongo_client(config: &MongoConfig) -> Result<(Client, Database), MongoError> {
    let mut client_options = ClientOptions::parse(&config.uri).await?;
    client_options.app_name = Some("product-catalog".to_string());

    let client = Client::with_options(client_options)?;
    let db = client.database(&config.database);

    Ok((client, db))
}

/// Connects and makes sure the product indexes exist.
pub async fn product_store(config: &MongoConfig) -> Result<MongoProductStore, StoreError> {
    let (_, db) = mongo_client(config).await?;
    let store = MongoProductStore::new(&db);
    store.ensure_indexes().await?;
    info!(database = %config.database, "connected to MongoDB");
    Ok(store)
}
