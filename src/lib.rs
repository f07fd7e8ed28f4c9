use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::Method,
    rt, web, App, HttpServer,
};
use std::{
    io::{Error, ErrorKind},
    sync::Arc,
};
use tracing::{info, warn};

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod telemetry;

use config::{AppConfig, SecurityConfig, StoreBackend};
use middleware::{RateLimit, RateLimiter, RequestLogger};
use services::catalog::ProductCatalog;
use services::store::{DynProductStore, InMemoryProductStore};

pub const PRODUCTS_PATH: &str = "/api/products";

/// Everything a worker needs, shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: ProductCatalog,
    pub security: Arc<SecurityConfig>,
    general_limiter: Arc<RateLimiter>,
    create_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(store: DynProductStore, security: SecurityConfig) -> Self {
        Self {
            catalog: ProductCatalog::new(store),
            general_limiter: Arc::new(RateLimiter::new(security.general_policy())),
            create_limiter: Arc::new(RateLimiter::new(security.create_policy())),
            security: Arc::new(security),
        }
    }

    fn limiters(&self) -> [Arc<RateLimiter>; 2] {
        [
            Arc::clone(&self.general_limiter),
            Arc::clone(&self.create_limiter),
        ]
    }
}

pub fn build_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::new(state.catalog.clone()))
        .app_data(handlers::json_config(state.security.json_body_limit))
        .wrap(middleware::security_headers())
        .wrap(middleware::cors(&state.security))
        .wrap(RequestLogger)
        .configure(handlers::configure)
        .service(
            web::scope("/api")
                .wrap(RateLimit::route(
                    Arc::clone(&state.create_limiter),
                    Method::POST,
                    PRODUCTS_PATH,
                ))
                .wrap(RateLimit::any(Arc::clone(&state.general_limiter)))
                .configure(handlers::product::configure),
        )
        .default_service(web::to(handlers::not_found))
}

async fn connect_store(config: &AppConfig) -> Result<DynProductStore, Error> {
    match (config.store, config.mongo.as_ref()) {
        (StoreBackend::Mongo, Some(mongo)) => {
            let store = db::product_store(mongo)
                .await
                .map_err(|err| Error::new(ErrorKind::Other, format!("Error connecting to MongoDB: {err}")))?;
            Ok(Arc::new(store))
        }
        (StoreBackend::Mongo, None) => Err(Error::new(
            ErrorKind::InvalidInput,
            "MongoDB settings are missing",
        )),
        (StoreBackend::Memory, _) => {
            warn!("using the in-memory product store; data is lost on shutdown");
            Ok(Arc::new(InMemoryProductStore::new()))
        }
    }
}

pub async fn run() -> Result<(), Error> {
    let config = AppConfig::from_env()
        .map_err(|err| Error::new(ErrorKind::InvalidInput, format!("Error loading config: {err}")))?;
    telemetry::init_tracing(&config);

    let store = connect_store(&config).await?;
    let state = AppState::new(store, config.security.clone());

    for limiter in state.limiters() {
        let every = limiter.policy().window;
        rt::spawn(async move {
            let mut ticker = rt::time::interval(every);
            loop {
                ticker.tick().await;
                limiter.purge_expired();
            }
        });
    }

    let (host, port) = config.bind_address();
    info!(%host, port, backend = ?config.store, "starting server");

    HttpServer::new(move || build_app(state.clone()))
        .bind((host.as_str(), port))?
        .run()
        .await
}
