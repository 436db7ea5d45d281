use actix_web::{middleware, web, App, HttpServer};
use lightsout::Store;

mod config;
mod error;
mod handlers;
mod views;

use config::ServerConfig;

/// Shared application state
pub struct AppState {
    pub store: Store,
    pub base_path: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    log::info!("Starting Lights Out catalog server");

    let config = ServerConfig::from_env();

    log::info!("Opening store at: {}", config.database_url);
    let store = Store::open(&config.database_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let state = web::Data::new(AppState {
        store,
        base_path: config.base_path.clone(),
    });

    log::info!(
        "Listening on {}:{} under '{}/'",
        config.host,
        config.port,
        config.base_path
    );
    let base_path = config.base_path.clone();
    HttpServer::new(move || {
        let base_path = base_path.clone();
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(move |cfg| handlers::configure(cfg, &base_path))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
