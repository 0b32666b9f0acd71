use actix_web::{middleware, web, App, HttpServer};
use log::info;
use tokio_util::sync::CancellationToken;

use dropbin::app_state::AppState;
use dropbin::config::AppConfig;
use dropbin::service::configure;
use dropbin::service::expiration_worker::ExpirationWorker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let (config, source) = AppConfig::load()?;
    dropbin::logging::init(&config.logging)?;
    info!("{}", source);
    info!("Using {:?} storage backend", config.storage.backend);

    let app_state = AppState::from_config(config)?;
    let server_config = app_state.config.server.clone();

    let shutdown = CancellationToken::new();
    let worker = if app_state.config.expiration.enabled {
        let worker = ExpirationWorker::from_config(app_state.store.clone(), &app_state.config.expiration);
        Some(worker.start_background(shutdown.clone()))
    } else {
        info!("Expiration worker disabled");
        None
    };

    info!("Starting server on {}:{}", server_config.host, server_config.port);
    let data = web::Data::new(app_state);
    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(configure)
    })
    .workers(server_config.workers.max(1))
    .bind((server_config.host.as_str(), server_config.port))?
    .run()
    .await;

    shutdown.cancel();
    if let Some(worker) = worker {
        let _ = worker.await;
    }
    info!("Server stopped");
    result
}
