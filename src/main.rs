use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;

use hashlink::api::{self, AppState};
use hashlink::config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let cfg = Config::from_env();
    let state = web::Data::new(AppState::from_config(&cfg)?);

    info!(
        "⛓️ Starting hashlink API at http://{}:{} (difficulty={}, storage={})",
        cfg.host,
        cfg.port,
        cfg.difficulty,
        state.ledger.storage_kind()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((cfg.host.as_str(), cfg.port))?
    .run()
    .await
}
