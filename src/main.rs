// src/main.rs
mod allocator;
mod api;
mod config;
mod estimator;
mod insurance;
mod manual;
mod model;
mod registry;
mod types;

use config::AppConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let api_config = app_config.api.clone();
    let engine_config = app_config.engine.clone();
    let estimator_config = app_config.estimator.clone();

    println!("🚀 Allocation service starting...");
    api::start_api_server(api_config, engine_config, estimator_config).await;
}
