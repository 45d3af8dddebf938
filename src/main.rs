use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{error, info};

use forensic_audio_service::api;
use forensic_audio_service::config::Cli;
use forensic_audio_service::pipeline::JobCoordinator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (bind, port) = (cli.bind.clone(), cli.port);
    let config = cli.into_config().map_err(|e| {
        error!("{}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    info!(
        "Stage budgets: classification {}s, separation {}s; work root {:?}; simulation {}",
        config.classification_timeout.as_secs(),
        config.separation_timeout.as_secs(),
        config.work_root,
        if config.simulation_enabled { "enabled" } else { "disabled" }
    );

    api::v1::init_start_time();
    let coordinator = web::Data::new(JobCoordinator::with_process_engines(config));

    info!("Listening on {}:{}", bind, port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(coordinator.clone())
            .configure(api::config)
    })
    .bind((bind.as_str(), port))?
    .run()
    .await
}
