use boutique_engine::{events::EventHandlers, traits::StorefrontDatabase, SqliteDatabase};
use boutique_server::{
    config::ServerConfig,
    errors::ServerError,
    integrations::mailer::{log_hooks, mail_hooks, MailerApi},
    server::run_server,
    sweep_worker::start_sweep_worker,
};
use dotenvy::dotenv;
use log::info;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if let Err(e) = config.assert_valid() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    info!("🚀️ Starting boutique server on {}:{}", config.host, config.port);
    match boot(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

async fn boot(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🚀️ Database ready at {}", db.url());

    let hooks = if config.mailer.enabled {
        let mailer = MailerApi::new(config.mailer.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        mail_hooks(mailer)
    } else {
        log_hooks()
    };
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    start_sweep_worker(
        db.clone(),
        producers.clone(),
        config.flow_config(),
        config.closing_warning,
        config.sweep_interval_secs,
    );

    run_server(config, db, producers).await
}
