use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use dealer_insights_backend::config::Config;
use dealer_insights_backend::handlers;
use dealer_insights_backend::services::agent::{build_tool_registry, create_provider};
use dealer_insights_backend::services::CrewService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();

    log::info!("Starting Dealer Insights Backend...");
    log::info!(
        "Server starting on http://{}:{}",
        config.server_host,
        config.server_port
    );

    let tools = build_tool_registry(&config)
        .map(Arc::new)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    log::info!("Registered {} tools", tools.len());

    // Without credentials the server still starts; crew routes answer 503
    let provider = config
        .provider_config()
        .and_then(|provider_config| create_provider(provider_config, config.llm_timeout()));
    let crew_service = match provider {
        Ok(provider) => {
            log::info!("Using {} model {}", config.llm_provider, config.model_name());
            CrewService::new(provider, tools, config.agent_max_iterations)
        }
        Err(e) => {
            log::warn!("LLM provider unavailable: {}", e);
            CrewService::without_provider(e.to_string(), tools)
        }
    };
    let crew_service = Arc::new(crew_service);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(crew_service.clone()))
            .configure(handlers::configure)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.server_workers.max(1))
    .run()
    .await
}
