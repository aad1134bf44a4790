pub mod crews;
pub mod tools;

use actix_web::{web, HttpResponse};

use crate::error::AppError;

/// Route table shared by the server binary and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health_check))
        .route("/run-competitor", web::post().to(crews::run_competitor))
        .route("/run-opportunity", web::post().to(crews::run_opportunity))
        .route("/tools", web::get().to(tools::list_tools))
        .route("/tools/{name}", web::post().to(tools::invoke_tool));
}

/// Malformed or incomplete JSON bodies become 400s with a JSON error body.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into())
}

// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Dealer Insights Backend",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
