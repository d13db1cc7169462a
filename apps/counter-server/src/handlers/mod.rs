//! HTTP handlers and route configuration.

mod counter;
mod health;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Counter actor RPC
            .service(
                web::scope("/counters")
                    .app_data(web::JsonConfig::default().error_handler(counter::json_error))
                    .route("/{key}", web::post().to(counter::call_counter)),
            ),
    );
}
