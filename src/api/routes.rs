// src/api/routes.rs
use actix_web::web;
use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(handlers::ws_handler))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(handlers::health_check))
                .service(
                    web::scope("/sessions")
                        .route("", web::post().to(handlers::create_session))
                        .route("/{id}", web::get().to(handlers::get_session))
                        .route("/{id}", web::delete().to(handlers::close_session))
                        .route("/{id}/file", web::post().to(handlers::select_file))
                        .route("/{id}/options", web::put().to(handlers::update_options))
                        .route("/{id}/submit", web::post().to(handlers::submit))
                        .route("/{id}/report", web::post().to(handlers::reveal_report))
                        .route("/{id}/artifact", web::get().to(handlers::download_artifact))
                )
        );
}
