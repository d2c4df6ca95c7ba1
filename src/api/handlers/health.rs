// src/api/handlers/health.rs
use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use crate::api::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let segmentation_service = match state.api.health().await {
        Ok(health) => json!(health),
        Err(e) => {
            log::warn!("Segmentation service health probe failed: {}", e);
            json!({ "status": "unreachable", "error": e.to_string() })
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "liverseg",
        "version": env!("CARGO_PKG_VERSION"),
        "api_base": state.config.service.api_base,
        "segmentation_service": segmentation_service
    })))
}
