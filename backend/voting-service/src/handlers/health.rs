use crate::state::VotingCore;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::warn;

/// GET /health - process is up
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// GET /ready - the post store answers
pub async fn ready(core: web::Data<VotingCore>) -> HttpResponse {
    match core.posts.ping().await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": e.to_string(),
            }))
        }
    }
}
