/// HTTP handlers for voting-service
use crate::error::{ServiceError, ServiceResult};
use actix_web::{web, HttpRequest};
use uuid::Uuid;

pub mod health;
pub mod posts;
pub mod votes;
pub mod watch;

/// Set by the authentication collaborator in front of this service
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .route("/ready", web::get().to(health::ready))
        .service(
            web::scope("/api/v1")
                .route("/posts", web::post().to(posts::create_post))
                .route("/posts/{post_id}/votes", web::post().to(votes::cast_vote))
                .route("/feed", web::get().to(posts::feed))
                .route("/leaderboard", web::get().to(posts::leaderboard))
                .route("/voters/{voter_id}/votes", web::get().to(votes::voter_votes))
                .route("/watch/{resource}", web::get().to(watch::watch)),
        )
        .service(
            web::scope("/admin")
                .route("/scores/reconcile", web::post().to(votes::reconcile_scores)),
        );
}

/// Caller identity from the auth header, None when absent.
///
/// A present but malformed header is rejected rather than treated as
/// anonymous.
pub(crate) fn caller_id(req: &HttpRequest) -> ServiceResult<Option<Uuid>> {
    let Some(value) = req.headers().get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| ServiceError::InvalidInput("Invalid x-user-id header".into()))?;

    Uuid::parse_str(value)
        .map(Some)
        .map_err(|_| ServiceError::InvalidInput("Invalid x-user-id header value".into()))
}
