use super::caller_id;
use crate::domain::models::CreatePostRequest;
use crate::error::ServiceResult;
use crate::state::VotingCore;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub n: Option<usize>,
}

/// POST /api/v1/posts
///
/// Uploads without an `x-user-id` header are stored as anonymous.
pub async fn create_post(
    req: HttpRequest,
    core: web::Data<VotingCore>,
    payload: web::Json<CreatePostRequest>,
) -> ServiceResult<HttpResponse> {
    let author_id = caller_id(&req)?;
    let post = core.posts.create_post(author_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

/// GET /api/v1/feed
///
/// Newest first; each entry carries the caller's own vote when identified.
pub async fn feed(req: HttpRequest, core: web::Data<VotingCore>) -> ServiceResult<HttpResponse> {
    let viewer = caller_id(&req)?;
    let entries = core.ranking.feed_entries(viewer).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// GET /api/v1/leaderboard?n=
pub async fn leaderboard(
    core: web::Data<VotingCore>,
    query: web::Query<LeaderboardQuery>,
) -> ServiceResult<HttpResponse> {
    let n = query.n.unwrap_or(core.settings.leaderboard_default_size);
    let entries = core.ranking.leaderboard_entries(n).await?;
    Ok(HttpResponse::Ok().json(entries))
}
