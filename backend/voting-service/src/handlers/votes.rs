use super::caller_id;
use crate::domain::models::VoteDirection;
use crate::error::ServiceResult;
use crate::state::VotingCore;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub direction: VoteDirection,
}

/// POST /api/v1/posts/{post_id}/votes
///
/// Same direction twice removes the vote, the opposite direction switches it.
pub async fn cast_vote(
    req: HttpRequest,
    core: web::Data<VotingCore>,
    path: web::Path<Uuid>,
    payload: web::Json<CastVoteRequest>,
) -> ServiceResult<HttpResponse> {
    let voter_id = caller_id(&req)?;
    let outcome = core
        .votes
        .cast_vote(voter_id, path.into_inner(), payload.direction)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /api/v1/voters/{voter_id}/votes - post id -> direction
pub async fn voter_votes(
    core: web::Data<VotingCore>,
    path: web::Path<Uuid>,
) -> ServiceResult<HttpResponse> {
    let votes = core.ranking.viewer_votes(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(votes))
}

/// POST /admin/scores/reconcile
pub async fn reconcile_scores(core: web::Data<VotingCore>) -> ServiceResult<HttpResponse> {
    let report = core.aggregator.reconcile_all().await?;
    Ok(HttpResponse::Ok().json(report))
}
