use crate::domain::models::{NewVote, Vote, VoteDirection};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Typed access to the vote ledger, one record per (voter, post)
///
/// Writes are conditional: each one names the state the caller decided
/// against and fails with [`ServiceError::Conflict`] when the ledger moved on.
#[async_trait]
pub trait VoteLedger: Send + Sync {
    async fn get_vote(&self, voter_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Vote>>;

    /// Conflict if the pair already has a vote
    async fn insert_vote(&self, vote: NewVote) -> ServiceResult<Vote>;

    /// Conflict unless the vote still exists with direction `expected`
    async fn update_vote_direction(
        &self,
        vote_id: Uuid,
        expected: VoteDirection,
        direction: VoteDirection,
    ) -> ServiceResult<Vote>;

    /// Conflict unless the vote still exists with direction `expected`
    async fn delete_vote(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<()>;

    async fn list_votes_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<Vote>>;

    async fn list_votes_for_voter(&self, voter_id: Uuid) -> ServiceResult<Vec<Vote>>;
}

/// Ledger backed by the `votes` table (UNIQUE (voter_id, post_id))
#[derive(Clone)]
pub struct PgVoteLedger {
    pool: PgPool,
}

impl PgVoteLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoteLedger for PgVoteLedger {
    async fn get_vote(&self, voter_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Vote>> {
        let vote = sqlx::query_as::<_, Vote>(
            r#"
            SELECT id, voter_id, post_id, direction, created_at
            FROM votes
            WHERE voter_id = $1 AND post_id = $2
            "#,
        )
        .bind(voter_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vote)
    }

    async fn insert_vote(&self, vote: NewVote) -> ServiceResult<Vote> {
        let inserted = sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (voter_id, post_id, direction)
            VALUES ($1, $2, $3)
            ON CONFLICT (voter_id, post_id) DO NOTHING
            RETURNING id, voter_id, post_id, direction, created_at
            "#,
        )
        .bind(vote.voter_id)
        .bind(vote.post_id)
        .bind(vote.direction)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_foreign_key_violation() => {
                ServiceError::NotFound(format!("post {}", vote.post_id))
            }
            _ => ServiceError::Database(e),
        })?;

        inserted.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "voter {} already has a vote on post {}",
                vote.voter_id, vote.post_id
            ))
        })
    }

    async fn update_vote_direction(
        &self,
        vote_id: Uuid,
        expected: VoteDirection,
        direction: VoteDirection,
    ) -> ServiceResult<Vote> {
        let updated = sqlx::query_as::<_, Vote>(
            r#"
            UPDATE votes
            SET direction = $3, created_at = NOW()
            WHERE id = $1 AND direction = $2
            RETURNING id, voter_id, post_id, direction, created_at
            "#,
        )
        .bind(vote_id)
        .bind(expected)
        .bind(direction)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            ServiceError::Conflict(format!("vote {} is no longer {}", vote_id, expected))
        })
    }

    async fn delete_vote(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM votes
            WHERE id = $1 AND direction = $2
            "#,
        )
        .bind(vote_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::Conflict(format!(
                "vote {} is no longer {}",
                vote_id, expected
            )));
        }

        Ok(())
    }

    async fn list_votes_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<Vote>> {
        let votes = sqlx::query_as::<_, Vote>(
            r#"
            SELECT id, voter_id, post_id, direction, created_at
            FROM votes
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }

    async fn list_votes_for_voter(&self, voter_id: Uuid) -> ServiceResult<Vec<Vote>> {
        let votes = sqlx::query_as::<_, Vote>(
            r#"
            SELECT id, voter_id, post_id, direction, created_at
            FROM votes
            WHERE voter_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }
}
