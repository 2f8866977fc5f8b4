use crate::error::ServiceResult;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// Display names from the external identity provider
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// One lookup for the whole batch; unknown ids are simply absent
    async fn display_names(&self, user_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, String>>;
}

/// Reads the identity provider's `users (id, email)` table.
///
/// The table belongs to the identity service and is not created by this
/// crate's migrations. Without it every lookup fails and authors render as
/// `Anonymous`.
#[derive(Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn display_names(&self, user_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, email
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
