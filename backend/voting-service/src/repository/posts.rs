use crate::domain::models::{NewPost, Post};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Post metadata plus the cached net score
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn get_post(&self, post_id: Uuid) -> ServiceResult<Option<Post>>;

    async fn list_posts(&self) -> ServiceResult<Vec<Post>>;

    /// Overwrite the cached score, returning the previous value.
    /// NotFound for an unknown post.
    async fn update_net_score(&self, post_id: Uuid, net_score: i64) -> ServiceResult<i64>;

    async fn create_post(&self, post: NewPost) -> ServiceResult<Post>;
}

/// Post store backed by the `posts` table
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn get_post(&self, post_id: Uuid) -> ServiceResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, image_url, author_id, created_at, net_score
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn list_posts(&self) -> ServiceResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, image_url, author_id, created_at, net_score
            FROM posts
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn update_net_score(&self, post_id: Uuid, net_score: i64) -> ServiceResult<i64> {
        // Row lock on the old value so the returned previous score is the one replaced
        let previous: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE posts p
            SET net_score = $2
            FROM (SELECT id, net_score FROM posts WHERE id = $1 FOR UPDATE) old
            WHERE p.id = old.id
            RETURNING old.net_score
            "#,
        )
        .bind(post_id)
        .bind(net_score)
        .fetch_optional(&self.pool)
        .await?;

        previous.ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))
    }

    async fn create_post(&self, post: NewPost) -> ServiceResult<Post> {
        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, image_url, author_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, image_url, author_id, created_at, net_score
            "#,
        )
        .bind(&post.title)
        .bind(&post.image_url)
        .bind(post.author_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}
