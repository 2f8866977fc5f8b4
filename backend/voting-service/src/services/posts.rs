use super::propagator::ChangeSink;
use super::retry::with_store_timeout;
use crate::domain::models::{CreatePostRequest, Post};
use crate::error::ServiceResult;
use crate::repository::PostStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use vote_events::MutationEvent;

/// Post submission. The image itself is already hosted elsewhere; only its
/// reference is stored.
#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    sink: Arc<dyn ChangeSink>,
    store_timeout: Duration,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostStore>, sink: Arc<dyn ChangeSink>, store_timeout: Duration) -> Self {
        Self {
            posts,
            sink,
            store_timeout,
        }
    }

    /// New posts start at a net score of 0
    pub async fn create_post(
        &self,
        author_id: Option<Uuid>,
        request: CreatePostRequest,
    ) -> ServiceResult<Post> {
        let new_post = request.into_new_post(author_id)?;

        let post = with_store_timeout(
            self.store_timeout,
            "create_post",
            self.posts.create_post(new_post),
        )
        .await?;

        info!(post_id = %post.id, author_id = ?post.author_id, "Post created");
        self.sink
            .publish(MutationEvent::PostCreated { post_id: post.id });

        Ok(post)
    }

    /// One indexed lookup against the post store, used by `/ready`
    pub async fn ping(&self) -> ServiceResult<()> {
        with_store_timeout(self.store_timeout, "ping", self.posts.get_post(Uuid::nil()))
            .await
            .map(|_| ())
    }
}
