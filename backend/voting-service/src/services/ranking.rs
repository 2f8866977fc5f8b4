//! Read-side projections over the post store.
//!
//! Orderings are recomputed on every query; nothing here caches a ranking.

use super::retry::with_store_timeout;
use crate::domain::models::{FeedEntry, LeaderboardEntry, Post, VoteDirection, ANONYMOUS};
use crate::error::ServiceResult;
use crate::repository::{IdentityDirectory, PostStore, VoteLedger};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Newest first, then lower id
pub fn feed_order(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Highest score first, then earlier post, then lower id
pub fn leaderboard_order(a: &Post, b: &Post) -> Ordering {
    b.net_score
        .cmp(&a.net_score)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// The `n` best posts by [`leaderboard_order`], in order
pub fn top_n(mut posts: Vec<Post>, n: usize) -> Vec<Post> {
    if n == 0 {
        return Vec::new();
    }
    if posts.len() > n {
        posts.select_nth_unstable_by(n - 1, leaderboard_order);
        posts.truncate(n);
    }
    posts.sort_by(leaderboard_order);
    posts
}

#[derive(Clone)]
pub struct RankingView {
    ledger: Arc<dyn VoteLedger>,
    posts: Arc<dyn PostStore>,
    identities: Arc<dyn IdentityDirectory>,
    store_timeout: Duration,
}

impl RankingView {
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        posts: Arc<dyn PostStore>,
        identities: Arc<dyn IdentityDirectory>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            posts,
            identities,
            store_timeout,
        }
    }

    async fn all_posts(&self) -> ServiceResult<Vec<Post>> {
        with_store_timeout(self.store_timeout, "list_posts", self.posts.list_posts()).await
    }

    pub async fn feed(&self) -> ServiceResult<Vec<Post>> {
        let mut posts = self.all_posts().await?;
        posts.sort_by(feed_order);
        Ok(posts)
    }

    pub async fn leaderboard(&self, n: usize) -> ServiceResult<Vec<Post>> {
        Ok(top_n(self.all_posts().await?, n))
    }

    /// The voter's current direction per post
    pub async fn viewer_votes(&self, voter_id: Uuid) -> ServiceResult<HashMap<Uuid, VoteDirection>> {
        let votes = with_store_timeout(
            self.store_timeout,
            "list_votes_for_voter",
            self.ledger.list_votes_for_voter(voter_id),
        )
        .await?;

        Ok(votes
            .into_iter()
            .map(|vote| (vote.post_id, vote.direction))
            .collect())
    }

    pub async fn feed_entries(&self, viewer: Option<Uuid>) -> ServiceResult<Vec<FeedEntry>> {
        let posts = self.feed().await?;
        let viewer_votes = match viewer {
            Some(voter_id) => self.viewer_votes(voter_id).await?,
            None => HashMap::new(),
        };
        let names = self.author_names(&posts).await;

        Ok(posts
            .into_iter()
            .map(|post| FeedEntry {
                author_name: display_name(&names, post.author_id),
                viewer_vote: viewer_votes.get(&post.id).copied(),
                post,
            })
            .collect())
    }

    pub async fn leaderboard_entries(&self, n: usize) -> ServiceResult<Vec<LeaderboardEntry>> {
        let posts = self.leaderboard(n).await?;
        let names = self.author_names(&posts).await;

        Ok(posts
            .into_iter()
            .enumerate()
            .map(|(index, post)| LeaderboardEntry {
                rank: index + 1,
                author_name: display_name(&names, post.author_id),
                post,
            })
            .collect())
    }

    /// One batched lookup for every distinct author in `posts`.
    ///
    /// Names are cosmetic, so a failed lookup degrades to anonymous rather
    /// than failing the whole view.
    async fn author_names(&self, posts: &[Post]) -> HashMap<Uuid, String> {
        let mut author_ids: Vec<Uuid> = posts.iter().filter_map(|post| post.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        if author_ids.is_empty() {
            return HashMap::new();
        }

        match with_store_timeout(
            self.store_timeout,
            "display_names",
            self.identities.display_names(&author_ids),
        )
        .await
        {
            Ok(names) => {
                debug!(requested = author_ids.len(), resolved = names.len(), "Resolved author names");
                names
            }
            Err(e) => {
                warn!(error = %e, authors = author_ids.len(), "Author lookup failed, showing anonymous");
                HashMap::new()
            }
        }
    }
}

fn display_name(names: &HashMap<Uuid, String>, author_id: Option<Uuid>) -> String {
    author_id
        .and_then(|id| names.get(&id).cloned())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}
