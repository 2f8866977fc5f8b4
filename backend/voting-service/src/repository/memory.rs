//! Process-local backends for `STORAGE_BACKEND=memory` and tests.
//!
//! Both maps are sharded, so writers on different (voter, post) pairs or
//! different posts never contend on a common lock.

use super::{IdentityDirectory, PostStore, VoteLedger};
use crate::domain::models::{NewPost, NewVote, Post, Vote, VoteDirection};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

type VoteKey = (Uuid, Uuid);

#[derive(Clone, Default)]
pub struct InMemoryVoteLedger {
    votes: Arc<DashMap<VoteKey, Vote>>,
    // vote id -> (voter, post)
    by_id: Arc<DashMap<Uuid, VoteKey>>,
}

impl InMemoryVoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total vote records across all posts
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    fn key_for(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<VoteKey> {
        self.by_id
            .get(&vote_id)
            .map(|key| *key)
            .ok_or_else(|| stale_vote(vote_id, expected))
    }
}

fn stale_vote(vote_id: Uuid, expected: VoteDirection) -> ServiceError {
    ServiceError::Conflict(format!("vote {} is no longer {}", vote_id, expected))
}

#[async_trait]
impl VoteLedger for InMemoryVoteLedger {
    async fn get_vote(&self, voter_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Vote>> {
        Ok(self
            .votes
            .get(&(voter_id, post_id))
            .map(|vote| vote.value().clone()))
    }

    async fn insert_vote(&self, vote: NewVote) -> ServiceResult<Vote> {
        let key = (vote.voter_id, vote.post_id);
        let created = match self.votes.entry(key) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "voter {} already has a vote on post {}",
                    vote.voter_id, vote.post_id
                )))
            }
            Entry::Vacant(slot) => {
                let created = Vote {
                    id: Uuid::new_v4(),
                    voter_id: vote.voter_id,
                    post_id: vote.post_id,
                    direction: vote.direction,
                    created_at: Utc::now(),
                };
                slot.insert(created.clone());
                created
            }
        };

        self.by_id.insert(created.id, key);
        Ok(created)
    }

    async fn update_vote_direction(
        &self,
        vote_id: Uuid,
        expected: VoteDirection,
        direction: VoteDirection,
    ) -> ServiceResult<Vote> {
        let key = self.key_for(vote_id, expected)?;

        match self.votes.get_mut(&key) {
            Some(mut vote) if vote.id == vote_id && vote.direction == expected => {
                vote.direction = direction;
                vote.created_at = Utc::now();
                Ok(vote.clone())
            }
            _ => Err(stale_vote(vote_id, expected)),
        }
    }

    async fn delete_vote(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<()> {
        let key = self.key_for(vote_id, expected)?;

        let removed = self.votes.remove_if(&key, |_, vote| {
            vote.id == vote_id && vote.direction == expected
        });
        if removed.is_none() {
            return Err(stale_vote(vote_id, expected));
        }

        self.by_id.remove(&vote_id);
        Ok(())
    }

    async fn list_votes_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<Vote>> {
        Ok(self
            .votes
            .iter()
            .filter(|entry| entry.post_id == post_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_votes_for_voter(&self, voter_id: Uuid) -> ServiceResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .votes
            .iter()
            .filter(|entry| entry.voter_id == voter_id)
            .map(|entry| entry.value().clone())
            .collect();
        votes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(votes)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPostStore {
    posts: Arc<DashMap<Uuid, Post>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-formed post (fixed id / timestamp / score)
    pub fn insert_post(&self, post: Post) {
        self.posts.insert(post.id, post);
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn get_post(&self, post_id: Uuid) -> ServiceResult<Option<Post>> {
        Ok(self.posts.get(&post_id).map(|post| post.value().clone()))
    }

    async fn list_posts(&self) -> ServiceResult<Vec<Post>> {
        Ok(self
            .posts
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_net_score(&self, post_id: Uuid, net_score: i64) -> ServiceResult<i64> {
        let mut post = self
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| ServiceError::NotFound(format!("post {}", post_id)))?;
        Ok(std::mem::replace(&mut post.net_score, net_score))
    }

    async fn create_post(&self, post: NewPost) -> ServiceResult<Post> {
        let created = Post {
            id: Uuid::new_v4(),
            title: post.title,
            image_url: post.image_url,
            author_id: post.author_id,
            created_at: Utc::now(),
            net_score: 0,
        };
        self.posts.insert(created.id, created.clone());
        Ok(created)
    }
}

/// Fixed name table; counts lookups so callers can check batching
#[derive(Clone, Default)]
pub struct InMemoryIdentityDirectory {
    names: Arc<DashMap<Uuid, String>>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: Uuid, display_name: impl Into<String>) {
        self.names.insert(user_id, display_name.into());
    }

    /// Number of `display_names` calls served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn display_names(&self, user_ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(user_ids
            .iter()
            .filter_map(|id| self.names.get(id).map(|name| (*id, name.value().clone())))
            .collect())
    }
}
