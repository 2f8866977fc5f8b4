use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Display name used when a post has no author or the author is unknown
pub const ANONYMOUS: &str = "Anonymous";

/// Post entity - an image submitted by a user, ranked by net score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    /// None for anonymous uploads
    pub author_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Cached upvotes minus downvotes; only the score aggregator writes it
    pub net_score: i64,
}

/// Fields for a post insert; id and created_at are assigned by the store
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub image_url: String,
    pub author_id: Option<Uuid>,
}

/// Upload payload as submitted by a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "image_url must not be empty"))]
    pub image_url: String,
}

impl CreatePostRequest {
    pub fn new(title: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image_url: image_url.into(),
        }
    }

    /// Trim both fields, then validate
    pub fn into_new_post(self, author_id: Option<Uuid>) -> Result<NewPost, ServiceError> {
        let request = CreatePostRequest {
            title: self.title.trim().to_string(),
            image_url: self.image_url.trim().to_string(),
        };
        request.validate()?;

        Ok(NewPost {
            title: request.title,
            image_url: request.image_url,
            author_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(ServiceError::InvalidInput(format!(
                "invalid vote direction: {:?} (expected \"up\" or \"down\")",
                other
            ))),
        }
    }
}

/// Vote entity - the single current vote of one voter on one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub voter_id: Uuid,
    pub post_id: Uuid,
    pub direction: VoteDirection,
    /// Set at creation, refreshed when the direction switches
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewVote {
    pub voter_id: Uuid,
    pub post_id: Uuid,
    pub direction: VoteDirection,
}

/// Up/down counts for a post at one ledger read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl ScoreTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        votes
            .into_iter()
            .fold(ScoreTally::default(), |mut tally, vote| {
                match vote.direction {
                    VoteDirection::Up => tally.upvotes += 1,
                    VoteDirection::Down => tally.downvotes += 1,
                }
                tally
            })
    }

    pub fn net(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// Feed item with author display name and the viewer's own vote
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub viewer_vote: Option<VoteDirection>,
}

/// Leaderboard item, rank starts at 1
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
}
