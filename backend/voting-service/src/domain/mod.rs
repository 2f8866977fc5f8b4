pub mod models;

pub use models::{
    CreatePostRequest, FeedEntry, LeaderboardEntry, NewPost, NewVote, Post, ScoreTally, Vote,
    VoteDirection,
};
