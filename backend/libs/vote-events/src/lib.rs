//! Change events for the voting core.
//!
//! Every committed mutation of the vote ledger or the post store is described
//! by a [`MutationEvent`]. Observers never receive those payloads directly:
//! they watch a [`ResourceKind`] and get a [`RefreshSignal`] telling them their
//! view may be stale and should be re-queried.
//!
//! # Architecture
//!
//! ```text
//! voting-service instance A:
//!   1. Commit vote / score / post mutation
//!   2. Hand MutationEvent to the local change propagator
//!   3. PUBLISH votes:changes {"origin": "A", "event": {...}}
//!      ↓
//! Redis Pub/Sub (broadcast to every instance)
//!      ↓
//! voting-service instances B, C:
//!   4. Drop envelopes whose origin is themselves
//!   5. Feed the event into their own propagator, which refreshes
//!      their feed / leaderboard observers
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod bridge;
mod error;

pub use bridge::{EventEnvelope, EventPublisher, EventSubscriber};
pub use error::EventError;

pub type Result<T> = std::result::Result<T, EventError>;

/// Views an observer can watch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The full feed, ordered by recency
    #[serde(rename = "all-posts")]
    AllPosts,
    /// The top-N posts by net score
    #[serde(rename = "leaderboard")]
    Leaderboard,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::AllPosts, ResourceKind::Leaderboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AllPosts => "all-posts",
            ResourceKind::Leaderboard => "leaderboard",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all-posts" => Ok(ResourceKind::AllPosts),
            "leaderboard" => Ok(ResourceKind::Leaderboard),
            other => Err(EventError::InvalidMessage(format!(
                "unknown resource kind: {}",
                other
            ))),
        }
    }
}

/// A committed change to the vote ledger or the post store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationEvent {
    VoteInserted { post_id: Uuid, voter_id: Uuid },
    VoteUpdated { post_id: Uuid, voter_id: Uuid },
    VoteDeleted { post_id: Uuid, voter_id: Uuid },
    NetScoreUpdated { post_id: Uuid, net_score: i64 },
    PostCreated { post_id: Uuid },
}

impl MutationEvent {
    pub fn post_id(&self) -> Uuid {
        match self {
            MutationEvent::VoteInserted { post_id, .. }
            | MutationEvent::VoteUpdated { post_id, .. }
            | MutationEvent::VoteDeleted { post_id, .. }
            | MutationEvent::NetScoreUpdated { post_id, .. }
            | MutationEvent::PostCreated { post_id } => *post_id,
        }
    }

    /// Whether observers of `resource` may see a different result after this event.
    ///
    /// The feed renders scores and the viewer's own vote, so every event touches
    /// it. The leaderboard only depends on cached scores and the set of posts;
    /// raw vote events reach it through the `NetScoreUpdated` that follows.
    pub fn affects(&self, resource: ResourceKind) -> bool {
        match resource {
            ResourceKind::AllPosts => true,
            ResourceKind::Leaderboard => matches!(
                self,
                MutationEvent::NetScoreUpdated { .. } | MutationEvent::PostCreated { .. }
            ),
        }
    }

    pub fn affected_resources(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        ResourceKind::ALL
            .into_iter()
            .filter(move |resource| self.affects(*resource))
    }
}

/// "Your view may be stale, re-query"
///
/// `sequence` is the position of the newest mutation folded into this signal.
/// A single observer always sees non-decreasing sequences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshSignal {
    pub resource: ResourceKind,
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_round_trips_through_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.to_string().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("feed".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_resource_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&ResourceKind::AllPosts).unwrap();
        assert_eq!(json, "\"all-posts\"");
    }

    #[test]
    fn test_vote_events_only_touch_feed() {
        let event = MutationEvent::VoteInserted {
            post_id: Uuid::new_v4(),
            voter_id: Uuid::new_v4(),
        };
        let affected: Vec<_> = event.affected_resources().collect();
        assert_eq!(affected, vec![ResourceKind::AllPosts]);
    }

    #[test]
    fn test_score_and_post_events_touch_everything() {
        let post_id = Uuid::new_v4();
        let score = MutationEvent::NetScoreUpdated {
            post_id,
            net_score: -2,
        };
        let created = MutationEvent::PostCreated { post_id };

        assert_eq!(score.affected_resources().count(), 2);
        assert_eq!(created.affected_resources().count(), 2);
        assert_eq!(score.post_id(), post_id);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = MutationEvent::PostCreated {
            post_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "post_created");
    }
}
