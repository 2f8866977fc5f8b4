/// End-to-end vote semantics over the in-memory stores
mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::harness;
use futures::future::join_all;
use rand::Rng;
use uuid::Uuid;
use voting_service::domain::{Post, VoteDirection};
use voting_service::repository::VoteLedger;
use voting_service::services::{RankingView, VoteChange};
use voting_service::ServiceError;

use VoteDirection::{Down, Up};

#[tokio::test]
async fn test_two_voters_switch_and_toggle() {
    let h = harness();
    let post = h.post("A", None).await;
    let (u1, u2) = (Some(Uuid::new_v4()), Some(Uuid::new_v4()));
    let votes = &h.core.votes;

    assert_eq!(post.net_score, 0);

    let step = votes.cast_vote(u1, post.id, Up).await.unwrap();
    assert_eq!(step.net_score, Some(1));

    let step = votes.cast_vote(u2, post.id, Up).await.unwrap();
    assert_eq!(step.net_score, Some(2));

    let step = votes.cast_vote(u1, post.id, Down).await.unwrap();
    assert_eq!(step.change, VoteChange::Switched);
    assert_eq!(step.net_score, Some(0));

    let step = votes.cast_vote(u1, post.id, Down).await.unwrap();
    assert_eq!(step.change, VoteChange::Removed);
    assert_eq!(step.net_score, Some(1));

    assert_eq!(h.net_score(post.id).await, 1);
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_repeat_toggles_off_then_restores() {
    let h = harness();
    let post = h.post("toggle", None).await;
    let voter = Uuid::new_v4();

    let first = h.core.votes.cast_vote(Some(voter), post.id, Up).await.unwrap();
    let second = h.core.votes.cast_vote(Some(voter), post.id, Up).await.unwrap();
    let third = h.core.votes.cast_vote(Some(voter), post.id, Up).await.unwrap();

    assert_eq!(first.direction, Some(Up));
    assert_eq!(second.direction, None);
    assert_eq!(second.net_score, Some(0));
    assert_eq!(third.direction, Some(Up));
    assert_eq!(third.net_score, Some(1));

    let vote = h.ledger.get_vote(voter, post.id).await.unwrap().unwrap();
    assert_eq!(vote.direction, Up);
}

#[tokio::test]
async fn test_switch_swings_score_by_two() {
    let h = harness();
    let post = h.post("swing", None).await;
    let voter = Uuid::new_v4();

    h.core.votes.cast_vote(Some(voter), post.id, Up).await.unwrap();
    let before_switch = h.net_score(post.id).await;
    let original = h.ledger.get_vote(voter, post.id).await.unwrap().unwrap();

    h.core.votes.cast_vote(Some(voter), post.id, Down).await.unwrap();

    let switched = h.ledger.get_vote(voter, post.id).await.unwrap().unwrap();
    assert_eq!(switched.id, original.id);
    assert_eq!(switched.direction, Down);
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(before_switch - h.net_score(post.id).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_votes_are_all_counted() {
    let h = harness();
    let post_id = h.post("popular", None).await.id;
    const VOTERS: usize = 64;

    let tasks = (0..VOTERS).map(|_| {
        let votes = h.core.votes.clone();
        tokio::spawn(async move { votes.cast_vote(Some(Uuid::new_v4()), post_id, Up).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(h.ledger.len(), VOTERS);
    assert_eq!(h.net_score(post_id).await, VOTERS as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_voter_racing_keeps_one_record() {
    let h = harness();
    let post_id = h.post("contested", None).await.id;
    let voter = Uuid::new_v4();

    let tasks = (0..32).map(|i| {
        let votes = h.core.votes.clone();
        let direction = if i % 3 == 0 { Down } else { Up };
        tokio::spawn(async move { votes.cast_vote(Some(voter), post_id, direction).await })
    });
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) | Err(ServiceError::Transient(_)) => {}
            Err(e) => panic!("unexpected vote failure: {}", e),
        }
    }

    assert!(h.ledger.len() <= 1);
    assert_eq!(h.net_score(post_id).await, h.ledger_score(post_id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quiescent_scores_match_ledger() {
    let h = harness();
    let mut post_ids = Vec::new();
    for title in ["cat", "dog", "frog"] {
        post_ids.push(h.post(title, None).await.id);
    }
    let voters: Vec<Uuid> = (0..12).map(|_| Uuid::new_v4()).collect();

    let commands: Vec<(Uuid, Uuid, VoteDirection)> = {
        let mut rng = rand::thread_rng();
        (0..300)
            .map(|_| {
                let voter = voters[rng.gen_range(0..voters.len())];
                let post_id = post_ids[rng.gen_range(0..post_ids.len())];
                let direction = if rng.gen_bool(0.6) { Up } else { Down };
                (voter, post_id, direction)
            })
            .collect()
    };

    let tasks = commands.into_iter().map(|(voter, post_id, direction)| {
        let votes = h.core.votes.clone();
        tokio::spawn(async move { votes.cast_vote(Some(voter), post_id, direction).await })
    });
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) | Err(ServiceError::Transient(_)) => {}
            Err(e) => panic!("unexpected vote failure: {}", e),
        }
    }

    for post_id in post_ids {
        assert_eq!(h.net_score(post_id).await, h.ledger_score(post_id).await);
    }
    assert!(h.ledger.len() <= voters.len() * 3);
}

#[tokio::test]
async fn test_leaderboard_breaks_ties_by_age() {
    let h = harness();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let seeded = |id: u128, net_score: i64, minutes: i64| Post {
        id: Uuid::from_u128(id),
        title: format!("post-{}", id),
        image_url: "https://img/seeded.png".into(),
        author_id: None,
        created_at: base + ChronoDuration::minutes(minutes),
        net_score,
    };
    let (a, b, c) = (seeded(1, 3, 10), seeded(2, 3, 0), seeded(3, 1, 5));
    for post in [&a, &b, &c] {
        h.posts.insert_post(post.clone());
    }

    let top: Vec<Uuid> = h
        .core
        .ranking
        .leaderboard(2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(top, vec![b.id, a.id]);

    assert_eq!(h.core.ranking.leaderboard(10).await.unwrap().len(), 3);
    assert!(h.core.ranking.leaderboard(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_store_views_are_empty() {
    let h = harness();
    assert!(h.core.ranking.feed().await.unwrap().is_empty());
    assert!(h.core.ranking.leaderboard(5).await.unwrap().is_empty());
    assert!(h.core.ranking.feed_entries(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_author_names_resolved_in_one_batch() {
    let h = harness();
    let (alice, bob, stranger) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    h.identities.insert(alice, "alice@example.com");
    h.identities.insert(bob, "bob@example.com");

    let p1 = h.post("one", Some(alice)).await;
    h.post("two", Some(bob)).await;
    h.post("three", Some(alice)).await;
    let p4 = h.post("four", Some(stranger)).await;
    let p5 = h.post("five", None).await;

    let viewer = Uuid::new_v4();
    h.core.votes.cast_vote(Some(viewer), p1.id, Down).await.unwrap();

    let entries = h.core.ranking.feed_entries(Some(viewer)).await.unwrap();

    assert_eq!(entries.len(), 5);
    assert_eq!(h.identities.lookups(), 1);

    let by_id = |id: Uuid| entries.iter().find(|e| e.post.id == id).unwrap();
    assert_eq!(by_id(p1.id).author_name, "alice@example.com");
    assert_eq!(by_id(p1.id).viewer_vote, Some(Down));
    assert_eq!(by_id(p4.id).author_name, "Anonymous");
    assert_eq!(by_id(p5.id).author_name, "Anonymous");
    assert_eq!(by_id(p5.id).viewer_vote, None);

    let board = h.core.ranking.leaderboard_entries(5).await.unwrap();
    assert_eq!(h.identities.lookups(), 2);
    assert_eq!(board.first().map(|e| e.rank), Some(1));
    assert_eq!(board.last().map(|e| e.post.id), Some(p1.id));
}

#[tokio::test]
async fn test_viewer_votes_reflect_current_state() {
    let h = harness();
    let (p1, p2) = (h.post("x", None).await, h.post("y", None).await);
    let viewer = Uuid::new_v4();

    h.core.votes.cast_vote(Some(viewer), p1.id, Up).await.unwrap();
    h.core.votes.cast_vote(Some(viewer), p2.id, Down).await.unwrap();
    h.core.votes.cast_vote(Some(viewer), p2.id, Down).await.unwrap();

    let ranking: &RankingView = &h.core.ranking;
    let votes = ranking.viewer_votes(viewer).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes.get(&p1.id), Some(&Up));
}

#[tokio::test]
async fn test_stale_cache_is_reconciled() {
    let h = harness();
    let post = h.post("drift", None).await;
    h.ledger
        .insert_vote(voting_service::domain::NewVote {
            voter_id: Uuid::new_v4(),
            post_id: post.id,
            direction: Up,
        })
        .await
        .unwrap();
    assert_eq!(h.net_score(post.id).await, 0);

    let report = h.core.aggregator.reconcile_all().await.unwrap();

    assert_eq!(report.scores_corrected, 1);
    assert_eq!(h.net_score(post.id).await, 1);
}
