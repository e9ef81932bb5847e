use crate::helpers::memory::InMemoryFrontier;
use onioncrawl::domain::models::target::{RegisterOutcome, Target, TargetState};
use onioncrawl::domain::repositories::frontier_repository::{FrontierRepository, RepositoryError};
use std::sync::Arc;

fn seed_target(url: &str) -> Target {
    Target::discovered(
        url.to_string(),
        "expyuzz4wqqyqhjn.onion".to_string(),
        None,
        0,
        true,
    )
}

#[tokio::test]
async fn concurrent_register_yields_exactly_one_new() {
    let frontier = Arc::new(InMemoryFrontier::new());
    let url = "http://expyuzz4wqqyqhjn.onion/";

    let mut handles = Vec::new();
    for _ in 0..32 {
        let frontier = frontier.clone();
        handles.push(tokio::spawn(async move {
            frontier.register(&seed_target(url)).await.unwrap()
        }));
    }

    let mut new_count = 0;
    let mut duplicate_count = 0;
    for handle in handles {
        match handle.await.unwrap() {
            RegisterOutcome::New => new_count += 1,
            RegisterOutcome::Duplicate => duplicate_count += 1,
        }
    }

    assert_eq!(new_count, 1);
    assert_eq!(duplicate_count, 31);
}

#[tokio::test]
async fn state_transitions_are_monotonic() {
    let frontier = InMemoryFrontier::new();
    let url = "http://expyuzz4wqqyqhjn.onion/";
    frontier.register(&seed_target(url)).await.unwrap();

    frontier.mark(url, TargetState::Queued, 0).await.unwrap();
    frontier.mark(url, TargetState::Fetching, 1).await.unwrap();
    // failed -> queued is the one permitted backward edge
    frontier.mark(url, TargetState::Failed, 1).await.unwrap();
    frontier.mark(url, TargetState::Queued, 1).await.unwrap();
    frontier.mark(url, TargetState::Fetching, 2).await.unwrap();
    frontier.mark(url, TargetState::Fetched, 2).await.unwrap();

    // fetched is terminal for the fetch phase
    let err = frontier.mark(url, TargetState::Queued, 2).await;
    assert!(matches!(err, Err(RepositoryError::InvalidTransition(_))));
}

#[tokio::test]
async fn dead_targets_stay_dead() {
    let frontier = InMemoryFrontier::new();
    let url = "http://expyuzz4wqqyqhjn.onion/";
    frontier.register(&seed_target(url)).await.unwrap();

    frontier.mark(url, TargetState::Queued, 0).await.unwrap();
    frontier.mark(url, TargetState::Fetching, 1).await.unwrap();
    frontier.mark(url, TargetState::Failed, 3).await.unwrap();
    frontier.mark(url, TargetState::Dead, 3).await.unwrap();

    for state in [
        TargetState::Queued,
        TargetState::Fetching,
        TargetState::Fetched,
    ] {
        let err = frontier.mark(url, state, 3).await;
        assert!(matches!(err, Err(RepositoryError::InvalidTransition(_))));
    }
}

#[tokio::test]
async fn same_state_mark_is_idempotent() {
    let frontier = InMemoryFrontier::new();
    let url = "http://expyuzz4wqqyqhjn.onion/";
    frontier.register(&seed_target(url)).await.unwrap();

    frontier.mark(url, TargetState::Queued, 0).await.unwrap();
    // redelivered jobs replay the same mark
    frontier.mark(url, TargetState::Queued, 0).await.unwrap();

    let target = frontier.query(url).await.unwrap().unwrap();
    assert_eq!(target.state, TargetState::Queued);
}
