use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use mailbox_archiver::downloader::{RateLimiter, RetryPolicy};
use mailbox_archiver::fetcher::FetchClient;
use mailbox_archiver::ItemId;
use tokio::time::Instant;

use crate::common::mock_api::{sample_detail, ScriptedApi};

fn assert_spaced(mut instants: Vec<Instant>, interval: Duration) {
    instants.sort();
    for pair in instants.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= interval,
            "permits {:?} apart, expected at least {:?}",
            gap,
            interval
        );
    }
}

#[tokio::test(start_paused = true)]
async fn sequential_permits_respect_interval() {
    let limiter = RateLimiter::new(50.0);
    let interval = limiter.min_interval().unwrap();

    let mut instants = Vec::new();
    for _ in 0..120 {
        limiter.acquire().await;
        instants.push(Instant::now());
    }

    assert_spaced(instants, interval);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_pace() {
    let limiter = Arc::new(RateLimiter::new(20.0));
    let interval = limiter.min_interval().unwrap();
    let instants = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let limiter = limiter.clone();
        let instants = instants.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                limiter.acquire().await;
                instants.lock().unwrap().push(Instant::now());
            }
        }));
    }
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let instants = instants.lock().unwrap().clone();
    assert_eq!(instants.len(), 100);
    assert_spaced(instants, interval);
}

#[tokio::test(start_paused = true)]
async fn disabled_limiter_never_waits() {
    let limiter = RateLimiter::new(0.0);
    let start = Instant::now();
    for _ in 0..1000 {
        limiter.acquire().await;
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn fetch_client_paces_api_calls() {
    let mut api = ScriptedApi::new();
    for i in 0..100 {
        api = api.detail(sample_detail(&format!("m{i}"), "paced"));
    }
    let api = Arc::new(api);
    let client = FetchClient::new(
        api.clone(),
        Arc::new(RateLimiter::new(100.0)),
        RetryPolicy::new(Duration::from_millis(10), 0),
    );

    let start = Instant::now();
    for i in 0..100 {
        let id = ItemId::new(format!("m{i}"));
        assert!(client.get_detail(&id).await.is_ok());
    }

    // 100 calls at 100/s need 99 full intervals
    assert!(start.elapsed() >= Duration::from_millis(990));
    assert_eq!(api.count_calls("detail:"), 100);
}
