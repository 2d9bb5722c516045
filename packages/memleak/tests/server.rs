use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use memleak_demo::{leaker, routes, LeakConfig};

#[tokio::test]
async fn test_health_tracks_running_leak() {
    let (stats, leaker) = leaker::spawn(LeakConfig {
        interval: Duration::from_millis(10),
        chunk_size: 512 * 1024,
        max_iterations: Some(4),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(stats)).await.unwrap();
    });

    let buffer = tokio::time::timeout(Duration::from_secs(5), leaker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buffer.chunk_count(), 4);

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "UP");
    assert_eq!(body["iterations"], 4);
    assert_eq!(body["leakedMB"], 2);
    assert!(body["maxMemoryMB"].as_u64().unwrap() > 0);
}
