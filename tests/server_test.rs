//! Integration tests for the wildwatch HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;
    use wildwatch_agent::collector::{create_live_feed, Frame, LiveFeed};
    use wildwatch_agent::core::{create_shared_tracker, DescriptionPolicy, SessionTracker};
    use wildwatch_agent::server::{run, AppState, ServerConfig};
    use wildwatch_agent::stats::create_shared_stats;
    use wildwatch_agent::store::{LogStore, MemoryLogStore, RecordMapper};

    /// Store with two closed detections on different days and one open one.
    fn seeded_store() -> Arc<MemoryLogStore> {
        let store = Arc::new(MemoryLogStore::new());
        let mapper = RecordMapper::new(chrono_tz::UTC, "test-station");
        let mut tracker = SessionTracker::new(DescriptionPolicy::KeepFirst);

        let steps = [
            (Utc.with_ymd_and_hms(2025, 3, 12, 22, 0, 0).unwrap(), true, "a person"),
            (Utc.with_ymd_and_hms(2025, 3, 12, 22, 0, 10).unwrap(), false, "empty"),
            (Utc.with_ymd_and_hms(2025, 3, 13, 1, 0, 0).unwrap(), true, "two people"),
            (Utc.with_ymd_and_hms(2025, 3, 13, 1, 0, 30).unwrap(), false, "empty"),
            (Utc.with_ymd_and_hms(2025, 3, 13, 4, 0, 0).unwrap(), true, "a person"),
        ];
        for (ts, signal, description) in steps {
            if let Some(event) = tracker.observe(signal, description, ts).unwrap() {
                if event.is_opened() {
                    store.insert(&mapper.opened_record(event.interval())).unwrap();
                } else {
                    store
                        .close(event.interval().id, ts, &mapper.time_of_day(ts))
                        .unwrap();
                }
            }
        }
        store
    }

    fn state(live: LiveFeed) -> AppState {
        AppState::new(
            create_shared_tracker(DescriptionPolicy::KeepFirst),
            seeded_store(),
            create_shared_stats(),
            live,
        )
    }

    async fn start(live: LiveFeed) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
        serve(state(live)).await
    }

    async fn serve(state: AppState) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let (addr, shutdown_tx) = run(ServerConfig::new(0), state)
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_logs_endpoint() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;
        let client = reqwest::Client::new();

        let all: serde_json::Value = client
            .get(format!("http://{}/api/logs", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(all.as_array().map(|a| a.len()), Some(3));
        assert_eq!(all[0]["date"], "2025-03-12");
        assert_eq!(all[0]["detection_time"], "22:00:00");
        assert_eq!(all[0]["close_time"], "22:00:10");
        assert!(all[2]["close_time"].is_null());

        let day: serde_json::Value = client
            .get(format!("http://{}/api/logs?date=2025-03-13", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(day.as_array().map(|a| a.len()), Some(2));
        assert_eq!(day[0]["description"], "two people");

        let bad = client
            .get(format!("http://{}/api/logs?date=yesterday", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = bad.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_DATE");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_detection_logs_and_analysis() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;
        let client = reqwest::Client::new();

        let times: serde_json::Value = client
            .get(format!("http://{}/api/detection_logs", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(times[1]["date"], "2025-03-13");
        assert_eq!(times[1]["detection_time"], "01:00:00");
        assert!(times[1].get("description").is_none());

        let report: serde_json::Value = client
            .get(format!("http://{}/api/analysis", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(report["per_day"][0]["detections"], 1);
        assert_eq!(report["per_day"][1]["detections"], 2);
        assert_eq!(report["durations"]["intervals"], 2);
        assert_eq!(report["durations"]["max_secs"], 30.0);
        assert_eq!(report["open_intervals"], 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;

        let status: serde_json::Value = reqwest::Client::new()
            .get(format!("http://{}/api/status", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["detecting"], false);
        assert_eq!(status["paused"], false);
        assert!(status["current"].is_null());
        assert_eq!(status["stats"]["frames_captured"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_video_feed_streams_frames() {
        let live = create_live_feed();
        let (addr, shutdown_tx) = start(live.clone()).await;

        let mut response = reqwest::Client::new()
            .get(format!("http://{}/video_feed", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

        // Publish after the client subscribed
        live.send_replace(Some(Frame::new(1, Utc::now(), vec![0xFF, 0xD8, 0xAA])));

        let chunk = tokio::time::timeout(Duration::from_secs(2), response.chunk())
            .await
            .expect("Timed out waiting for a frame")
            .expect("Failed to read chunk")
            .expect("Stream ended early");
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_footages_without_directory() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;

        let names: serde_json::Value = reqwest::Client::new()
            .get(format!("http://{}/api/footages?date=2025-03-13", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(names, serde_json::json!([]));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_footages_listing_and_download() {
        let dir = std::env::temp_dir().join(format!("wildwatch-clips-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("footage_2025-03-12_22-00-00.mjpeg"), [0xFF, 0xD8, 1]).unwrap();
        std::fs::write(dir.join("footage_2025-03-13_01-00-00.mjpeg"), [0xFF, 0xD8, 2]).unwrap();
        std::fs::create_dir_all(dir.join("footage_2025-03-13_tmp")).unwrap();

        let (addr, shutdown_tx) = serve(state(create_live_feed()).with_footage_dir(&dir)).await;
        let client = reqwest::Client::new();

        let all: serde_json::Value = client
            .get(format!("http://{}/api/footages", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(
            all,
            serde_json::json!([
                "footage_2025-03-12_22-00-00.mjpeg",
                "footage_2025-03-13_01-00-00.mjpeg"
            ])
        );

        let day: serde_json::Value = client
            .get(format!("http://{}/api/footages?date=2025-03-13", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(day, serde_json::json!(["footage_2025-03-13_01-00-00.mjpeg"]));

        let clip = client
            .get(format!("http://{}/footages/footage_2025-03-13_01-00-00.mjpeg", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(clip.status().is_success());
        assert_eq!(
            clip.headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("video/x-motion-jpeg")
        );
        let bytes = clip.bytes().await.expect("Failed to read body");
        assert_eq!(&bytes[..], &[0xFF, 0xD8, 2u8][..]);

        let missing = client
            .get(format!("http://{}/footages/footage_2025-01-01_00-00-00.mjpeg", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let escape = client
            .get(format!("http://{}/footages/..%2Fdetections.jsonl", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(escape.status(), reqwest::StatusCode::BAD_REQUEST);

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start(create_live_feed()).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/logs", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "GET")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
