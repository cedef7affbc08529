//! Lifecycle tests for the live session manager, driven by a fake engine.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{FakeInvoker, TestHarness};
use loopcast::streaming::{ConflictPolicy, Error, PackagingMode, SessionState, StartOptions};

fn first_uri(manifest: &str) -> &str {
    manifest
        .lines()
        .find(|line| line.starts_with("/segment/"))
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn first_manifest_then_one_tick() {
    let h = TestHarness::new(FakeInvoker::secs(30));

    let status = h
        .sessions
        .start("https://example.com/clip.mp4", StartOptions::default())
        .await
        .unwrap();
    assert_eq!(status.state, SessionState::Live);
    assert_eq!(status.manifest_path.as_deref(), Some("/manifest"));

    let manifest = h.sessions.manifest().unwrap();
    assert_eq!(manifest.sequence, 0);
    assert_eq!(manifest.body.matches("#EXTINF:5.000,").count(), 3);
    assert!(manifest.body.contains("#EXT-X-MEDIA-SEQUENCE:0"));
    assert!(manifest.body.contains("#EXT-X-TARGETDURATION:5"));
    assert!(manifest.body.contains("#EXT-X-ALLOW-CACHE:NO"));
    assert!(!manifest.body.contains("#EXT-X-ENDLIST"));
    assert_eq!(first_uri(&manifest.body), "/segment/1-0.ts");

    tokio::time::sleep(Duration::from_millis(5_001)).await;

    let manifest = h.sessions.manifest().unwrap();
    assert_eq!(manifest.sequence, 1);
    assert!(manifest.body.contains("#EXT-X-MEDIA-SEQUENCE:1"));
    assert_eq!(first_uri(&manifest.body), "/segment/1-5000.ts");
    assert_eq!(h.sessions.status().sequence_number, 1);

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sequence_strictly_increases() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();

    let mut previous = h.sessions.status().sequence_number;
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        let current = h.sessions.status().sequence_number;
        assert!(current > previous, "{previous} -> {current}");
        previous = current;
    }

    // Eight ticks cover more than one 30s loop.
    let status = h.sessions.status();
    assert_eq!(status.loops_completed, Some(1));
    let manifest = h.sessions.manifest().unwrap();
    assert!(manifest.body.contains("#EXT-X-DISCONTINUITY-SEQUENCE:1"));

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn source_shorter_than_a_segment_is_rejected() {
    let h = TestHarness::new(FakeInvoker::secs(4));

    let err = h
        .sessions
        .start("short.mp4", StartOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, Error::DurationPolicy(_));

    assert_eq!(h.invoker.transcodes(), 0);
    assert!(h.sessions.session().is_none());
    assert_eq!(h.assets_on_disk(), 0);

    let status = h.sessions.status();
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.last_error.is_some());
    assert_matches!(h.sessions.manifest(), Err(Error::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_and_first_untouched() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    let first = h
        .sessions
        .start("one.mp4", StartOptions::default())
        .await
        .unwrap();

    let err = h
        .sessions
        .start("two.mp4", StartOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, Error::AlreadyActive);
    assert!(err.to_string().contains("stop the current stream"));

    let status = h.sessions.status();
    assert_eq!(status.state, SessionState::Live);
    assert_eq!(status.session_id, first.session_id);
    assert_eq!(status.source.as_deref(), Some("one.mp4"));
    assert!(h.sessions.manifest().is_ok());
    assert_eq!(h.invoker.transcodes(), 1);

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn replace_policy_stops_the_running_session() {
    let h = TestHarness::with_settings(FakeInvoker::secs(30), |s| {
        s.conflict_policy = ConflictPolicy::Replace;
    });
    let first = h
        .sessions
        .start("one.mp4", StartOptions::default())
        .await
        .unwrap();
    let old = h.sessions.session().unwrap();

    let second = h
        .sessions
        .start("two.mp4", StartOptions::default())
        .await
        .unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(old.state(), SessionState::Stopped);
    assert_eq!(h.sessions.status().source.as_deref(), Some("two.mp4"));
    assert_eq!(h.assets_on_disk(), 1);

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_extraction_is_retryable_and_isolated() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();
    h.invoker.fail_offset(5000);

    let first = h.sessions.segment("1-0.ts").await.unwrap();
    assert_eq!(&first[..], b"slice-0-5000");

    let err = h.sessions.segment("1-5000.ts").await.unwrap_err();
    assert_matches!(err, Error::Extract { .. });
    assert!(err.is_retryable());

    let third = h.sessions.segment("1-10000.ts").await.unwrap();
    assert_eq!(&third[..], b"slice-10000-5000");

    // The manifest is unaffected.
    assert!(h.sessions.manifest().is_ok());

    h.invoker.recover();
    let retried = h.sessions.segment("1-5000.ts").await.unwrap();
    assert_eq!(&retried[..], b"slice-5000-5000");

    // Now cached.
    let before = h.invoker.extractions();
    h.sessions.segment("1-5000").await.unwrap();
    assert_eq!(h.invoker.extractions(), before);

    let cache = h.sessions.status().cache.unwrap();
    assert_eq!(cache.entries, 3);

    h.sessions.stop().await;
}

#[tokio::test]
async fn concurrent_requests_extract_once() {
    let mut invoker = FakeInvoker::secs(30);
    invoker.extract_delay = Duration::from_millis(50);
    let h = TestHarness::new(invoker);
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sessions = h.sessions.clone();
        handles.push(tokio::spawn(async move {
            sessions.segment("1-5000.ts").await
        }));
    }
    for handle in handles {
        let bytes = handle.await.unwrap().unwrap();
        assert_eq!(&bytes[..], b"slice-5000-5000");
    }

    assert_eq!(h.invoker.extractions(), 1);
    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_then_start_never_serves_old_keys() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    h.sessions
        .start("one.mp4", StartOptions::default())
        .await
        .unwrap();
    h.sessions.segment("1-0.ts").await.unwrap();

    let stopped = h.sessions.stop().await;
    assert_eq!(stopped.state, SessionState::Stopped);
    assert_eq!(h.assets_on_disk(), 0);
    assert_matches!(h.sessions.manifest(), Err(Error::NotFound(_)));

    h.sessions
        .start("two.mp4", StartOptions::default())
        .await
        .unwrap();

    let manifest = h.sessions.manifest().unwrap();
    assert_eq!(manifest.generation, 2);
    assert!(!manifest.body.contains("/segment/1-"));
    assert!(manifest.body.contains("/segment/2-0.ts"));
    assert_matches!(
        h.sessions.segment("1-0.ts").await,
        Err(Error::NotFound(_))
    );
    assert!(h.sessions.segment("2-0.ts").await.is_ok());

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    assert_eq!(h.sessions.stop().await.state, SessionState::Idle);

    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();
    assert_eq!(h.sessions.stop().await.state, SessionState::Stopped);
    assert_eq!(h.sessions.stop().await.state, SessionState::Stopped);
    assert_eq!(h.assets_on_disk(), 0);

    let sequence = h.sessions.status().sequence_number;
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.sessions.status().sequence_number, sequence);
}

#[tokio::test(start_paused = true)]
async fn probe_failure_fails_start_and_allows_retry() {
    let h = TestHarness::new(FakeInvoker::unprobeable());

    let err = h
        .sessions
        .start("broken.mp4", StartOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, Error::Probe(_));
    assert_eq!(h.invoker.transcodes(), 0);
    assert_eq!(h.sessions.status().state, SessionState::Failed);

    *h.invoker.duration.lock() = Some(Duration::from_secs(30));
    let status = h
        .sessions
        .start("fixed.mp4", StartOptions::default())
        .await
        .unwrap();
    assert_eq!(status.state, SessionState::Live);

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn option_like_source_is_rejected_before_probing() {
    let h = TestHarness::new(FakeInvoker::secs(30));

    let err = h
        .sessions
        .start("-f lavfi", StartOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, Error::InvalidRequest(_));

    let options = StartOptions {
        video_codec: Some("libx264 -y".to_string()),
        ..Default::default()
    };
    let err = h.sessions.start("clip.mp4", options).await.unwrap_err();
    assert_matches!(err, Error::InvalidRequest(_));

    assert_eq!(h.invoker.probe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_packaging_goes_live_optimistically() {
    let mut invoker = FakeInvoker::secs(30);
    invoker.transcode_delay = Duration::from_secs(60);
    invoker.transcode_fails = true;
    let h = TestHarness::new(invoker);

    let status = h
        .sessions
        .start("slow.mp4", StartOptions::default())
        .await
        .unwrap();
    assert_eq!(status.state, SessionState::Live);
    assert!(h.sessions.manifest().is_ok());

    // Packaging eventually fails and takes the session down with it.
    tokio::time::sleep(Duration::from_secs(61)).await;

    let status = h.sessions.status();
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.last_error.unwrap().contains("transcode"));
    assert_matches!(h.sessions.manifest(), Err(Error::NotFound(_)));

    // A failed session does not block the next start.
    h.sessions.stop().await;
    let next = h
        .sessions
        .start("next.mp4", StartOptions::default())
        .await;
    assert!(next.is_ok());
    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn packaging_without_output_times_out() {
    let mut invoker = FakeInvoker::secs(30);
    invoker.transcode_delay = Duration::from_secs(60);
    invoker.writes_output = false;
    let h = TestHarness::new(invoker);

    let err = h
        .sessions
        .start("stuck.mp4", StartOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Transcode(inner) => assert!(inner.is_timeout()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.assets_on_disk(), 0);
    assert_eq!(h.sessions.status().state, SessionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn removed_asset_fails_the_session() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();

    for entry in std::fs::read_dir(h.work_dir.path()).unwrap() {
        std::fs::remove_dir_all(entry.unwrap().path()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(5_001)).await;

    assert_eq!(h.sessions.status().state, SessionState::Failed);
    assert_matches!(h.sessions.manifest(), Err(Error::NotFound(_)));

    h.sessions.stop().await;
    assert_eq!(h.sessions.status().state, SessionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn pre_split_mode_serves_files_on_the_grid() {
    let h = TestHarness::with_settings(
        FakeInvoker::with_duration(Duration::from_millis(12_500)),
        |s| s.mode = PackagingMode::PreSplit,
    );
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();

    let manifest = h.sessions.manifest().unwrap();
    assert!(manifest.body.contains("/segment/1-10000.ts"));
    assert!(manifest.body.contains("#EXTINF:2.500,"));

    let bytes = h.sessions.segment("1-5000.ts").await.unwrap();
    assert_eq!(&bytes[..], b"split-1");
    assert_matches!(
        h.sessions.segment("1-7300.ts").await,
        Err(Error::NotFound(_))
    );
    assert_matches!(
        h.sessions.segment("1-15000.ts").await,
        Err(Error::NotFound(_))
    );
    assert_eq!(h.invoker.extractions(), 0);

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn pre_split_newest_file_waits_for_packaging() {
    let mut invoker = FakeInvoker::with_duration(Duration::from_millis(12_500));
    invoker.transcode_delay = Duration::from_secs(60);
    let h = TestHarness::with_settings(invoker, |s| s.mode = PackagingMode::PreSplit);
    let status = h
        .sessions
        .start("slow.mp4", StartOptions::default())
        .await
        .unwrap();
    assert_eq!(status.state, SessionState::Live);

    // Files with a successor are complete.
    let bytes = h.sessions.segment("1-5000.ts").await.unwrap();
    assert_eq!(&bytes[..], b"split-1");

    let err = h.sessions.segment("1-10000.ts").await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert_eq!(h.sessions.session().unwrap().store().len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.sessions.status().state, SessionState::Live);
    let bytes = h.sessions.segment("1-10000.ts").await.unwrap();
    assert_eq!(&bytes[..], b"split-2");

    h.sessions.stop().await;
}

#[tokio::test(start_paused = true)]
async fn out_of_range_window_size_is_a_settings_error() {
    let h = TestHarness::with_settings(FakeInvoker::secs(30), |s| s.window_size = 1);

    let err = h
        .sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, Error::Internal(_));
    assert_eq!(err.http_status(), 500);
    assert_eq!(h.invoker.transcodes(), 0);
    assert_eq!(h.assets_on_disk(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_keys_are_not_found() {
    let h = TestHarness::new(FakeInvoker::secs(30));
    h.sessions
        .start("clip.mp4", StartOptions::default())
        .await
        .unwrap();

    for key in ["", "abc", "1-", "1-0.m4s", "../../etc/passwd"] {
        assert_matches!(h.sessions.segment(key).await, Err(Error::NotFound(_)));
    }
    assert_eq!(h.invoker.extractions(), 0);

    h.sessions.stop().await;
}
