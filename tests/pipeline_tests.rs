mod common;

use common::{create_image, create_temp_directory, FakeService};
use futures::StreamExt;
use img_tinify::{CompressionError, ImagePipeline, JobState};
use std::sync::Arc;
use std::time::Duration;

async fn collect_states(pipeline: &ImagePipeline, source: &std::path::Path) -> Vec<JobState> {
    pipeline.process(source).collect().await
}

#[tokio::test]
async fn test_run_emits_ordered_states() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "a.png", b"original");
    let service = Arc::new(FakeService::new());
    let pipeline = ImagePipeline::new(service.clone());

    let states = collect_states(&pipeline, &source).await;

    assert_eq!(states.first(), Some(&JobState::Waiting));
    let orders: Vec<u8> = states.iter().map(JobState::order_value).collect();
    assert!(orders.windows(2).all(|w| w[0] <= w[1]), "states out of order: {:?}", states);
    assert!(states.contains(&JobState::Uploading(1.0)));
    assert!(states.contains(&JobState::Downloading(0.0)));

    match states.last() {
        Some(JobState::Finished(temp)) => {
            assert_eq!(std::fs::read(temp).unwrap(), b"optimized");
            std::fs::remove_file(temp).unwrap();
        }
        other => panic!("expected finished, got {:?}", other),
    }
    assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_bounded() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "a.png", b"original");
    let service = Arc::new(
        FakeService::new().with_ticks(vec![0.0, 0.4, 0.3, 0.4, 1.7], vec![0.2, 0.1, f64::NAN, 0.9]),
    );
    let pipeline = ImagePipeline::new(service);

    let states = collect_states(&pipeline, &source).await;

    let uploads: Vec<f64> = states
        .iter()
        .filter_map(|s| match s {
            JobState::Uploading(p) => Some(*p),
            _ => None,
        })
        .collect();
    let downloads: Vec<f64> = states
        .iter()
        .filter_map(|s| match s {
            JobState::Downloading(p) => Some(*p),
            _ => None,
        })
        .collect();

    assert_eq!(uploads, vec![0.0, 0.4, 1.0]);
    assert_eq!(downloads, vec![0.0, 0.2, 0.9]);

    if let Some(JobState::Finished(temp)) = states.last() {
        let _ = std::fs::remove_file(temp);
    }
}

#[tokio::test]
async fn test_missing_source_fails_without_network() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "gone.png", b"original");
    std::fs::remove_file(&source).unwrap();
    let service = Arc::new(FakeService::new());
    let pipeline = ImagePipeline::new(service.clone());

    let states = collect_states(&pipeline, &source).await;

    assert_eq!(states.len(), 2);
    assert_eq!(states[0], JobState::Waiting);
    match &states[1] {
        JobState::Error(err) => assert!(matches!(**err, CompressionError::SourceMissing(_))),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(service.upload_count(), 0);
}

#[tokio::test]
async fn test_upload_error_is_terminal() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "bad.png", b"not an image");
    let service = Arc::new(FakeService::new().failing_upload_for("bad.png"));
    let pipeline = ImagePipeline::new(service.clone());

    let states = collect_states(&pipeline, &source).await;

    match states.last() {
        Some(JobState::Error(err)) => match &**err {
            CompressionError::Api { error, message, .. } => {
                assert_eq!(error, "BadSignature");
                assert!(message.contains("PNG"));
            }
            other => panic!("unexpected cause {:?}", other),
        },
        other => panic!("expected error, got {:?}", other),
    }
    assert!(!states.iter().any(|s| matches!(s, JobState::Downloading(_))));
    assert_eq!(service.downloads.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_ends_stream_without_terminal_event() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "slow.png", b"original");
    let service = Arc::new(FakeService::new().stalling_download_for("slow.png"));
    let started = Arc::clone(&service.download_started);
    let pipeline = ImagePipeline::new(service);

    let mut events = pipeline.process(&source);
    started.notified().await;
    events.cancel();

    let mut rest = Vec::new();
    while let Some(state) = tokio::time::timeout(Duration::from_secs(5), events.next_state())
        .await
        .expect("stream did not end after cancel")
    {
        rest.push(state);
    }
    assert!(rest.iter().all(|s| !s.is_terminal()), "got {:?}", rest);
}

#[tokio::test]
async fn test_cancel_does_not_affect_sibling() {
    let temp_dir = create_temp_directory();
    let slow = create_image(temp_dir.path(), "slow.png", b"original");
    let fast = create_image(temp_dir.path(), "fast.png", b"original");
    let service = Arc::new(FakeService::new().stalling_download_for("slow.png"));
    let started = Arc::clone(&service.download_started);
    let pipeline = ImagePipeline::new(service);

    let slow_events = pipeline.process(&slow);
    let fast_events = pipeline.process(&fast);

    started.notified().await;
    slow_events.cancel();

    let fast_states: Vec<JobState> = fast_events.collect().await;
    match fast_states.last() {
        Some(JobState::Finished(temp)) => {
            let _ = std::fs::remove_file(temp);
        }
        other => panic!("sibling did not finish: {:?}", other),
    }
}

#[tokio::test]
async fn test_unread_result_is_removed_on_drop() {
    let temp_dir = create_temp_directory();
    let source = create_image(temp_dir.path(), "a.png", b"original");
    let service = Arc::new(FakeService::new());
    let pipeline = ImagePipeline::new(service.clone());

    let events = pipeline.process(&source);
    let handle = events.abort_handle();
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let produced = service.produced.lock().clone();
    assert_eq!(produced.len(), 1);
    assert!(produced[0].exists());

    drop(events);
    assert!(!produced[0].exists());
}
