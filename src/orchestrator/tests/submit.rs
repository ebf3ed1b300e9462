use super::*;
use crate::types::Event;
use std::time::Duration;

#[tokio::test]
async fn test_submit_registers_single_output() {
    let (orchestrator, invoker, _temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"]))).await;

    let id = orchestrator.submit(URL).await.unwrap();

    let path = orchestrator.lookup(&id.to_string()).await.unwrap();
    assert!(path.is_absolute());
    assert!(path.exists());
    assert_eq!(path.file_name().unwrap(), "clip.mp4");
    // The file lives in the workspace named after the job
    assert_eq!(
        path.parent().unwrap().file_name().unwrap().to_string_lossy(),
        id.to_string()
    );
    assert_eq!(invoker.calls(), 1);
    assert_eq!(orchestrator.status(&id).await, Some(Status::Succeeded));
}

#[tokio::test]
async fn test_submit_normalizes_whitespace_in_file_name() {
    let (orchestrator, _invoker, _temp_dir) = create_test_orchestrator(FakeInvoker::new(
        Behaviour::Produce(vec!["Never Gonna Give You Up.mp4"]),
    ))
    .await;

    let id = orchestrator.submit(URL).await.unwrap();

    let path = orchestrator.get(&id).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "Never_Gonna_Give_You_Up.mp4");
    assert!(path.exists());
    assert!(
        !path
            .with_file_name("Never Gonna Give You Up.mp4")
            .exists()
    );
}

#[tokio::test]
async fn test_submit_passes_trimmed_url_to_downloader() {
    let (orchestrator, invoker, _temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"]))).await;

    orchestrator.submit(&format!("  {URL}\n")).await.unwrap();

    assert_eq!(invoker.urls(), vec![URL.to_string()]);
}

#[tokio::test]
async fn test_invalid_url_fails_before_any_side_effect() {
    let (orchestrator, invoker, temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"]))).await;

    for bad in ["not a url", "", "   ", "ftp://example.com/file", "file:///etc/passwd"] {
        let err = orchestrator.submit(bad).await.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Validation, "input {bad:?}: {err:?}");
        assert_eq!(err.stage(), Some(Stage::Validating));
        assert_eq!(err.job_id(), None);
    }

    assert_eq!(invoker.calls(), 0);
    assert!(entry_names(&temp_dir.path().join("downloads")).is_empty());
    assert!(orchestrator.registry.is_empty().await);
}

#[tokio::test]
async fn test_download_failure_reports_exit_code_and_stage() {
    let (orchestrator, _invoker, temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Exit(1))).await;

    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::Download);
    assert!(matches!(
        err.root(),
        Error::Download {
            exit_code: Some(1)
        }
    ));
    assert_eq!(err.stage(), Some(Stage::Downloading));
    let id = err.job_id().expect("failed job should carry its id");

    assert!(orchestrator.lookup(&id.to_string()).await.is_none());
    assert_eq!(orchestrator.status(&id).await, None);
    // Workspace is kept for inspection by default
    let downloads = temp_dir.path().join("downloads");
    assert_eq!(entry_names(&downloads), vec![id.to_string()]);
}

#[tokio::test]
async fn test_timeout_is_reported_as_timeout() {
    let (orchestrator, _invoker, _temp_dir) =
        create_test_orchestrator_with(FakeInvoker::new(Behaviour::Hang), |config| {
            config.download.timeout = Duration::from_millis(100);
        })
        .await;

    let started = std::time::Instant::now();
    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::Timeout);
    assert_eq!(err.stage(), Some(Stage::Downloading));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(orchestrator.registry.is_empty().await);
}

#[tokio::test]
async fn test_no_output_fails_in_resolving() {
    let (orchestrator, _invoker, _temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["notes.txt"]))).await;

    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::NoOutput);
    assert_eq!(err.stage(), Some(Stage::Resolving));
    assert!(orchestrator.registry.is_empty().await);
}

#[tokio::test]
async fn test_several_outputs_are_ambiguous() {
    let (orchestrator, _invoker, _temp_dir) = create_test_orchestrator(FakeInvoker::new(
        Behaviour::Produce(vec!["a.mp4", "b.webm"]),
    ))
    .await;

    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::AmbiguousOutput);
    assert_eq!(err.stage(), Some(Stage::Resolving));
}

#[tokio::test]
async fn test_first_by_name_policy_picks_one_output() {
    let (orchestrator, _invoker, _temp_dir) = create_test_orchestrator_with(
        FakeInvoker::new(Behaviour::Produce(vec!["b.mp4", "a.mp4"])),
        |config| {
            config.download.duplicate_output = crate::config::DuplicateOutputPolicy::FirstByName;
        },
    )
    .await;

    let id = orchestrator.submit(URL).await.unwrap();

    let path = orchestrator.get(&id).await.unwrap();
    assert_eq!(path.file_name().unwrap(), "a.mp4");
}

#[tokio::test]
async fn test_failed_workspace_removed_when_configured() {
    let (orchestrator, _invoker, temp_dir) =
        create_test_orchestrator_with(FakeInvoker::new(Behaviour::Exit(2)), |config| {
            config.download.remove_failed_workspaces = true;
        })
        .await;

    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::Download);
    assert!(entry_names(&temp_dir.path().join("downloads")).is_empty());
}

#[tokio::test]
async fn test_unusable_download_dir_fails_in_provisioning() {
    let (orchestrator, invoker, temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"]))).await;

    // Replace the base directory with a plain file
    let downloads = temp_dir.path().join("downloads");
    std::fs::remove_dir_all(&downloads).unwrap();
    std::fs::write(&downloads, b"not a directory").unwrap();

    let err = orchestrator.submit(URL).await.unwrap_err();

    assert_eq!(err.kind(), FaultKind::Storage);
    assert_eq!(err.stage(), Some(Stage::Provisioning));
    assert_eq!(err.job_id(), None);
    assert_eq!(invoker.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_ids() {
    let (orchestrator, _invoker, _temp_dir) = create_test_orchestrator_with(
        FakeInvoker::new(Behaviour::Produce(vec!["same title.mp4"])),
        |config| config.download.max_concurrent_jobs = 8,
    )
    .await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let orchestrator = orchestrator.clone();
        tasks.spawn(async move { orchestrator.submit(URL).await.unwrap() });
    }

    let mut ids = std::collections::HashSet::new();
    let mut paths = std::collections::HashSet::new();
    while let Some(id) = tasks.join_next().await {
        let id = id.unwrap();
        let path = orchestrator.get(&id).await.unwrap();
        assert!(path.exists());
        ids.insert(id);
        paths.insert(path);
    }

    assert_eq!(ids.len(), 32);
    assert_eq!(paths.len(), 32);
    assert_eq!(orchestrator.registry.len().await, 32);
}

#[tokio::test]
async fn test_concurrency_is_capped_by_config() {
    let gate = Arc::new(Semaphore::new(0));
    let (orchestrator, invoker, _temp_dir) = create_test_orchestrator_with(
        FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"])).gated(gate.clone()),
        |config| config.download.max_concurrent_jobs = 2,
    )
    .await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..5 {
        let orchestrator = orchestrator.clone();
        tasks.spawn(async move { orchestrator.submit(URL).await });
    }

    wait_until(|| invoker.calls() == 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(invoker.calls(), 2);

    gate.add_permits(5);
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert_eq!(invoker.calls(), 5);
    assert!(invoker.max_running() <= 2);
}

#[tokio::test]
async fn test_successful_job_emits_stage_events_in_order() {
    let (orchestrator, _invoker, _temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Produce(vec!["clip.mp4"]))).await;
    let mut events = orchestrator.subscribe();

    let id = orchestrator.submit(URL).await.unwrap();

    match events.recv().await.unwrap() {
        Event::Provisioned { id: got, url, .. } => {
            assert_eq!(got, id);
            assert_eq!(url, URL);
        }
        other => panic!("expected Provisioned, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::StageChanged { stage: Stage::Downloading, .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::StageChanged { stage: Stage::Resolving, .. }
    ));
    match events.recv().await.unwrap() {
        Event::Completed { id: got, path } => {
            assert_eq!(got, id);
            assert_eq!(Some(path), orchestrator.get(&id).await);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_job_emits_failure_code() {
    let (orchestrator, _invoker, _temp_dir) =
        create_test_orchestrator(FakeInvoker::new(Behaviour::Exit(3))).await;
    let mut events = orchestrator.subscribe();

    let err = orchestrator.submit(URL).await.unwrap_err();

    loop {
        match events.recv().await.unwrap() {
            Event::Failed { id, stage, code, .. } => {
                assert_eq!(Some(id), err.job_id());
                assert_eq!(stage, Stage::Downloading);
                assert_eq!(code, "download_failed");
                break;
            }
            Event::Completed { .. } => panic!("failed job must not complete"),
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_construction() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.download.max_concurrent_jobs = 0;

    let result = JobOrchestrator::with_invoker(
        config,
        Arc::new(FakeInvoker::new(Behaviour::Exit(0))),
    )
    .await;

    assert!(matches!(result, Err(Error::Config { .. })));
}
