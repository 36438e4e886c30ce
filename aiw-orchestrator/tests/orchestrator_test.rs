use aiw_orchestrator::test_utils::memory_orchestrator;
use aiw_orchestrator::{
    CreateWorkspaceRequest, OrchestratorError, WorkspaceEvent, WorkspaceState,
    GENERIC_CHAT_ERROR,
};
use aiw_provider::mock::{MockCall, MockProvider};
use aiw_provider::CommandOutput;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(name: &str) -> CreateWorkspaceRequest {
    CreateWorkspaceRequest {
        name: name.to_string(),
        description: None,
    }
}

#[tokio::test]
async fn test_create_workspace_reaches_ready() {
    let mock = Arc::new(
        MockProvider::new()
            .with_repository_url("https://x/demo")
            .with_container_handle("demo"),
    );
    let orchestrator = memory_orchestrator(mock.clone());

    let record = orchestrator.create_workspace(request("demo")).await.unwrap();

    assert_eq!(record.id, "demo");
    assert_eq!(record.state, WorkspaceState::Ready);
    assert_eq!(record.repository_url.as_deref(), Some("https://x/demo"));
    assert_eq!(record.clone_url.as_deref(), Some("https://x/demo.git"));
    assert_eq!(record.container_handle.as_deref(), Some("demo"));
    assert!(record.last_error.is_none());
    assert_eq!(mock.calls(MockCall::Repository), 1);
    assert_eq!(mock.calls(MockCall::Container), 1);

    let stored = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_create_workspace_publishes_each_state() {
    let orchestrator = memory_orchestrator(Arc::new(MockProvider::new()));
    let mut events = orchestrator.events().subscribe();

    orchestrator.create_workspace(request("demo")).await.unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let WorkspaceEvent::StateChanged { workspace } = event {
            states.push(workspace.state);
        }
    }
    assert_eq!(
        states,
        vec![
            WorkspaceState::Pending,
            WorkspaceState::ProvisioningRepo,
            WorkspaceState::ProvisioningContainer,
            WorkspaceState::Ready,
        ]
    );
}

#[tokio::test]
async fn test_repository_failure_marks_failed() {
    let mock = Arc::new(MockProvider::new().failing_repository("422 Unprocessable Entity"));
    let orchestrator = memory_orchestrator(mock.clone());

    let err = orchestrator
        .create_workspace(request("demo"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Provisioning { ref id, .. } if id == "demo"));

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Failed);
    assert!(record.repository_url.is_none());
    assert!(record.container_handle.is_none());
    assert!(record.last_error.unwrap().contains("422"));
    assert_eq!(mock.calls(MockCall::Container), 0);
}

#[tokio::test]
async fn test_container_failure_keeps_repository() {
    let mock = Arc::new(MockProvider::new().failing_container("devpod up: exit status 1"));
    let orchestrator = memory_orchestrator(mock.clone());

    let err = orchestrator
        .create_workspace(request("demo"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Provisioning { .. }));

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Failed);
    assert_eq!(
        record.repository_url.as_deref(),
        Some("https://github.com/mock/demo")
    );
    assert!(record.container_handle.is_none());
    assert!(record.last_error.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_container_timeout_is_distinct() {
    let mock = Arc::new(MockProvider::new().with_container_delay(Duration::from_secs(2)));
    let mut orchestrator_settings = aiw_orchestrator::test_utils::test_settings();
    orchestrator_settings.provision_timeout = Duration::from_millis(200);
    let orchestrator = aiw_orchestrator::WorkspaceOrchestrator::new(
        Arc::new(aiw_orchestrator::MemoryRegistry::new()),
        mock,
        orchestrator_settings,
    );

    let err = orchestrator
        .create_workspace(request("demo"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout { .. }));

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Failed);
    assert!(record.repository_url.is_some());
}

#[tokio::test]
async fn test_command_timeout_is_reported_as_timeout() {
    let mock = Arc::new(MockProvider::new().timing_out_container(600));
    let orchestrator = memory_orchestrator(mock);

    let err = orchestrator
        .create_workspace(request("demo"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OrchestratorError::Timeout { seconds: 600, .. }),
        "{err:?}"
    );

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Failed);
    assert!(record.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_duplicate_name_with_verbatim_ids() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = memory_orchestrator(mock.clone());

    orchestrator.create_workspace(request("demo")).await.unwrap();
    let err = orchestrator
        .create_workspace(request("Demo"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::DuplicateId(ref id) if id == "demo"));
    assert_eq!(mock.calls(MockCall::Repository), 1);
}

#[tokio::test]
async fn test_invalid_names_are_rejected_before_side_effects() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = memory_orchestrator(mock.clone());

    let too_long = "a".repeat(101);
    for name in ["", "   ", "!!!", too_long.as_str()] {
        let err = orchestrator
            .create_workspace(request(name))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(_)), "{name:?}");
    }
    assert!(orchestrator.list_workspaces().await.unwrap().is_empty());
    assert_eq!(mock.calls(MockCall::Repository), 0);
}

#[tokio::test]
async fn test_chat_success_touches_activity() {
    let mock = Arc::new(MockProvider::new().with_chat_stdout(r#"{"success":true,"response":"hi"}"#));
    let orchestrator = memory_orchestrator(mock.clone());
    let created = orchestrator.create_workspace(request("demo")).await.unwrap();

    let exchange = orchestrator.dispatch_chat("demo", "hello").await.unwrap();

    assert!(exchange.success);
    assert_eq!(exchange.response_text, "hi");
    assert_eq!(exchange.request_text, "hello");
    assert_eq!(exchange.workspace_id, "demo");
    assert_eq!(mock.messages(), vec!["hello".to_string()]);

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert!(record.last_activity_at >= created.last_activity_at);
    assert_eq!(record.state, WorkspaceState::Ready);
}

#[tokio::test]
async fn test_chat_unknown_workspace() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = memory_orchestrator(mock.clone());

    let err = orchestrator.dispatch_chat("ghost", "hello").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));
    assert_eq!(mock.calls(MockCall::Chat), 0);
}

#[tokio::test]
async fn test_chat_not_ready_skips_collaborator() {
    let mock = Arc::new(MockProvider::new().failing_container("boom"));
    let orchestrator = memory_orchestrator(mock.clone());
    let _ = orchestrator.create_workspace(request("demo")).await;

    let err = orchestrator.dispatch_chat("demo", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::NotReady {
            state: WorkspaceState::Failed,
            ..
        }
    ));
    assert_eq!(mock.calls(MockCall::Chat), 0);
}

#[tokio::test]
async fn test_chat_empty_message() {
    let orchestrator = memory_orchestrator(Arc::new(MockProvider::new()));
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let err = orchestrator.dispatch_chat("demo", "  \n").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidInput(_)));
}

#[tokio::test]
async fn test_chat_failures_become_generic_replies() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = memory_orchestrator(mock.clone());
    orchestrator.create_workspace(request("demo")).await.unwrap();

    for stdout in [
        "Traceback (most recent call last): ...",
        r#"{"success": false, "error": "Claude CLI not found"}"#,
        "",
    ] {
        mock.set_chat_stdout(stdout);
        let exchange = orchestrator.dispatch_chat("demo", "hello").await.unwrap();
        assert!(!exchange.success, "{stdout:?}");
        assert_eq!(exchange.response_text, GENERIC_CHAT_ERROR);
    }

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Ready);
}

#[tokio::test]
async fn test_chat_non_zero_exit_is_generic() {
    let mock = Arc::new(MockProvider::new().with_chat_output(CommandOutput {
        status: Some(1),
        stdout: r#"{"success": true, "response": "partial"}"#.to_string(),
        stderr: "killed".to_string(),
    }));
    let orchestrator = memory_orchestrator(mock);
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let exchange = orchestrator.dispatch_chat("demo", "hello").await.unwrap();
    assert!(!exchange.success);
    assert_eq!(exchange.response_text, GENERIC_CHAT_ERROR);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_timeout_leaves_workspace_ready() {
    let mock = Arc::new(MockProvider::new().with_chat_delay(Duration::from_secs(2)));
    let mut settings = aiw_orchestrator::test_utils::test_settings();
    settings.chat_timeout = Duration::from_millis(200);
    let orchestrator = aiw_orchestrator::WorkspaceOrchestrator::new(
        Arc::new(aiw_orchestrator::MemoryRegistry::new()),
        mock,
        settings,
    );
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let started = Instant::now();
    let exchange = orchestrator.dispatch_chat("demo", "hello").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!exchange.success);
    assert_eq!(exchange.response_text, GENERIC_CHAT_ERROR);
    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_chats_to_one_workspace_are_serialized() {
    let delay = Duration::from_millis(300);
    let mock = Arc::new(MockProvider::new().with_chat_delay(delay));
    let orchestrator = memory_orchestrator(mock.clone());
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let started = Instant::now();
    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.dispatch_chat("demo", "one").await })
    };
    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.dispatch_chat("demo", "two").await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first.success && second.success);
    assert!(started.elapsed() >= delay * 2);
    assert_eq!(mock.calls(MockCall::Chat), 2);
    let mut messages = mock.messages();
    messages.sort();
    assert_eq!(messages, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(
        orchestrator.get_workspace("demo").await.unwrap().state,
        WorkspaceState::Ready
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_chats_to_different_workspaces_run_in_parallel() {
    let delay = Duration::from_millis(500);
    let mock = Arc::new(MockProvider::new().with_chat_delay(delay));
    let orchestrator = memory_orchestrator(mock);
    orchestrator.create_workspace(request("alpha")).await.unwrap();
    orchestrator.create_workspace(request("beta")).await.unwrap();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        orchestrator.dispatch_chat("alpha", "hi"),
        orchestrator.dispatch_chat("beta", "hi")
    );

    assert!(a.unwrap().success && b.unwrap().success);
    assert!(started.elapsed() < delay * 2);
}

#[tokio::test]
async fn test_stop_then_delete() {
    let mock = Arc::new(MockProvider::new());
    let orchestrator = memory_orchestrator(mock.clone());
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let stopped = orchestrator.stop_workspace("demo").await.unwrap();
    assert_eq!(stopped.state, WorkspaceState::Stopped);

    let err = orchestrator.dispatch_chat("demo", "hello").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotReady { .. }));

    let deleted = orchestrator.delete_workspace("demo").await.unwrap();
    assert_eq!(deleted.state, WorkspaceState::Deleted);
    assert_eq!(mock.calls(MockCall::Stop), 1);
    assert_eq!(mock.calls(MockCall::Delete), 1);

    let err = orchestrator.stop_workspace("demo").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    let err = orchestrator.delete_workspace("demo").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_stop_failure_keeps_state_and_records_error() {
    let mock = Arc::new(MockProvider::new().failing_stop("daemon unreachable"));
    let orchestrator = memory_orchestrator(mock);
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let err = orchestrator.stop_workspace("demo").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Provider(_)));

    let record = orchestrator.get_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Ready);
    assert!(record.last_error.unwrap().contains("daemon unreachable"));
}

#[tokio::test]
async fn test_delete_without_container_skips_collaborator() {
    let mock = Arc::new(MockProvider::new().failing_repository("rate limited"));
    let orchestrator = memory_orchestrator(mock.clone());
    let _ = orchestrator.create_workspace(request("demo")).await;

    let record = orchestrator.delete_workspace("demo").await.unwrap();
    assert_eq!(record.state, WorkspaceState::Deleted);
    assert!(record.last_error.is_none());
    assert_eq!(mock.calls(MockCall::Delete), 0);
}

#[tokio::test]
async fn test_idle_workspaces() {
    let orchestrator = memory_orchestrator(Arc::new(MockProvider::new()));
    orchestrator.create_workspace(request("demo")).await.unwrap();

    assert!(orchestrator
        .idle_workspaces(Duration::from_secs(3600))
        .await
        .unwrap()
        .is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let idle = orchestrator
        .idle_workspaces(Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].id, "demo");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_in_flight_chat() {
    let delay = Duration::from_millis(300);
    let mock = Arc::new(MockProvider::new().with_chat_delay(delay));
    let orchestrator = memory_orchestrator(mock.clone());
    orchestrator.create_workspace(request("demo")).await.unwrap();

    let started = Instant::now();
    let chat = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let exchange = orchestrator.dispatch_chat("demo", "hello").await;
            (exchange, Instant::now())
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped = orchestrator.stop_workspace("demo").await.unwrap();
    let stop_returned = Instant::now();
    assert_eq!(stopped.state, WorkspaceState::Stopped);
    assert!(started.elapsed() >= delay);

    let (exchange, chat_returned) = chat.await.unwrap();
    assert!(exchange.unwrap().success);
    assert!(chat_returned <= stop_returned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_if_idle_skips_busy_and_active_workspaces() {
    let mock = Arc::new(MockProvider::new().with_chat_delay(Duration::from_millis(400)));
    let orchestrator = memory_orchestrator(mock.clone());
    orchestrator.create_workspace(request("demo")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let chat = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.dispatch_chat("demo", "hello").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let skipped = orchestrator
        .stop_if_idle("demo", Duration::from_millis(10))
        .await
        .unwrap();
    assert!(skipped.is_none());
    assert_eq!(mock.calls(MockCall::Stop), 0);

    chat.await.unwrap().unwrap();
    let skipped = orchestrator
        .stop_if_idle("demo", Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(skipped.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped = orchestrator
        .stop_if_idle("demo", Duration::from_millis(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stopped.state, WorkspaceState::Stopped);
    assert_eq!(mock.calls(MockCall::Stop), 1);
}
