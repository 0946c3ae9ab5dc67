use super::*;
use crate::{
    busy::{BusyFlag, BusyIndicator},
    channel::{ChannelError, EventChannel},
    credentials::MemoryCredentialStore,
    events::{Severity, UiEvent, UiEventBus},
    invoker::HttpActionInvoker,
    projector::{DirectoryDownloadSink, DownloadArtifact, DownloadError, DownloadSink, ObjectUrl},
};
use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::{collections::VecDeque, time::Duration};
use tokio::{net::TcpListener, sync::broadcast, time::timeout};
use url::Url;

/// Returns queued outcomes and records every descriptor it was handed.
#[derive(Default)]
struct ScriptedInvoker {
    outcomes: Mutex<VecDeque<ActionOutcome>>,
    seen: Mutex<Vec<ActionDescriptor>>,
}

impl ScriptedInvoker {
    fn returning(outcome: ActionOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::from([outcome])),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<ActionDescriptor> {
        self.seen.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RemoteInvoker for ScriptedInvoker {
    async fn invoke(&self, descriptor: &ActionDescriptor) -> ActionOutcome {
        self.seen.lock().expect("lock").push(descriptor.clone());
        self.outcomes
            .lock()
            .expect("lock")
            .pop_front()
            .expect("scripted outcome")
    }
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<SocketEvent>>,
}

impl EventChannel for RecordingChannel {
    fn send(&self, event: &SocketEvent) -> Result<(), ChannelError> {
        self.sent.lock().expect("lock").push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct NullSink;

impl DownloadSink for NullSink {
    fn create_object_url(&self, _artifact: DownloadArtifact) -> ObjectUrl {
        ObjectUrl::new("blob:null")
    }

    fn save(&self, _url: &ObjectUrl, _filename: &str) -> Result<(), DownloadError> {
        Ok(())
    }

    fn revoke_object_url(&self, _url: &ObjectUrl) {}
}

struct FailingSink;

impl DownloadSink for FailingSink {
    fn create_object_url(&self, _artifact: DownloadArtifact) -> ObjectUrl {
        ObjectUrl::new("blob:failing")
    }

    fn save(&self, url: &ObjectUrl, _filename: &str) -> Result<(), DownloadError> {
        Err(DownloadError::UnknownUrl(url.as_str().to_string()))
    }

    fn revoke_object_url(&self, _url: &ObjectUrl) {}
}

struct Harness {
    runner: Arc<ActionRunner>,
    bus: Arc<UiEventBus>,
    events: broadcast::Receiver<UiEvent>,
}

fn harness(invoker: Arc<dyn RemoteInvoker>, downloads: Arc<dyn DownloadSink>) -> Harness {
    let bus = UiEventBus::new();
    let events = bus.subscribe();
    let projector = Arc::new(ResultProjector::new(bus.clone(), downloads));
    let runner = ActionRunner::new(invoker, bus.clone(), bus.clone(), projector);
    Harness {
        runner,
        bus,
        events,
    }
}

fn drain(events: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn notifications(events: &[UiEvent]) -> Vec<(Severity, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Notification(n) => Some((n.severity, n.message.clone())),
            _ => None,
        })
        .collect()
}

fn rendered(events: &[UiEvent]) -> Vec<View> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Render(view) => Some(*view),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn leaving_tournament_notifies_socket_then_rerenders() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success {
        data: json!({"message": "Left tournament."}),
    });
    let mut h = harness(invoker.clone(), Arc::new(NullSink));
    let channel = Arc::new(RecordingChannel::default());
    h.runner.projector().attach_channel(channel.clone());

    let outcome = h.runner.leave_tournament(TournamentId(5)).await;

    assert!(outcome.is_success());
    let seen = invoker.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method(), &reqwest::Method::POST);
    assert_eq!(seen[0].endpoint(), "/api/games/tournament/leave/");
    assert_eq!(seen[0].payload(), Some(&json!({"tournament_id": 5})));
    assert!(seen[0].requires_auth());

    assert_eq!(*channel.sent.lock().expect("lock"), vec![SocketEvent::user_left()]);
    let events = drain(&mut h.events);
    assert_eq!(rendered(&events), vec![View::Header, View::Tournaments]);
    assert!(notifications(&events).is_empty());
}

#[tokio::test]
async fn rejected_action_shows_server_message_and_skips_projection() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::HttpError {
        status: 400,
        message: "You are not registered in this tournament.".into(),
    });
    let mut h = harness(invoker, Arc::new(NullSink));
    let channel = Arc::new(RecordingChannel::default());
    h.runner.projector().attach_channel(channel.clone());

    h.runner.leave_tournament(TournamentId(5)).await;

    assert!(channel.sent.lock().expect("lock").is_empty());
    let events = drain(&mut h.events);
    assert!(rendered(&events).is_empty());
    assert_eq!(
        notifications(&events),
        vec![(
            Severity::Error,
            "You are not registered in this tournament.".to_string()
        )]
    );
}

#[tokio::test]
async fn network_failure_shows_action_specific_message() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::NetworkError {
        cause: "connection refused".into(),
    });
    let mut h = harness(invoker, Arc::new(NullSink));

    h.runner.leave_tournament(TournamentId(1)).await;

    let events = drain(&mut h.events);
    assert!(!events.iter().any(|e| matches!(e, UiEvent::Navigate(_))));
    assert_eq!(
        notifications(&events),
        vec![(
            Severity::Error,
            "An error occurred while leaving the tournament.".to_string()
        )]
    );
}

#[tokio::test]
async fn missing_credential_navigates_home_with_generic_message() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::AuthError);
    let mut h = harness(invoker, Arc::new(NullSink));

    h.runner.export_user_data(EXPORT_FILENAME).await;

    let events = drain(&mut h.events);
    assert!(matches!(events.first(), Some(UiEvent::Navigate(View::Home))));
    assert_eq!(
        notifications(&events),
        vec![(Severity::Error, GENERIC_ERROR_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn declining_friend_request_patches_and_refreshes_list() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success {
        data: json!({"message": "Friendship request declined."}),
    });
    let mut h = harness(invoker.clone(), Arc::new(NullSink));

    h.runner.decline_friend_request(UserId(12)).await;

    let seen = invoker.seen();
    assert_eq!(seen[0].method(), &reqwest::Method::PATCH);
    assert_eq!(seen[0].endpoint(), "/api/users/friendship/");
    assert_eq!(
        seen[0].payload(),
        Some(&json!({"friend_id": 12, "action": "decline"}))
    );
    assert_eq!(rendered(&drain(&mut h.events)), vec![View::FriendRequests]);
}

#[test]
fn supplementary_friend_actions_use_backend_contract() {
    let cases: [(ActionPlan, reqwest::Method, Option<Value>); 4] = [
        (
            ActionPlan::accept_friend_request(UserId(3)),
            reqwest::Method::PATCH,
            Some(json!({"friend_id": 3, "action": "accept"})),
        ),
        (
            ActionPlan::send_friend_request(UserId(3)),
            reqwest::Method::POST,
            Some(json!({"friend_id": 3})),
        ),
        (
            ActionPlan::remove_friend(UserId(3)),
            reqwest::Method::DELETE,
            Some(json!({"friend_id": 3})),
        ),
        (ActionPlan::list_friend_requests(), reqwest::Method::GET, None),
    ];

    for (plan, method, payload) in cases {
        assert_eq!(plan.descriptor.method(), &method, "{}", plan.name);
        assert_eq!(plan.descriptor.payload(), payload.as_ref(), "{}", plan.name);
    }
}

#[tokio::test]
async fn success_message_is_announced_after_projection() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success {
        data: json!({"message": "Friendship deleted."}),
    });
    let mut h = harness(invoker, Arc::new(NullSink));

    h.runner.remove_friend(UserId(8)).await;

    let events = drain(&mut h.events);
    assert_eq!(rendered(&events), vec![View::Friends]);
    assert_eq!(
        notifications(&events),
        vec![(Severity::Info, "Friend removed.".to_string())]
    );
}

#[tokio::test]
async fn export_saves_pretty_json_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = Arc::new(DirectoryDownloadSink::new(dir.path()));
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success {
        data: json!({"a": 1}),
    });
    let h = harness(invoker, sink.clone());

    let outcome = h.runner.export_user_data(EXPORT_FILENAME).await;

    assert!(outcome.is_success());
    let written = std::fs::read_to_string(dir.path().join(EXPORT_FILENAME)).expect("file");
    assert_eq!(written, "{\n  \"a\": 1\n}");
    assert_eq!(sink.staged_count(), 0);
}

#[tokio::test]
async fn failed_export_returns_home_before_toasting() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::NetworkError {
        cause: "invalid JSON in 200 OK response".into(),
    });
    let mut h = harness(invoker, Arc::new(NullSink));

    h.runner.export_user_data(EXPORT_FILENAME).await;

    let events = drain(&mut h.events);
    assert!(matches!(
        events.as_slice(),
        [UiEvent::Navigate(View::Home), UiEvent::Notification(_)]
    ));
    assert_eq!(
        notifications(&events),
        vec![(Severity::Error, GENERIC_ERROR_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn export_that_cannot_be_saved_also_returns_home() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success {
        data: json!({"a": 1}),
    });
    let mut h = harness(invoker, Arc::new(FailingSink));

    let outcome = h.runner.export_user_data(EXPORT_FILENAME).await;

    assert!(outcome.is_success());
    let events = drain(&mut h.events);
    assert!(matches!(events.first(), Some(UiEvent::Navigate(View::Home))));
    assert_eq!(
        notifications(&events),
        vec![(Severity::Error, GENERIC_ERROR_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn confirming_prompt_runs_action() {
    let invoker = ScriptedInvoker::returning(ActionOutcome::Success { data: json!({}) });
    let mut h = harness(invoker.clone(), Arc::new(NullSink));

    let pending = h
        .runner
        .confirm_leave_tournament(h.bus.clone(), TournamentId(2))
        .expect("prompt");
    let prompt = match h.events.try_recv() {
        Ok(UiEvent::PromptMounted(prompt)) => prompt,
        other => panic!("expected mounted prompt, got {other:?}"),
    };
    assert_eq!(prompt.message(), CONFIRMATION_MESSAGE);
    assert!(invoker.seen().is_empty());

    assert!(prompt.yes());
    let outcome = timeout(Duration::from_secs(5), pending.outcome())
        .await
        .expect("resolved in time");

    assert!(matches!(outcome, Some(ActionOutcome::Success { .. })));
    assert_eq!(invoker.seen().len(), 1);
    assert!(!prompt.no());
}

#[tokio::test]
async fn declining_prompt_never_invokes() {
    let invoker = Arc::new(ScriptedInvoker::default());
    let mut h = harness(invoker.clone(), Arc::new(NullSink));

    let pending = h
        .runner
        .confirm_leave_tournament(h.bus.clone(), TournamentId(2))
        .expect("prompt");
    let events = drain(&mut h.events);
    let Some(UiEvent::PromptMounted(prompt)) = events.first().cloned() else {
        panic!("expected mounted prompt");
    };

    assert!(prompt.dismiss());
    assert_eq!(pending.outcome().await, None);
    assert!(invoker.seen().is_empty());
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [UiEvent::PromptUnmounted(id)] if *id == prompt.id()
    ));
}

#[test]
fn confirmation_requires_runtime() {
    let h = harness(Arc::new(ScriptedInvoker::default()), Arc::new(NullSink));
    assert!(h
        .runner
        .confirm_leave_tournament(h.bus.clone(), TournamentId(2))
        .is_err());
}

async fn spawn_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Url::parse(&format!("http://{addr}")).expect("url")
}

#[tokio::test]
async fn rejected_leave_over_http_releases_busy_and_toasts_server_error() {
    let app = Router::new().route(
        "/api/games/tournament/leave/",
        post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"error": "nope"}))) }),
    );
    let base_url = spawn_server(app).await;
    let flag = BusyFlag::new();
    let mut busy_rx = flag.subscribe();
    let invoker = Arc::new(HttpActionInvoker::new(
        base_url,
        Arc::new(MemoryCredentialStore::with_token("token")),
        flag.clone(),
    ));
    let mut h = harness(invoker, Arc::new(NullSink));

    let outcome = h.runner.leave_tournament(TournamentId(4)).await;

    assert_eq!(
        outcome,
        ActionOutcome::HttpError {
            status: 400,
            message: "nope".into()
        }
    );
    assert!(busy_rx.has_changed().expect("sender alive"));
    assert!(!*busy_rx.borrow_and_update());
    assert_eq!(
        notifications(&drain(&mut h.events)),
        vec![(Severity::Error, "nope".to_string())]
    );
}

#[tokio::test]
async fn export_without_token_never_touches_busy_flag() {
    let app = Router::new().route(
        "/api/users/data-export/",
        post(|| async { Json(json!({"a": 1})) }),
    );
    let base_url = spawn_server(app).await;
    let flag = BusyFlag::new();
    let busy_rx = flag.subscribe();
    let invoker = Arc::new(HttpActionInvoker::new(
        base_url,
        Arc::new(MemoryCredentialStore::default()),
        flag.clone() as Arc<dyn BusyIndicator>,
    ));
    let h = harness(invoker, Arc::new(NullSink));

    let outcome = h.runner.export_user_data(EXPORT_FILENAME).await;

    assert_eq!(outcome, ActionOutcome::AuthError);
    assert!(!busy_rx.has_changed().expect("sender alive"));
    assert!(!flag.is_busy());
}
