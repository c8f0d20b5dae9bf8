use super::*;
use crate::message::{Part, Role, ToolState};
use crate::output::{ChannelRenderer, ServerEvent};
use crate::tools::{ToolContract, ToolExecutor};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Replays canned assistant messages and records every history it was sent.
#[derive(Default)]
struct ScriptedModel {
    replies: std::sync::Mutex<VecDeque<Message>>,
    seen: std::sync::Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: std::sync::Mutex::new(replies.into()),
            seen: Default::default(),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_history(&self) -> Vec<Message> {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_turn(
        &self,
        history: &[Message],
        _tools: &ToolRegistry,
        renderer: &mut dyn Renderer,
    ) -> anyhow::Result<Message> {
        self.seen.lock().unwrap().push(history.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("provider unavailable"))?;
        for part in &reply.parts {
            match part {
                Part::Text { text } => renderer.render_token(text),
                Part::ToolInvocation(invocation) => renderer.tool_call(invocation),
            }
        }
        Ok(reply)
    }
}

struct Spy {
    calls: Arc<AtomicUsize>,
    reply: Value,
}

#[async_trait::async_trait]
impl ToolExecutor for Spy {
    async fn execute(&self, _args: Value) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn registry(weather_calls: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new(Duration::from_secs(5));
    registry
        .register(
            ToolContract::new("getWeatherInformation", "Weather", json!({}))
                .with_executor(Spy {
                    calls: weather_calls,
                    reply: json!({"tempC": 18}),
                })
                .requiring_confirmation(),
        )
        .unwrap();
    registry
        .register(
            ToolContract::new("getLocalTime", "Time", json!({})).with_executor(Spy {
                calls: Arc::new(AtomicUsize::new(0)),
                reply: json!("10am"),
            }),
        )
        .unwrap();
    Arc::new(registry)
}

fn session(model: Arc<ScriptedModel>, weather_calls: Arc<AtomicUsize>) -> ChatSession {
    ChatSession::new(
        ConversationStore::in_memory("test", "scripted"),
        registry(weather_calls),
        model,
        4,
    )
}

fn call(id: &str, tool: &str, args: Value) -> Part {
    Part::ToolInvocation(ToolInvocation::call(id, tool, args))
}

fn renderer() -> (ChannelRenderer, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelRenderer::new(tx), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn find_invocation(messages: &[Message], id: &str) -> ToolInvocation {
    messages
        .iter()
        .flat_map(|m| m.tool_invocations())
        .find(|inv| inv.tool_call_id == id)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn plain_reply_is_streamed_and_stored() {
    let model = ScriptedModel::new(vec![Message::assistant_text("Hello there")]);
    let mut session = session(model.clone(), Arc::new(AtomicUsize::new(0)));
    let (mut renderer, mut rx) = renderer();

    let status = session
        .handle(Inbound::UserText("hi".into()), &mut renderer)
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(model.calls(), 1);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].text(), "Hello there");

    let events = drain(&mut rx);
    assert!(events.contains(&ServerEvent::TextDelta {
        text: "Hello there".into()
    }));
    assert!(events.contains(&ServerEvent::Done));
    assert_eq!(
        events.last(),
        Some(&ServerEvent::Status {
            status: SessionStatus::Ready
        })
    );
}

#[tokio::test]
async fn approved_weather_call_runs_and_resubmits() {
    let weather_calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![call(
            "t1",
            "getWeatherInformation",
            json!({"city": "Paris"}),
        )]),
        Message::assistant_text("It is 18°C in Paris."),
    ]);
    let mut session = session(model.clone(), weather_calls.clone());
    let (mut renderer, mut rx) = renderer();

    let status = session
        .handle(Inbound::UserText("Weather in Paris?".into()), &mut renderer)
        .await
        .unwrap();
    assert_eq!(
        status,
        SessionStatus::PendingConfirmation {
            tool_call_ids: vec!["t1".into()]
        }
    );
    assert_eq!(model.calls(), 1);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 0);
    drain(&mut rx);

    let status = session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::approve("t1")]),
            &mut renderer,
        )
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.calls(), 2);
    let resubmitted = model.last_history();
    assert_eq!(
        find_invocation(&resubmitted, "t1").state,
        ToolState::Result(json!({"tempC": 18}))
    );
    assert_eq!(session.messages().last().unwrap().text(), "It is 18°C in Paris.");

    let events = drain(&mut rx);
    let first_result = events
        .iter()
        .position(|e| matches!(e, ServerEvent::ToolResult { .. }))
        .unwrap();
    let first_token = events
        .iter()
        .position(|e| matches!(e, ServerEvent::TextDelta { .. }))
        .unwrap();
    assert!(first_result < first_token);
}

#[tokio::test]
async fn rejected_call_resubmits_rejection() {
    let weather_calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![call(
            "t1",
            "getWeatherInformation",
            json!({"city": "Paris"}),
        )]),
        Message::assistant_text("Okay, I won't check."),
    ]);
    let mut session = session(model.clone(), weather_calls.clone());
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("Weather in Paris?".into()), &mut renderer)
        .await
        .unwrap();
    session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::reject("t1")]),
            &mut renderer,
        )
        .await
        .unwrap();

    assert_eq!(weather_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        find_invocation(&model.last_history(), "t1").state,
        ToolState::Result(json!(resolver::REJECTED))
    );
}

#[tokio::test]
async fn user_text_is_refused_while_pending() {
    let model = ScriptedModel::new(vec![Message::assistant(vec![call(
        "t1",
        "getWeatherInformation",
        json!({"city": "Paris"}),
    )])]);
    let mut session = session(model.clone(), Arc::new(AtomicUsize::new(0)));
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("Weather in Paris?".into()), &mut renderer)
        .await
        .unwrap();
    let before = session.messages().len();

    let err = session
        .handle(Inbound::UserText("hello?".into()), &mut renderer)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::PendingConfirmation(ref ids) if ids == &["t1"]));
    assert_eq!(session.messages().len(), before);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn partial_decisions_keep_waiting() {
    let weather_calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(vec![Message::assistant(vec![
        call("t1", "getWeatherInformation", json!({"city": "Paris"})),
        call("t2", "getWeatherInformation", json!({"city": "Oslo"})),
    ])]);
    let mut session = session(model.clone(), weather_calls.clone());
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("Paris and Oslo?".into()), &mut renderer)
        .await
        .unwrap();
    let status = session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::approve("t2")]),
            &mut renderer,
        )
        .await
        .unwrap();

    assert_eq!(
        status,
        SessionStatus::PendingConfirmation {
            tool_call_ids: vec!["t1".into()]
        }
    );
    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.calls(), 1);
    assert_eq!(session.pending_invocations().len(), 1);
}

#[tokio::test]
async fn duplicate_decisions_do_not_resubmit() {
    let weather_calls = Arc::new(AtomicUsize::new(0));
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![call(
            "t1",
            "getWeatherInformation",
            json!({"city": "Paris"}),
        )]),
        Message::assistant(vec![
            Part::Text {
                text: "Checking again.".into(),
            },
            call("t2", "getWeatherInformation", json!({"city": "Paris"})),
        ]),
    ]);
    let mut session = session(model.clone(), weather_calls.clone());
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("Weather?".into()), &mut renderer)
        .await
        .unwrap();
    session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::approve("t1")]),
            &mut renderer,
        )
        .await
        .unwrap();
    let calls_before = model.calls();

    let status = session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::approve("t1")]),
            &mut renderer,
        )
        .await
        .unwrap();

    assert_eq!(model.calls(), calls_before);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        status,
        SessionStatus::PendingConfirmation {
            tool_call_ids: vec!["t2".into()]
        }
    );
}

#[tokio::test]
async fn auto_tools_run_without_confirmation() {
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![call("a1", "getLocalTime", json!({"location": "Lima"}))]),
        Message::assistant_text("It's 10am in Lima."),
    ]);
    let mut session = session(model.clone(), Arc::new(AtomicUsize::new(0)));
    let (mut renderer, _rx) = renderer();

    let status = session
        .handle(Inbound::UserText("Time in Lima?".into()), &mut renderer)
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(model.calls(), 2);
    assert_eq!(
        find_invocation(&model.last_history(), "a1").state,
        ToolState::Result(json!("10am"))
    );
}

#[tokio::test]
async fn unknown_tool_gets_error_result() {
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![call("x1", "launchRocket", json!({}))]),
        Message::assistant_text("That tool doesn't exist."),
    ]);
    let mut session = session(model.clone(), Arc::new(AtomicUsize::new(0)));
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("launch".into()), &mut renderer)
        .await
        .unwrap();

    let x1 = find_invocation(session.messages(), "x1");
    assert!(x1
        .result_text()
        .unwrap()
        .contains("Unknown tool: launchRocket"));
}

#[tokio::test]
async fn turns_are_bounded_by_max_steps() {
    let replies = (0..10)
        .map(|i| {
            Message::assistant(vec![call(
                &format!("a{i}"),
                "getLocalTime",
                json!({"location": "Lima"}),
            )])
        })
        .collect();
    let model = ScriptedModel::new(replies);
    let mut session = ChatSession::new(
        ConversationStore::in_memory("bounded", "scripted"),
        registry(Arc::new(AtomicUsize::new(0))),
        model.clone(),
        2,
    );
    let (mut renderer, _rx) = renderer();

    let status = session
        .handle(Inbound::UserText("loop".into()), &mut renderer)
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn model_failure_is_reported() {
    let model = ScriptedModel::new(Vec::new());
    let mut session = session(model, Arc::new(AtomicUsize::new(0)));
    let (mut renderer, _rx) = renderer();

    let err = session
        .handle(Inbound::UserText("hi".into()), &mut renderer)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Model(_)));
    assert!(err.to_string().contains("provider unavailable"));
}

#[tokio::test]
async fn unresolved_auto_call_blocks_resubmission() {
    let model = ScriptedModel::new(vec![Message::assistant_text("unreachable")]);
    let mut session = session(model.clone(), Arc::new(AtomicUsize::new(0)));
    session
        .seed(Message::assistant(vec![
            call("t1", "getWeatherInformation", json!({"city": "Paris"})),
            call("a1", "getLocalTime", json!({"location": "Paris"})),
        ]))
        .unwrap();
    let (mut renderer, _rx) = renderer();

    let err = session
        .handle(
            Inbound::Decisions(vec![ApprovalDecision::approve("t1")]),
            &mut renderer,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::UnresolvedCall(ref ids) if ids == &["a1"]));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn manager_reuses_sessions_and_seeds_system_prompt() {
    let manager = SessionManager::new(
        registry(Arc::new(AtomicUsize::new(0))),
        ScriptedModel::new(Vec::new()),
        SessionDefaults {
            model_name: "scripted".into(),
            system_prompt: Some("Be brief.".into()),
            max_steps: 3,
            sessions_dir: None,
        },
    );

    let a = manager.get_or_create("room-1").await.unwrap();
    let b = manager.get_or_create("room-1").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.ids().await, vec!["room-1".to_string()]);

    let session = a.lock().await;
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].role, Role::System);

    assert!(manager.get_or_create("../escape").await.is_err());
    assert!(manager.find("unknown").await.unwrap().is_none());
}

/// Records how many calls were already resolved on disk each time it runs.
struct DiskWitness {
    dir: std::path::PathBuf,
    seen: Arc<std::sync::Mutex<Vec<usize>>>,
}

#[async_trait::async_trait]
impl ToolExecutor for DiskWitness {
    async fn execute(&self, _args: Value) -> anyhow::Result<Value> {
        let stored = ConversationStore::open(&self.dir, "disk")?;
        let resolved = stored
            .messages()
            .iter()
            .flat_map(|m| m.tool_invocations())
            .filter(|inv| !inv.is_pending())
            .count();
        self.seen.lock().unwrap().push(resolved);
        Ok(json!({"tempC": 18}))
    }
}

#[tokio::test]
async fn each_approved_result_is_stored_before_the_next_runs() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new(Duration::from_secs(5));
    registry
        .register(
            ToolContract::new("getWeatherInformation", "Weather", json!({}))
                .with_executor(DiskWitness {
                    dir: dir.path().to_path_buf(),
                    seen: seen.clone(),
                })
                .requiring_confirmation(),
        )
        .unwrap();
    let model = ScriptedModel::new(vec![
        Message::assistant(vec![
            call("t1", "getWeatherInformation", json!({"city": "Paris"})),
            call("t2", "getWeatherInformation", json!({"city": "Oslo"})),
        ]),
        Message::assistant_text("Both are mild."),
    ]);
    let store = ConversationStore::open_or_create(dir.path(), "disk", "scripted").unwrap();
    let mut session = ChatSession::new(store, Arc::new(registry), model, 4);
    let (mut renderer, _rx) = renderer();

    session
        .handle(Inbound::UserText("Paris and Oslo?".into()), &mut renderer)
        .await
        .unwrap();
    let status = session
        .handle(
            Inbound::Decisions(vec![
                ApprovalDecision::approve("t1"),
                ApprovalDecision::approve("t2"),
            ]),
            &mut renderer,
        )
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
}

fn manager(sessions_dir: Option<std::path::PathBuf>) -> SessionManager {
    SessionManager::new(
        registry(Arc::new(AtomicUsize::new(0))),
        ScriptedModel::new(Vec::new()),
        SessionDefaults {
            model_name: "scripted".into(),
            system_prompt: None,
            max_steps: 3,
            sessions_dir,
        },
    )
}

#[tokio::test]
async fn closed_connections_release_their_sessions() {
    let manager = manager(None);

    for i in 0..200 {
        let id = format!("conn-{i}");
        let session = manager.get_or_create(&id).await.unwrap();
        drop(session);
        assert!(manager.release(&id).await);
    }

    assert!(manager.ids().await.is_empty());
}

#[tokio::test]
async fn shared_session_survives_release() {
    let manager = manager(None);
    let first = manager.get_or_create("room").await.unwrap();
    let second = manager.get_or_create("room").await.unwrap();

    drop(first);
    assert!(!manager.release("room").await);
    assert_eq!(manager.ids().await, vec!["room".to_string()]);

    drop(second);
    assert!(manager.release("room").await);
    assert!(!manager.release("room").await);
}

#[tokio::test]
async fn released_session_reloads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(Some(dir.path().to_path_buf()));

    let session = manager.get_or_create("room").await.unwrap();
    session
        .lock()
        .await
        .seed(Message::user("Weather in Paris?"))
        .unwrap();
    drop(session);
    assert!(manager.release("room").await);

    // read-only lookups do not pin the session again
    let found = manager.find("room").await.unwrap().unwrap();
    assert_eq!(found.lock().await.messages().len(), 1);
    assert!(manager.ids().await.is_empty());

    let reopened = manager.get_or_create("room").await.unwrap();
    let reopened = reopened.lock().await;
    assert_eq!(reopened.messages()[0].text(), "Weather in Paris?");
}
