//! End-to-end runner scenarios against a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use cogwheel_agent::{Agent, AgentRunner, RunnerConfig, WireFormat};
use cogwheel_core::{AgentError, AgentEvent, AgentRequest, Message, Role, TokenUsage};
use cogwheel_hooks::{Callback, NoopCallback};
use cogwheel_models::{ChunkStream, Completion, CompletionModel, CompletionRequest, StreamChunk};
use cogwheel_tools::{Tool, ToolCallLog, ToolContext};

/// Model that replays scripted turns and records every request it received.
struct ScriptedModel {
    blocking: Mutex<VecDeque<anyhow::Result<String>>>,
    streaming: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn blocking(turns: Vec<anyhow::Result<String>>) -> Self {
        Self {
            blocking: Mutex::new(turns.into()),
            streaming: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn streaming(turns: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            blocking: Mutex::new(VecDeque::new()),
            streaming: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        let turn = self
            .blocking
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
        turn.map(|output| Completion {
            output,
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
            cost: Some(0.5),
        })
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> anyhow::Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        let chunks = self
            .streaming
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
        Ok(Box::pin(tokio_stream::iter(
            chunks.into_iter().map(anyhow::Ok),
        )))
    }
}

/// Model that streams one fragment and then hangs until cancelled.
struct StallingModel {
    first: String,
}

#[async_trait]
impl CompletionModel for StallingModel {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<Completion> {
        Err(anyhow::anyhow!("blocking not scripted"))
    }

    async fn stream_complete(&self, _request: &CompletionRequest) -> anyhow::Result<ChunkStream> {
        let head = tokio_stream::iter(vec![anyhow::Ok(StreamChunk::Text {
            text: self.first.clone(),
        })]);
        Ok(Box::pin(head.chain(tokio_stream::pending())))
    }
}

struct EchoTool {
    runs: Arc<Mutex<u32>>,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its input"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }

    async fn run(
        &self,
        _ctx: &ToolContext,
        input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        *self.runs.lock().unwrap() += 1;
        Ok(Some(Value::Object(input.clone())))
    }
}

struct NoopTool;

#[async_trait]
impl Tool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Does nothing"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(
        &self,
        _ctx: &ToolContext,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }
}

struct FlakyTool;

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(
        &self,
        _ctx: &ToolContext,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Err(anyhow::anyhow!("boom"))
    }
}

/// Cancels the run's token when executed.
struct ShutdownTool {
    token: CancellationToken,
}

#[async_trait]
impl Tool for ShutdownTool {
    fn name(&self) -> &str {
        "shutdown"
    }

    fn description(&self) -> &str {
        "Stops the run"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(
        &self,
        _ctx: &ToolContext,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        self.token.cancel();
        Ok(None)
    }
}

/// Captures the run's tool-call log so tests can inspect it afterwards.
struct CaptureTool {
    log: Arc<Mutex<Option<Arc<ToolCallLog>>>>,
}

#[async_trait]
impl Tool for CaptureTool {
    fn name(&self) -> &str {
        "capture"
    }

    fn description(&self) -> &str {
        "Captures the execution log"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn run(
        &self,
        ctx: &ToolContext,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        *self.log.lock().unwrap() = Some(ctx.calls.clone());
        Ok(Some(json!({"captured": true})))
    }
}

struct SubstituteCallback;

#[async_trait]
impl Callback for SubstituteCallback {
    async fn before_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
        _output: &str,
        _usage: Option<&TokenUsage>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({"substituted": true})))
    }

    async fn after_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
        _output: Option<&Value>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails every tool hook; model hooks pass.
struct RefusingToolHooks;

#[async_trait]
impl Callback for RefusingToolHooks {
    async fn before_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_model(
        &self,
        _cancel: &CancellationToken,
        _provider: &str,
        _model: &str,
        _prompts: &str,
        _messages: &[Message],
        _output: &str,
        _usage: Option<&TokenUsage>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
    ) -> anyhow::Result<Option<Value>> {
        Err(anyhow::anyhow!("denied by policy"))
    }

    async fn after_tool(
        &self,
        _cancel: &CancellationToken,
        _tool_name: &str,
        _input: &Map<String, Value>,
        _output: Option<&Value>,
    ) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("denied by policy"))
    }
}

fn agent_with(tools: Vec<Arc<dyn Tool>>) -> Agent {
    Agent {
        name: "tester".into(),
        description: "exercises the runner".into(),
        instructions: "Call tools until done.".into(),
        tools,
        ..Agent::default()
    }
}

fn request(messages: Vec<Message>, max_iterations: u32, max_retries: u32) -> AgentRequest {
    AgentRequest {
        messages,
        max_iterations,
        max_retries,
        output_schema: json!({"type": "object", "properties": {"reply": {"type": "string"}}}),
        output_usage: String::new(),
    }
}

fn noop_callback() -> Arc<dyn Callback> {
    Arc::new(NoopCallback)
}

async fn collect_events(mut stream: cogwheel_agent::AgentEventStream) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_json_blocking_happy_path() {
    let runs = Arc::new(Mutex::new(0));
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"echo","input":{"text":"hi"}}"#.into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"hi"}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(EchoTool { runs: runs.clone() })]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("say hi")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();

    assert_eq!(response.output, json!({"reply": "hi"}));
    assert_eq!(*runs.lock().unwrap(), 1);
    assert_eq!(
        response.usage,
        TokenUsage {
            input_tokens: 20,
            output_tokens: 10
        }
    );
    assert_eq!(response.cost, Some(1.0));
    assert_eq!(model.requests().len(), 2);
}

#[tokio::test]
async fn test_tool_call_records_have_unique_ids() {
    let log = Arc::new(Mutex::new(None));
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"echo","input":{"text":"a"}}"#.into()),
        Ok(r#"{"name":"capture","input":{}}"#.into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"done"}}"#.into()),
    ]));
    let agent = agent_with(vec![
        Arc::new(EchoTool {
            runs: Arc::new(Mutex::new(0)),
        }),
        Arc::new(CaptureTool { log: log.clone() }),
    ]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();

    let log = log.lock().unwrap().clone().unwrap();
    let calls = log.all();
    let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "capture", "complete_task"]);

    let mut ids: Vec<_> = calls.iter().map(|c| c.id.clone()).collect();
    assert!(ids.iter().all(|id| !id.is_empty()));
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), calls.len());
    assert!(calls
        .iter()
        .all(|c| c.started_at.is_some() && c.ended_at.is_some()));
    assert!(log.has_called("echo"));
    assert_eq!(log.find_calls("capture").len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_recovery_not_retry_counted() {
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"ech","input":{}}"#.into()),
        Ok(r#"{"name":"ech","input":{}}"#.into()),
        Ok(r#"{"name":"ech","input":{}}"#.into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"x"}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(EchoTool {
        runs: Arc::new(Mutex::new(0)),
    })]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    // max_retries = 1 would trip on the second counted error; three unknown
    // tools in a row must still recover.
    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 1),
            noop_callback(),
        )
        .await
        .unwrap();

    assert_eq!(response.output, json!({"reply": "x"}));
    let requests = model.requests();
    let last = requests.last().unwrap();
    let injected = last
        .messages
        .iter()
        .find(|m| m.role == Role::User && m.content.contains("Tool 'ech' not found"))
        .expect("synthetic user message listing tools");
    assert!(injected.content.contains("complete_task"));
    assert!(injected.content.contains("echo"));
}

#[tokio::test]
async fn test_retry_cap_exceeded() {
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok("not json".into()),
        Ok("still not json".into()),
        Ok("nope".into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"never"}}"#.into()),
    ]));
    let agent = agent_with(vec![]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    let err = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 2),
            noop_callback(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::RetriesExceeded(2)));
    assert_eq!(model.requests().len(), 3);
}

#[tokio::test]
async fn test_zero_max_retries_disables_cap() {
    let mut turns: Vec<anyhow::Result<String>> =
        (0..5).map(|_| Ok("garbage".to_string())).collect();
    turns.push(Ok(r#"{"name":"complete_task","input":{"reply":"ok"}}"#.into()));
    let model = Arc::new(ScriptedModel::blocking(turns));
    let agent = agent_with(vec![]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();
    assert_eq!(response.output, json!({"reply": "ok"}));
}

#[tokio::test]
async fn test_compaction_preserves_first_message() {
    let mut turns: Vec<anyhow::Result<String>> = (0..5)
        .map(|_| Ok(r#"{"name":"noop","input":{}}"#.to_string()))
        .collect();
    turns.push(Ok(r#"{"name":"complete_task","input":{"reply":"done"}}"#.into()));
    let model = Arc::new(ScriptedModel::blocking(turns));
    let agent = agent_with(vec![Arc::new(NoopTool)]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json)
        .unwrap()
        .with_config(RunnerConfig {
            system_prompt: None,
            max_message_history: 3,
        });

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("U0")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();
    assert_eq!(response.output, json!({"reply": "done"}));

    for req in model.requests().iter().skip(1) {
        assert!(req.messages.len() <= 3);
        assert_eq!(req.messages[0].content, "U0");
        assert_eq!(req.messages[0].role, Role::User);
    }
    // The no-result tool message is what the model sees after a noop call.
    let mut requests = model.requests();
    let last = requests.pop().unwrap();
    assert!(last
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content == "Tool call success, no results"));
}

#[tokio::test]
async fn test_tool_failure_injected_and_recovered() {
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"flaky","input":{"q":"x"}}"#.into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"ok"}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(FlakyTool)]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();
    assert_eq!(response.output, json!({"reply": "ok"}));

    let requests = model.requests();
    let last = requests.last().unwrap();
    let injected = last
        .messages
        .iter()
        .find(|m| m.role == Role::User && m.content.contains("Tool 'flaky' execution failed"))
        .expect("tool failure injected as user message");
    assert!(injected.content.starts_with("ERROR [Iteration 1]:"));
    assert!(injected.content.contains("boom"));
}

#[tokio::test]
async fn test_before_tool_substitution_skips_tool_body() {
    let runs = Arc::new(Mutex::new(0));
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"echo","input":{"text":"hi"}}"#.into()),
        Ok(r#"{"name":"complete_task","input":{"reply":"ok"}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(EchoTool { runs: runs.clone() })]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            Arc::new(SubstituteCallback),
        )
        .await
        .unwrap();

    assert_eq!(response.output, json!({"reply": "ok"}));
    assert_eq!(*runs.lock().unwrap(), 0);
    let requests = model.requests();
    let last = requests.last().unwrap();
    assert!(last
        .messages
        .iter()
        .any(|m| m.role == Role::Tool && m.content.contains("substituted")));
}

#[tokio::test]
async fn test_tool_hooks_skipped_for_complete_task() {
    let model = Arc::new(ScriptedModel::blocking(vec![Ok(
        r#"{"name":"complete_task","input":{"reply":"direct"}}"#.into(),
    )]));
    let agent = agent_with(vec![]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    // The callback refuses every tool hook; the sentinel must not fire them.
    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 5, 1),
            Arc::new(RefusingToolHooks),
        )
        .await
        .unwrap();
    assert_eq!(response.output, json!({"reply": "direct"}));
}

#[tokio::test]
async fn test_max_iterations_exhausted() {
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"noop","input":{}}"#.into()),
        Ok(r#"{"name":"noop","input":{}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(NoopTool)]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    let err = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 2, 0),
            noop_callback(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MaxIterations(2)));
}

#[tokio::test]
async fn test_cancellation_between_iterations() {
    let token = CancellationToken::new();
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok(r#"{"name":"shutdown","input":{}}"#.into()),
        Ok(r#"{"name":"echo","input":{"text":"never"}}"#.into()),
    ]));
    let agent = agent_with(vec![Arc::new(ShutdownTool {
        token: token.clone(),
    })]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Json).unwrap();

    let err = runner
        .run(
            token,
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_xml_blocking_run() {
    let model = Arc::new(ScriptedModel::blocking(vec![
        Ok("Looking it up.<use-tool name=\"echo\">{\"text\":\"x\"}</use-tool>".into()),
        Ok("<use-tool name=\"complete_task\">{\"reply\":\"x\"}</use-tool>".into()),
    ]));
    let runs = Arc::new(Mutex::new(0));
    let agent = agent_with(vec![Arc::new(EchoTool { runs: runs.clone() })]);
    let runner = AgentRunner::new(agent, model.clone(), WireFormat::Xml).unwrap();

    let response = runner
        .run(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .await
        .unwrap();

    assert_eq!(response.output, json!({"reply": "x"}));
    assert_eq!(*runs.lock().unwrap(), 1);
    // Tool output is serialized as JSON in XML mode too.
    let requests = model.requests();
    let last = requests.last().unwrap();
    let tool_msg = last
        .messages
        .iter()
        .find(|m| m.role == Role::Tool && m.tool_call.is_some())
        .expect("tool result message");
    assert_eq!(
        tool_msg.tool_call.as_ref().unwrap().output.as_deref(),
        Some(r#"{"text":"x"}"#)
    );
}

#[tokio::test]
async fn test_json_streaming_events_in_order() {
    let model = Arc::new(ScriptedModel::streaming(vec![
        vec![
            StreamChunk::Reasoning {
                text: "thinking".into(),
            },
            StreamChunk::Usage {
                usage: TokenUsage {
                    input_tokens: 7,
                    output_tokens: 3,
                },
                cost: None,
            },
            StreamChunk::Text {
                text: r#"{"name":"echo","input":{"te"#.into(),
            },
            StreamChunk::Text {
                text: r#"xt":"hi"}}"#.into(),
            },
        ],
        vec![StreamChunk::Text {
            text: r#"{"name":"complete_task","input":{"reply":"hi"}}"#.into(),
        }],
    ]));
    let agent = agent_with(vec![Arc::new(EchoTool {
        runs: Arc::new(Mutex::new(0)),
    })]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    let stream = runner
        .run_stream(
            CancellationToken::new(),
            request(vec![Message::user("say hi")], 10, 0),
            noop_callback(),
        )
        .unwrap();
    let events = collect_events(stream).await;

    assert!(matches!(
        &events[0],
        AgentEvent::Reasoning { text } if text == "thinking"
    ));

    let partial_at = events
        .iter()
        .position(|e| matches!(e, AgentEvent::UseTool { partial: true, call } if call.name == "echo"))
        .expect("partial echo event");
    let completed_at = events
        .iter()
        .position(
            |e| matches!(e, AgentEvent::UseTool { partial: false, call } if call.name == "echo"),
        )
        .expect("completed echo event");
    assert!(partial_at < completed_at);

    match events.last().unwrap() {
        AgentEvent::UseTool { call, partial } => {
            assert!(!partial);
            assert_eq!(call.name, "complete_task");
            assert_eq!(call.input.get("reply"), Some(&json!("hi")));
        }
        other => panic!("unexpected final event: {other:?}"),
    }
    assert!(!events
        .iter()
        .any(|e| matches!(e, AgentEvent::Error { .. })));
}

#[tokio::test]
async fn test_xml_streaming_partial_events() {
    let model = Arc::new(ScriptedModel::streaming(vec![
        vec![
            StreamChunk::Text {
                text: "Let me think.<use-tool name=\"echo\">{\"text\":\"hel".into(),
            },
            StreamChunk::Text {
                text: "lo\"}</use-tool>".into(),
            },
        ],
        vec![StreamChunk::Text {
            text: "<use-tool name=\"complete_task\">{\"reply\":\"done\"}</use-tool>".into(),
        }],
    ]));
    let agent = agent_with(vec![Arc::new(EchoTool {
        runs: Arc::new(Mutex::new(0)),
    })]);
    let runner = AgentRunner::new(agent, model, WireFormat::Xml).unwrap();

    let stream = runner
        .run_stream(
            CancellationToken::new(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .unwrap();
    let events = collect_events(stream).await;

    let reasonings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Reasoning { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(reasonings, vec!["Let me think.".to_string()]);

    let partials = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::UseTool { partial: true, call } if call.name == "echo"))
        .count();
    assert!(partials >= 1);

    let completed = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::UseTool {
                partial: false,
                call,
            } if call.name == "echo" => Some(call.clone()),
            _ => None,
        })
        .expect("completed echo event");
    assert_eq!(completed.input.get("text"), Some(&json!("hello")));
}

#[tokio::test]
async fn test_streaming_max_iterations_single_error_event() {
    let turn = || {
        vec![StreamChunk::Text {
            text: r#"{"name":"noop","input":{}}"#.into(),
        }]
    };
    let model = Arc::new(ScriptedModel::streaming(vec![turn(), turn()]));
    let agent = agent_with(vec![Arc::new(NoopTool)]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    let stream = runner
        .run_stream(
            CancellationToken::new(),
            request(vec![Message::user("go")], 2, 0),
            noop_callback(),
        )
        .unwrap();
    let events = collect_events(stream).await;

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("max iterations"));
    assert!(matches!(events.last().unwrap(), AgentEvent::Error { .. }));
}

#[tokio::test]
async fn test_streaming_cancellation_emits_one_error_then_closes() {
    let model = Arc::new(StallingModel {
        first: r#"{"name":"echo","input":{"#.into(),
    });
    let agent = agent_with(vec![Arc::new(EchoTool {
        runs: Arc::new(Mutex::new(0)),
    })]);
    let runner = AgentRunner::new(agent, model, WireFormat::Json).unwrap();

    let token = CancellationToken::new();
    let mut stream = runner
        .run_stream(
            token.clone(),
            request(vec![Message::user("go")], 10, 0),
            noop_callback(),
        )
        .unwrap();

    // First event is the partial decoded from the only fragment.
    let first = stream.next().await.unwrap();
    assert!(matches!(first, AgentEvent::UseTool { partial: true, .. }));

    token.cancel();

    let second = stream.next().await.unwrap();
    match second {
        AgentEvent::Error { message } => assert!(message.contains("cancelled")),
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(stream.next().await.is_none());
}
