//! The think/act iteration controller.
//!
//! One runner covers all four realizations: the wire format (JSON or XML) is
//! a decoder/template parameter, and blocking vs. streaming execution are the
//! [`AgentRunner::run`] and [`AgentRunner::run_stream`] entry points over the
//! same per-iteration skeleton.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cogwheel_core::{
    AgentError, AgentEvent, AgentRequest, AgentResponse, Message, Result, TokenUsage, ToolCall,
    DEFAULT_MAX_MESSAGE_HISTORY,
};
use cogwheel_hooks::Callback;
use cogwheel_models::{CompletionModel, CompletionRequest, StreamChunk};
use cogwheel_tools::{CompleteTaskTool, ToolRegistry, COMPLETE_TASK_TOOL_NAME};

use crate::agent::Agent;
use crate::context::AgentContext;
use crate::decode::{DecodeProgress, JsonToolCallDecoder, ToolCallDecoder, XmlToolCallDecoder};
use crate::prompt::{system_prompt, JSON_SYSTEM_TEMPLATE, XML_SYSTEM_TEMPLATE};

/// Capacity of the streaming event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Stream of events from [`AgentRunner::run_stream`]; finite, closed when the
/// producer exits.
pub type AgentEventStream = ReceiverStream<AgentEvent>;

/// On-the-wire encoding of the model's tool choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// One JSON object per turn: `{"name": …, "input": {…}}`.
    Json,
    /// Reasoning prose followed by `<use-tool name="…">{…}</use-tool>`.
    Xml,
}

impl WireFormat {
    fn decoder(&self) -> Box<dyn ToolCallDecoder> {
        match self {
            WireFormat::Json => Box::new(JsonToolCallDecoder::new()),
            WireFormat::Xml => Box::new(XmlToolCallDecoder::new()),
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            WireFormat::Json => JSON_SYSTEM_TEMPLATE,
            WireFormat::Xml => XML_SYSTEM_TEMPLATE,
        }
    }
}

/// Runner options.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Custom system prompt template, replacing the embedded one.
    pub system_prompt: Option<String>,

    /// Cap on the conversation history kept during a run; the first message
    /// is always preserved when compacting.
    pub max_message_history: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_message_history: DEFAULT_MAX_MESSAGE_HISTORY,
        }
    }
}

/// Drives an agent through the think/act loop against a model client.
pub struct AgentRunner {
    agent: Arc<Agent>,
    model: Arc<dyn CompletionModel>,
    registry: Arc<ToolRegistry>,
    format: WireFormat,
    config: RunnerConfig,
}

impl AgentRunner {
    /// Validate the agent and register its tools.
    pub fn new(
        agent: Agent,
        model: Arc<dyn CompletionModel>,
        format: WireFormat,
    ) -> Result<Self> {
        agent.validate()?;
        let registry = ToolRegistry::new();
        for tool in &agent.tools {
            registry.register(tool.clone())?;
        }
        Ok(Self {
            agent: Arc::new(agent),
            model,
            registry: Arc::new(registry),
            format,
            config: RunnerConfig::default(),
        })
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Blocking run: loops until `complete_task` fires, the iteration budget
    /// is exhausted, or the token is cancelled.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        request: AgentRequest,
        callback: Arc<dyn Callback>,
    ) -> Result<AgentResponse> {
        request.validate()?;
        self.register_complete_task(&request);
        let core = LoopCore::new(self, cancel, request, callback);
        core.run_blocking().await
    }

    /// Streaming run: spawns a producer task and returns a bounded event
    /// stream. Exactly one terminal error event is emitted on failure.
    pub fn run_stream(
        &self,
        cancel: CancellationToken,
        request: AgentRequest,
        callback: Arc<dyn Callback>,
    ) -> Result<AgentEventStream> {
        request.validate()?;
        self.register_complete_task(&request);
        let core = LoopCore::new(self, cancel, request, callback);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            if let Err(e) = core.run_streaming(&tx).await {
                let _ = tx
                    .send(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    /// Registered on every run; an already-present tool is left in place.
    fn register_complete_task(&self, request: &AgentRequest) {
        let _ = self.registry.register(Arc::new(CompleteTaskTool::new(
            request.output_schema.clone(),
            request.output_usage.clone(),
        )));
    }
}

enum StepOutcome {
    Continue,
    Completed(Value),
}

/// Owned state for one run of the loop, shared by both entry points.
struct LoopCore {
    agent: Arc<Agent>,
    model: Arc<dyn CompletionModel>,
    registry: Arc<ToolRegistry>,
    format: WireFormat,
    system_prompt: Option<String>,
    max_message_history: usize,
    cancel: CancellationToken,
    callback: Arc<dyn Callback>,
    max_iterations: u32,
    max_retries: u32,
    messages: Vec<Message>,
    /// The user message the run was asked about, cached at start so prompt
    /// assembly is unaffected by compaction.
    user_message: Message,
    context: AgentContext,
    usage: TokenUsage,
    cost: Option<f64>,
    consecutive_errors: u32,
}

impl LoopCore {
    fn new(
        runner: &AgentRunner,
        cancel: CancellationToken,
        request: AgentRequest,
        callback: Arc<dyn Callback>,
    ) -> Self {
        let messages = request.messages;
        // Validation guarantees a trailing user message.
        let user_message = messages
            .last()
            .cloned()
            .unwrap_or_else(|| Message::user(String::new()));
        let context = AgentContext::new(runner.agent.clone(), messages.clone());

        Self {
            agent: runner.agent.clone(),
            model: runner.model.clone(),
            registry: runner.registry.clone(),
            format: runner.format,
            system_prompt: runner.config.system_prompt.clone(),
            max_message_history: runner.config.max_message_history,
            cancel,
            callback,
            max_iterations: request.max_iterations,
            max_retries: request.max_retries,
            messages,
            user_message,
            context,
            usage: TokenUsage::default(),
            cost: None,
            consecutive_errors: 0,
        }
    }

    async fn run_blocking(mut self) -> Result<AgentResponse> {
        debug!(agent = %self.agent.name, model = self.model.name(), "Starting agent run");

        for i in 0..self.max_iterations {
            let iteration = i + 1;
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(iteration, "Agent loop iteration");

            let prompts = self.assemble_prompt()?;
            if let Some(text) = self.before_model(&prompts).await {
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }

            let completion_request = CompletionRequest {
                instructions: prompts.clone(),
                messages: self.messages.clone(),
            };
            let completion = match self.model.complete(&completion_request).await {
                Ok(completion) => completion,
                Err(e) => {
                    let text = format!(
                        "Model completion failed: {e}\n\nPlease try a different approach or tool."
                    );
                    self.inject(iteration, text);
                    self.bump_retries()?;
                    self.compact();
                    continue;
                }
            };
            self.fold_usage(completion.usage.as_ref(), completion.cost);

            if let Some(text) = self
                .after_model(&prompts, &completion.output, completion.usage.as_ref())
                .await
            {
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }

            let mut decoder = self.format.decoder();
            decoder.push(&completion.output);
            let call = match decoder.parse() {
                Ok(DecodeProgress {
                    call: Some(call),
                    completed: true,
                    ..
                }) => call,
                Ok(_) => {
                    let text = self
                        .decode_failure_text(&completion.output, "incomplete tool call in output");
                    self.inject(iteration, text);
                    self.bump_retries()?;
                    self.compact();
                    continue;
                }
                Err(e) => {
                    let text = self.decode_failure_text(&completion.output, &e.to_string());
                    self.inject(iteration, text);
                    self.bump_retries()?;
                    self.compact();
                    continue;
                }
            };

            let mut call = call;
            call.id = Uuid::new_v4().to_string();
            self.messages.push(Message::assistant_tool_call(call.clone()));

            match self.dispatch(iteration, call).await? {
                StepOutcome::Completed(output) => {
                    self.compact();
                    return Ok(AgentResponse {
                        output,
                        usage: self.usage,
                        cost: self.cost,
                    });
                }
                StepOutcome::Continue => self.compact(),
            }
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }

    async fn run_streaming(mut self, events: &mpsc::Sender<AgentEvent>) -> Result<()> {
        debug!(agent = %self.agent.name, model = self.model.name(), "Starting streaming agent run");

        for i in 0..self.max_iterations {
            let iteration = i + 1;
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(iteration, "Agent loop iteration");

            let prompts = self.assemble_prompt()?;
            if let Some(text) = self.before_model(&prompts).await {
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }

            let completion_request = CompletionRequest {
                instructions: prompts.clone(),
                messages: self.messages.clone(),
            };
            let mut stream = match self.model.stream_complete(&completion_request).await {
                Ok(stream) => stream,
                Err(e) => {
                    let text = format!(
                        "Model streaming failed: {e}\n\nPlease try a different approach or tool."
                    );
                    self.inject(iteration, text);
                    self.bump_retries()?;
                    self.compact();
                    continue;
                }
            };

            let mut decoder = self.format.decoder();
            let mut final_call: Option<ToolCall> = None;
            let mut full_output = String::new();
            let mut stream_failure: Option<String> = None;
            let mut decode_failure: Option<String> = None;

            loop {
                let chunk = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else { break };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        stream_failure = Some(e.to_string());
                        break;
                    }
                };

                match chunk {
                    StreamChunk::Reasoning { text } => {
                        self.emit(events, AgentEvent::Reasoning { text }).await?;
                    }
                    StreamChunk::Usage { usage, cost } => {
                        self.fold_usage(Some(&usage), cost);
                    }
                    StreamChunk::Text { text } => {
                        full_output.push_str(&text);
                        decoder.push(&text);
                        match decoder.parse() {
                            Err(e) => {
                                decode_failure = Some(e.to_string());
                                break;
                            }
                            Ok(progress) => {
                                if let Some(reasoning) = progress.reasoning {
                                    self.emit(events, AgentEvent::Reasoning { text: reasoning })
                                        .await?;
                                }
                                if let Some(call) = progress.call {
                                    if progress.completed {
                                        final_call = Some(call);
                                        break;
                                    }
                                    self.emit(events, AgentEvent::UseTool { call, partial: true })
                                        .await?;
                                }
                            }
                        }
                    }
                }
            }

            if let Some(e) = stream_failure {
                let text = format!(
                    "Model streaming failed: {e}\n\nPlease try a different approach or tool."
                );
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }
            if let Some(e) = decode_failure {
                let text = self.decode_failure_text(&full_output, &e);
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }

            let usage_so_far = self.usage;
            if let Some(text) = self
                .after_model(&prompts, &full_output, Some(&usage_so_far))
                .await
            {
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            }

            let Some(mut call) = final_call else {
                let text = self.no_tool_call_text();
                self.inject(iteration, text);
                self.bump_retries()?;
                self.compact();
                continue;
            };

            call.id = Uuid::new_v4().to_string();
            self.messages.push(Message::assistant_tool_call(call.clone()));
            self.emit(
                events,
                AgentEvent::UseTool {
                    call: call.clone(),
                    partial: false,
                },
            )
            .await?;

            match self.dispatch(iteration, call).await? {
                StepOutcome::Completed(_) => {
                    self.compact();
                    return Ok(());
                }
                StepOutcome::Continue => self.compact(),
            }
        }

        Err(AgentError::MaxIterations(self.max_iterations))
    }

    /// Look up the tool, fire hooks, execute, and record the outcome.
    async fn dispatch(&mut self, iteration: u32, mut call: ToolCall) -> Result<StepOutcome> {
        let tool = match self.registry.get(&call.name) {
            Ok(tool) => tool,
            Err(_) => {
                // A conversation-level fault: injected, never retry-counted.
                let mut names = self.registry.names();
                names.sort();
                let text = format!(
                    "Tool '{}' not found.\n\nAvailable tools: {names:?}\n\nPlease use one of the available tools.",
                    call.name
                );
                self.inject(iteration, text);
                return Ok(StepOutcome::Continue);
            }
        };
        let sentinel = call.name == COMPLETE_TASK_TOOL_NAME;

        if !sentinel {
            match self
                .callback
                .before_tool(&self.cancel, &call.name, &call.input)
                .await
            {
                Err(e) => {
                    let text = format!(
                        "BeforeToolCall callback failed for tool '{}'.\n\nError: {e}\n\nPlease try a different tool or approach.",
                        call.name
                    );
                    self.inject(iteration, text);
                    self.bump_retries()?;
                    return Ok(StepOutcome::Continue);
                }
                Ok(Some(substitute)) => {
                    // Hook supplied the result; the tool body is skipped.
                    let content = serde_json::to_string(&substitute)?;
                    info!(tool = %call.name, "Tool result substituted by before_tool hook");
                    self.messages.push(Message::tool(content));
                    self.consecutive_errors = 0;
                    return Ok(StepOutcome::Continue);
                }
                Ok(None) => {}
            }
        }

        info!(tool = %call.name, iteration, "Executing tool");
        let tool_context = self.context.tool_context(self.cancel.clone());
        call.started_at = Some(Utc::now());
        let result = tool.run(&tool_context, &call.input).await;
        call.ended_at = Some(Utc::now());

        match result {
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution error");
                self.context.append_tool_call(call.clone());
                let summary = input_summary(&call.input);
                let text = format!(
                    "Tool '{}' execution failed.\n\nTool Input: {summary}\n\nError: {e}\n\nPlease review the error and adjust your tool parameters or try a different approach.",
                    call.name
                );
                self.inject(iteration, text);
                self.bump_retries()?;
                Ok(StepOutcome::Continue)
            }
            Ok(output) => {
                self.consecutive_errors = 0;

                if !sentinel {
                    if let Err(e) = self
                        .callback
                        .after_tool(&self.cancel, &call.name, &call.input, output.as_ref())
                        .await
                    {
                        self.context.append_tool_call(call.clone());
                        let text = format!(
                            "AfterToolCall callback failed for tool '{}'.\n\nError: {e}\n\nThe tool executed successfully, but post-processing failed. Please proceed with the next step.",
                            call.name
                        );
                        self.inject(iteration, text);
                        self.bump_retries()?;
                        return Ok(StepOutcome::Continue);
                    }
                }

                if sentinel {
                    let value = output.unwrap_or(Value::Null);
                    call.output = Some(serde_json::to_string(&value)?);
                    self.context.append_tool_call(call.clone());
                    self.messages.push(Message::tool_result(call));
                    Ok(StepOutcome::Completed(value))
                } else {
                    match output {
                        None => {
                            self.context.append_tool_call(call);
                            self.messages
                                .push(Message::tool("Tool call success, no results"));
                        }
                        Some(value) => {
                            call.output = Some(serde_json::to_string(&value)?);
                            self.context.append_tool_call(call.clone());
                            self.messages.push(Message::tool_result(call));
                        }
                    }
                    Ok(StepOutcome::Continue)
                }
            }
        }
    }

    fn assemble_prompt(&self) -> Result<String> {
        let template = self
            .system_prompt
            .as_deref()
            .unwrap_or_else(|| self.format.default_template());
        let tools = self.registry.list();
        system_prompt(template, &self.agent, &self.user_message, &tools)
    }

    async fn before_model(&self, prompts: &str) -> Option<String> {
        let result = self
            .callback
            .before_model(
                &self.cancel,
                self.provider_id(),
                self.model_id(),
                prompts,
                &self.messages,
            )
            .await;
        result.err().map(|e| {
            format!("Failed to execute BeforeModel callback: {e}\n\nPlease adjust your approach and try again.")
        })
    }

    async fn after_model(
        &self,
        prompts: &str,
        output: &str,
        usage: Option<&TokenUsage>,
    ) -> Option<String> {
        let result = self
            .callback
            .after_model(
                &self.cancel,
                self.provider_id(),
                self.model_id(),
                prompts,
                &self.messages,
                output,
                usage,
            )
            .await;
        result.err().map(|e| {
            format!("Failed to execute AfterModel callback: {e}\n\nPlease adjust your approach and try again.")
        })
    }

    async fn emit(&self, events: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<()> {
        // A dropped receiver means nobody is listening; treat as cancellation.
        events.send(event).await.map_err(|_| AgentError::Cancelled)
    }

    fn provider_id(&self) -> &str {
        self.agent
            .model_provider
            .as_deref()
            .unwrap_or_else(|| self.model.name())
    }

    fn model_id(&self) -> &str {
        self.agent.model.as_deref().unwrap_or_default()
    }

    /// Convert a recoverable failure into a user message so the next model
    /// turn can self-correct.
    fn inject(&mut self, iteration: u32, text: String) {
        warn!(iteration, "Recoverable error injected into conversation");
        self.messages
            .push(Message::user(format!("ERROR [Iteration {iteration}]: {text}")));
    }

    fn bump_retries(&mut self) -> Result<()> {
        self.consecutive_errors += 1;
        if self.max_retries > 0 && self.consecutive_errors > self.max_retries {
            return Err(AgentError::RetriesExceeded(self.max_retries));
        }
        Ok(())
    }

    fn compact(&mut self) {
        compact_history(&mut self.messages, self.max_message_history);
    }

    fn fold_usage(&mut self, usage: Option<&TokenUsage>, cost: Option<f64>) {
        if let Some(usage) = usage {
            self.usage.add(usage);
        }
        if let Some(cost) = cost {
            self.cost = Some(self.cost.unwrap_or(0.0) + cost);
        }
    }

    fn decode_failure_text(&self, output: &str, error: &str) -> String {
        match self.format {
            WireFormat::Json => format!(
                "Failed to parse tool call from your response.\n\nInvalid JSON: {output}\n\nError: {error}\n\nPlease ensure your response is valid JSON matching the tool call schema."
            ),
            WireFormat::Xml => format!(
                "Failed to parse tool call from your response.\n\nInvalid XML: {output}\n\nError: {error}\n\nPlease ensure your response contains a valid <use-tool> tag with proper JSON input."
            ),
        }
    }

    fn no_tool_call_text(&self) -> String {
        match self.format {
            WireFormat::Json => "No valid tool call was generated. You MUST call a tool.\n\nPlease ensure your response contains a valid tool call.".to_string(),
            WireFormat::Xml => "No valid tool call was generated. You MUST call a tool.\n\nPlease ensure your response contains a valid <use-tool> tag.".to_string(),
        }
    }
}

/// Drop the oldest middle messages to fit the cap, preserving the first.
fn compact_history(messages: &mut Vec<Message>, cap: usize) {
    if messages.len() <= cap {
        return;
    }
    let keep_tail = cap.saturating_sub(1);
    let tail_start = messages.len() - keep_tail;
    let mut compacted = Vec::with_capacity(cap);
    if let Some(first) = messages.first().cloned() {
        compacted.push(first);
    }
    compacted.extend(messages.split_off(tail_start));
    debug!(len = compacted.len(), "History compacted");
    *messages = compacted;
}

/// Bounded printable form of a tool input for error messages.
fn input_summary(input: &Map<String, Value>) -> String {
    let text = Value::Object(input.clone()).to_string();
    if text.chars().count() > 200 {
        let prefix: String = text.chars().take(200).collect();
        format!("{prefix}...")
    } else {
        text
    }
}
