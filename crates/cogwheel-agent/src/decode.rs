//! Tool-call decoders over fragmented model output.
//!
//! One decoder per wire format, behind a common capability so the iteration
//! controller is agnostic to the encoding: push text fragments, pull the
//! tentative or final tool call.

use serde::Deserialize;
use serde_json::{Map, Value};

use cogwheel_core::{AgentError, Result, ToolCall};

use crate::stream_json::StreamJsonParser;
use crate::stream_xml::XmlEnvelopeParser;

/// Progress of a decode: a tentative or final call, plus (XML mode) the
/// reasoning prose preceding the tool call, reported exactly once.
#[derive(Debug, Default)]
pub struct DecodeProgress {
    pub call: Option<ToolCall>,
    pub completed: bool,
    pub reasoning: Option<String>,
}

/// Capability of reconstructing a tool call from streamed text.
pub trait ToolCallDecoder: Send {
    /// Buffer a fragment of model output.
    fn push(&mut self, fragment: &str);

    /// Evaluate the buffered input. Once `completed` has been reported it
    /// stays reported; malformed input is a [`AgentError::Decode`] error.
    fn parse(&mut self) -> Result<DecodeProgress>;
}

/// Wire shape of a JSON turn: `{"name": …, "input": {…}}`, extra keys ignored.
#[derive(Debug, Deserialize)]
struct ToolCallWire {
    name: String,
    #[serde(default)]
    input: Map<String, Value>,
}

/// Decoder for the JSON wire format.
#[derive(Debug, Default)]
pub struct JsonToolCallDecoder {
    parser: StreamJsonParser,
    pending_error: Option<String>,
}

impl JsonToolCallDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ToolCallDecoder for JsonToolCallDecoder {
    fn push(&mut self, fragment: &str) {
        if self.pending_error.is_some() {
            return;
        }
        if let Err(e) = self.parser.append(fragment) {
            self.pending_error = Some(e.to_string());
        }
    }

    fn parse(&mut self) -> Result<DecodeProgress> {
        if let Some(message) = &self.pending_error {
            return Err(AgentError::Decode(message.clone()));
        }

        if self.parser.is_complete() {
            let root = self.parser.snapshot().unwrap_or(Value::Null);
            let wire: ToolCallWire =
                serde_json::from_value(root).map_err(|e| AgentError::Decode(e.to_string()))?;
            return Ok(DecodeProgress {
                call: Some(ToolCall::new(wire.name, wire.input)),
                completed: true,
                reasoning: None,
            });
        }

        // Tentative: both top-level fields must be observable.
        if let (Some(Value::String(name)), Some(Value::Object(input))) =
            (self.parser.get("name"), self.parser.get("input"))
        {
            return Ok(DecodeProgress {
                call: Some(ToolCall::new(name, input)),
                completed: false,
                reasoning: None,
            });
        }

        Ok(DecodeProgress::default())
    }
}

/// Decoder for the XML wire format: reasoning prose, then a single
/// `<use-tool name="…">` element whose content is a streamed JSON object.
pub struct XmlToolCallDecoder {
    envelope: XmlEnvelopeParser,
    inner: StreamJsonParser,
    /// Bytes of envelope content already forwarded to the inner parser.
    forwarded: usize,
    reasoning_reported: bool,
}

impl XmlToolCallDecoder {
    pub fn new() -> Self {
        Self {
            envelope: XmlEnvelopeParser::new("use-tool"),
            inner: StreamJsonParser::new(),
            forwarded: 0,
            reasoning_reported: false,
        }
    }

    fn take_reasoning(&mut self) -> Option<String> {
        if self.reasoning_reported {
            return None;
        }
        let text = self.envelope.preamble()?.to_string();
        self.reasoning_reported = true;
        Some(text)
    }
}

impl Default for XmlToolCallDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallDecoder for XmlToolCallDecoder {
    fn push(&mut self, fragment: &str) {
        self.envelope.append(fragment);
        let content = self.envelope.content();
        if content.len() > self.forwarded {
            let delta = content[self.forwarded..].to_string();
            self.forwarded = content.len();
            // Inner-parser errors surface from parse() as a decode failure of
            // the whole element once it closes.
            let _ = self.inner.append(&delta);
        }
    }

    fn parse(&mut self) -> Result<DecodeProgress> {
        if !self.envelope.opened() {
            return Ok(DecodeProgress::default());
        }

        let reasoning = self.take_reasoning();

        if self.envelope.closed() {
            let content = self.envelope.content().trim();
            let input: Map<String, Value> = serde_json::from_str(content)
                .map_err(|e| AgentError::Decode(format!("invalid tool input JSON: {e}")))?;
            let name = self
                .envelope
                .name()
                .ok_or_else(|| AgentError::Decode("use-tool element has no name".into()))?;
            return Ok(DecodeProgress {
                call: Some(ToolCall::new(name, input)),
                completed: true,
                reasoning,
            });
        }

        // Tentative: name attribute plus whatever input has parsed so far.
        if let (Some(name), Some(Value::Object(input))) =
            (self.envelope.name(), self.inner.snapshot())
        {
            return Ok(DecodeProgress {
                call: Some(ToolCall::new(name, input)),
                completed: false,
                reasoning,
            });
        }

        Ok(DecodeProgress {
            reasoning,
            ..DecodeProgress::default()
        })
    }
}
