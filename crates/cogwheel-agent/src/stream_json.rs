//! Incremental JSON parser over fragmented input.
//!
//! Builds a [`serde_json::Value`] tree from a prefix of a JSON document so
//! that callers can observe fields before the document is complete. A token
//! is only committed once it is unambiguous: an unterminated string stays
//! invisible, and a primitive literal is held until its terminator arrives
//! (more digits could still follow a number).

use serde_json::{Map, Value};

use cogwheel_core::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ObjectExpect {
    KeyOrEnd,
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArrayExpect {
    ValueOrEnd,
    Value,
    CommaOrEnd,
}

#[derive(Debug)]
enum Frame {
    Object {
        map: Map<String, Value>,
        pending_key: Option<String>,
        expect: ObjectExpect,
    },
    Array {
        items: Vec<Value>,
        expect: ArrayExpect,
    },
}

/// Streaming JSON parser. Feed fragments with [`append`](Self::append); read
/// tentative state with [`get`](Self::get) and [`snapshot`](Self::snapshot);
/// [`is_complete`](Self::is_complete) latches once the root value closes.
#[derive(Debug, Default)]
pub struct StreamJsonParser {
    input: String,
    cursor: usize,
    stack: Vec<Frame>,
    root: Option<Value>,
    completed: bool,
    error: Option<String>,
}

impl StreamJsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fragment and advance the parse as far as the input allows.
    pub fn append(&mut self, fragment: &str) -> Result<()> {
        self.input.push_str(fragment);
        if let Some(message) = &self.error {
            return Err(AgentError::Decode(message.clone()));
        }
        if let Err(message) = self.advance() {
            self.error = Some(message.clone());
            return Err(AgentError::Decode(message));
        }
        Ok(())
    }

    /// True once the buffered input forms a complete JSON value. Monotonic.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Parse error observed so far, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current tentative value at a dotted path (empty path for the root).
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut node = self.snapshot()?;
        if path.is_empty() {
            return Some(node);
        }
        for key in path.split('.') {
            node = node.get(key)?.clone();
        }
        Some(node)
    }

    /// Best-effort view of the value parsed so far, including open containers.
    pub fn snapshot(&self) -> Option<Value> {
        if let Some(root) = &self.root {
            return Some(root.clone());
        }
        let mut frames = self.stack.iter().rev();
        let mut value = frame_value(frames.next()?);
        for frame in frames {
            value = attach_child(frame, value);
        }
        Some(value)
    }

    fn advance(&mut self) -> std::result::Result<(), String> {
        loop {
            self.skip_whitespace();
            if self.cursor >= self.input.len() {
                return Ok(());
            }
            if self.completed {
                // Trailing content after the root value is left unconsumed.
                return Ok(());
            }

            let rest = &self.input[self.cursor..];
            let c = rest.as_bytes()[0];
            match c {
                b'{' => {
                    self.expect_value_position()?;
                    self.stack.push(Frame::Object {
                        map: Map::new(),
                        pending_key: None,
                        expect: ObjectExpect::KeyOrEnd,
                    });
                    self.cursor += 1;
                }
                b'[' => {
                    self.expect_value_position()?;
                    self.stack.push(Frame::Array {
                        items: Vec::new(),
                        expect: ArrayExpect::ValueOrEnd,
                    });
                    self.cursor += 1;
                }
                b'}' => {
                    match self.stack.pop() {
                        Some(Frame::Object { map, expect, .. })
                            if expect == ObjectExpect::KeyOrEnd
                                || expect == ObjectExpect::CommaOrEnd =>
                        {
                            self.cursor += 1;
                            self.complete_value(Value::Object(map));
                        }
                        _ => return Err("unexpected '}'".into()),
                    }
                }
                b']' => {
                    match self.stack.pop() {
                        Some(Frame::Array { items, expect })
                            if expect == ArrayExpect::ValueOrEnd
                                || expect == ArrayExpect::CommaOrEnd =>
                        {
                            self.cursor += 1;
                            self.complete_value(Value::Array(items));
                        }
                        _ => return Err("unexpected ']'".into()),
                    }
                }
                b',' => {
                    match self.stack.last_mut() {
                        Some(Frame::Object { expect, .. })
                            if *expect == ObjectExpect::CommaOrEnd =>
                        {
                            *expect = ObjectExpect::Key;
                        }
                        Some(Frame::Array { expect, .. })
                            if *expect == ArrayExpect::CommaOrEnd =>
                        {
                            *expect = ArrayExpect::Value;
                        }
                        _ => return Err("unexpected ','".into()),
                    }
                    self.cursor += 1;
                }
                b':' => {
                    match self.stack.last_mut() {
                        Some(Frame::Object { expect, .. }) if *expect == ObjectExpect::Colon => {
                            *expect = ObjectExpect::Value;
                        }
                        _ => return Err("unexpected ':'".into()),
                    }
                    self.cursor += 1;
                }
                b'"' => {
                    let Some(end) = scan_string(rest) else {
                        // String not yet terminated; wait for more input.
                        return Ok(());
                    };
                    let decoded: String = serde_json::from_str(&rest[..end])
                        .map_err(|e| format!("invalid string literal: {e}"))?;
                    self.cursor += end;
                    let is_key = matches!(
                        self.stack.last(),
                        Some(Frame::Object {
                            expect: ObjectExpect::KeyOrEnd | ObjectExpect::Key,
                            ..
                        })
                    );
                    if is_key {
                        if let Some(Frame::Object {
                            pending_key,
                            expect,
                            ..
                        }) = self.stack.last_mut()
                        {
                            *pending_key = Some(decoded);
                            *expect = ObjectExpect::Colon;
                        }
                    } else {
                        self.expect_value_position()
                            .map_err(|_| "unexpected string".to_string())?;
                        self.complete_value(Value::String(decoded));
                    }
                }
                _ => {
                    let Some(end) = scan_literal(rest) else {
                        // Literal may still grow; wait for a terminator.
                        return Ok(());
                    };
                    if end == 0 {
                        return Err(format!("unexpected character '{}'", rest.chars().next().unwrap_or('?')));
                    }
                    let raw = &rest[..end];
                    let value: Value = serde_json::from_str(raw)
                        .map_err(|_| format!("invalid literal '{raw}'"))?;
                    self.expect_value_position()?;
                    self.cursor += end;
                    self.complete_value(value);
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.input.as_bytes();
        while self.cursor < bytes.len() && bytes[self.cursor].is_ascii_whitespace() {
            self.cursor += 1;
        }
    }

    /// Check the parser is positioned where a value may start.
    fn expect_value_position(&self) -> std::result::Result<(), String> {
        match self.stack.last() {
            None => {
                if self.root.is_some() {
                    Err("multiple root values".into())
                } else {
                    Ok(())
                }
            }
            Some(Frame::Object { expect, .. }) if *expect == ObjectExpect::Value => Ok(()),
            Some(Frame::Array { expect, .. })
                if *expect == ArrayExpect::ValueOrEnd || *expect == ArrayExpect::Value =>
            {
                Ok(())
            }
            _ => Err("value in unexpected position".into()),
        }
    }

    fn complete_value(&mut self, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::Object {
                map,
                pending_key,
                expect,
            }) => {
                if let Some(key) = pending_key.take() {
                    map.insert(key, value);
                }
                *expect = ObjectExpect::CommaOrEnd;
            }
            Some(Frame::Array { items, expect }) => {
                items.push(value);
                *expect = ArrayExpect::CommaOrEnd;
            }
            None => {
                self.root = Some(value);
                self.completed = true;
            }
        }
    }
}

fn frame_value(frame: &Frame) -> Value {
    match frame {
        Frame::Object { map, .. } => Value::Object(map.clone()),
        Frame::Array { items, .. } => Value::Array(items.clone()),
    }
}

/// Attach an in-progress child value to a clone of its parent frame.
fn attach_child(frame: &Frame, child: Value) -> Value {
    match frame {
        Frame::Object {
            map, pending_key, ..
        } => {
            let mut map = map.clone();
            if let Some(key) = pending_key {
                map.insert(key.clone(), child);
            }
            Value::Object(map)
        }
        Frame::Array { items, .. } => {
            let mut items = items.clone();
            items.push(child);
            Value::Array(items)
        }
    }
}

/// Byte length of a complete string literal at the start of `s` (including
/// both quotes), or `None` if the closing quote has not arrived yet.
fn scan_string(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Byte length of a primitive literal (number, bool, null) at the start of
/// `s`, or `None` if it runs to the end of the buffer and may still grow.
fn scan_literal(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' {
            i += 1;
        } else {
            return Some(i);
        }
    }
    None
}
