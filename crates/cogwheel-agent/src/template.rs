//! Minimal `{{path}}` prompt templates with a process-wide parse cache.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

use cogwheel_core::{AgentError, Result};

/// A parsed template: literal runs interleaved with dotted-path parameters.
#[derive(Debug)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Param(Vec<String>),
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                AgentError::InvalidConfiguration("unclosed '{{' in prompt template".into())
            })?;
            let path = after[..close].trim();
            if path.is_empty() {
                return Err(AgentError::InvalidConfiguration(
                    "empty parameter in prompt template".into(),
                ));
            }
            segments.push(Segment::Param(
                path.split('.').map(str::to_string).collect(),
            ));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render against a parameter tree. Missing parameters are an error.
    pub fn render(&self, params: &Value) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Param(path) => {
                    let mut node = params;
                    for key in path {
                        node = node.get(key).ok_or_else(|| {
                            AgentError::InvalidConfiguration(format!(
                                "unknown template parameter '{}'",
                                path.join(".")
                            ))
                        })?;
                    }
                    match node {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(out)
    }
}

fn cache() -> &'static RwLock<HashMap<String, Arc<PromptTemplate>>> {
    static CACHE: OnceLock<RwLock<HashMap<String, Arc<PromptTemplate>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Render a template source, caching the parsed form keyed by source text.
pub fn render_cached(source: &str, params: &Value) -> Result<String> {
    if let Some(template) = cache().read().unwrap().get(source).cloned() {
        return template.render(params);
    }

    let mut templates = cache().write().unwrap();
    // Double-check: another task may have parsed it while we waited.
    let template = match templates.get(source) {
        Some(template) => template.clone(),
        None => {
            let template = Arc::new(PromptTemplate::parse(source)?);
            templates.insert(source.to_string(), template.clone());
            template
        }
    };
    drop(templates);

    template.render(params)
}
