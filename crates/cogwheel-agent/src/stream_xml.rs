//! Incremental parser for a single XML-tagged envelope.
//!
//! Recognizes exactly one element (`<use-tool …> … </use-tool>`) in a
//! character stream: free-form text before the opening tag, a `name`
//! attribute, and the element content delivered incrementally. Anything after
//! the closing tag is ignored.

#[derive(Debug)]
pub struct XmlEnvelopeParser {
    open_pattern: String,
    close_pattern: String,
    buffer: String,
    /// Byte offset where the opening tag starts.
    open_at: Option<usize>,
    /// Byte offset just past the opening tag's '>'.
    content_at: Option<usize>,
    /// Byte offset where the closing tag starts.
    close_at: Option<usize>,
    name: Option<String>,
    /// Offset to resume the opening-tag search from.
    scan_from: usize,
}

impl XmlEnvelopeParser {
    pub fn new(element: &str) -> Self {
        Self {
            open_pattern: format!("<{element}"),
            close_pattern: format!("</{element}>"),
            buffer: String::new(),
            open_at: None,
            content_at: None,
            close_at: None,
            name: None,
            scan_from: 0,
        }
    }

    pub fn append(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        self.advance();
    }

    /// Whether the full opening tag (through its '>') has been seen.
    pub fn opened(&self) -> bool {
        self.content_at.is_some()
    }

    /// Whether the closing tag has been seen.
    pub fn closed(&self) -> bool {
        self.close_at.is_some()
    }

    /// Value of the element's `name` attribute, once the tag is open.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Text preceding the opening tag, trimmed. Available once the tag is
    /// open; empty text yields `None`.
    pub fn preamble(&self) -> Option<&str> {
        let open_at = self.open_at?;
        self.content_at?;
        let text = self.buffer[..open_at].trim();
        (!text.is_empty()).then_some(text)
    }

    /// Element content observed so far.
    ///
    /// While the element is open this excludes any trailing bytes that could
    /// be the beginning of the closing tag; the boundary only ever moves
    /// forward.
    pub fn content(&self) -> &str {
        let Some(start) = self.content_at else {
            return "";
        };
        if let Some(end) = self.close_at {
            return &self.buffer[start..end];
        }
        let tail = &self.buffer[start..];
        let held = held_back(tail, &self.close_pattern);
        &tail[..tail.len() - held]
    }

    fn advance(&mut self) {
        if self.open_at.is_none() {
            self.find_open_tag();
        }
        if let Some(open_at) = self.open_at {
            if self.content_at.is_none() {
                if let Some(gt) = self.buffer[open_at..].find('>') {
                    let tag = &self.buffer[open_at..open_at + gt];
                    self.name = attribute(tag, "name");
                    self.content_at = Some(open_at + gt + 1);
                }
            }
        }
        if let Some(start) = self.content_at {
            if self.close_at.is_none() {
                if let Some(close) = self.buffer[start..].find(&self.close_pattern) {
                    self.close_at = Some(start + close);
                }
            }
        }
    }

    /// Locate `<element` followed by whitespace, '>' or '/'; a name that
    /// merely shares the prefix (e.g. `<use-toolbox>`) does not match.
    fn find_open_tag(&mut self) {
        while let Some(found) = self.buffer[self.scan_from..].find(&self.open_pattern) {
            let at = self.scan_from + found;
            let after = at + self.open_pattern.len();
            match self.buffer[after..].chars().next() {
                None => {
                    // Tag name may continue in the next fragment; retry here.
                    self.scan_from = at;
                    return;
                }
                Some(c) if c.is_whitespace() || c == '>' || c == '/' => {
                    self.open_at = Some(at);
                    return;
                }
                Some(_) => {
                    self.scan_from = after;
                }
            }
        }
        // No match; safe to skip all but a possible partial tag at the end.
        let held = held_back(&self.buffer[self.scan_from..], &self.open_pattern);
        self.scan_from = self.buffer.len() - held;
    }
}

/// Length of the longest buffer suffix that is a prefix of `pattern`.
fn held_back(s: &str, pattern: &str) -> usize {
    let max = pattern.len().min(s.len());
    for k in (1..=max).rev() {
        if s.is_char_boundary(s.len() - k) && pattern.starts_with(&s[s.len() - k..]) {
            return k;
        }
    }
    0
}

/// Extract a quoted attribute value from the text of an opening tag.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut search = tag;
    loop {
        let at = search.find(name)?;
        let rest = &search[at + name.len()..];
        let rest = rest.trim_start();
        if let Some(rest) = rest.strip_prefix('=') {
            let rest = rest.trim_start();
            let quote = rest.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &rest[1..];
                let end = inner.find(quote)?;
                return Some(inner[..end].to_string());
            }
        }
        search = &search[at + name.len()..];
    }
}
