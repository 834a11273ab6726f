//! Toolchain output → structured progress events.
//!
//! `parse_line` is a pure matcher over one complete line. `ProgressParser`
//! wraps it with a line buffer so output delivered in arbitrary chunks (a
//! marker split across two reads, CRLF split between chunks) produces exactly
//! the events the unsplit text would.

use crate::models::ProgressEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

/// Ant prints task output as `    [javac] Compiling 3 source files to /x/build/classes`.
static COMPILING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Compiling (\d+) source files?\b").expect("valid compiling pattern")
});

static PACKAGED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Building (?:zip|jar): (\S.*?)\s*$").expect("valid packaged pattern")
});

static COMPLETED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:Extension built|Output written to): (\S.*?)\s*$")
        .expect("valid completed pattern")
});

/// Match one complete output line against the known toolchain markers.
pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    if let Some(caps) = COMPILING_REGEX.captures(line) {
        if let Ok(file_count) = caps[1].parse::<u32>() {
            return Some(ProgressEvent::CompilationStarted { file_count });
        }
    }

    if let Some(caps) = PACKAGED_REGEX.captures(line) {
        return Some(ProgressEvent::ArtifactPackaged {
            path: PathBuf::from(&caps[1]),
        });
    }

    if let Some(caps) = COMPLETED_REGEX.captures(line) {
        return Some(ProgressEvent::BuildCompleted {
            path: PathBuf::from(&caps[1]),
        });
    }

    None
}

/// Incremental parser that buffers partial lines across `feed` calls.
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pending: String,
}

impl ProgressParser {
    pub fn new() -> Self {
        ProgressParser {
            pending: String::new(),
        }
    }

    /// Consume a chunk and return events for every line it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressEvent> {
        self.pending.push_str(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].find('\n') {
            let end = consumed + offset;
            let line = self.pending[consumed..end].trim_end_matches('\r');
            if let Some(event) = parse_line(line) {
                events.push(event);
            }
            consumed = end + 1;
        }
        self.pending.drain(..consumed);
        events
    }

    /// Parse whatever unterminated line remains; the parser is empty afterwards.
    pub fn finish(&mut self) -> Vec<ProgressEvent> {
        let line = std::mem::take(&mut self.pending);
        parse_line(line.trim_end_matches('\r')).into_iter().collect()
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Parse a complete piece of output in one go.
pub fn parse_output(output: &str) -> Vec<ProgressEvent> {
    let mut parser = ProgressParser::new();
    let mut events = parser.feed(output);
    events.extend(parser.finish());
    events
}
