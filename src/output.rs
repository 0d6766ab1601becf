//! Output rendering.
//!
//! Components produce data (text fragments, diagnostics); only the
//! orchestrator writes it, through an [`OutputSink`]. The console sink
//! renders to stdout, the buffer sink records everything for tests.

use std::io::Write;

use crossterm::style::Stylize;
use futures::StreamExt;

use crate::ai::FragmentStream;

/// Destination for user-facing output.
pub trait OutputSink: Send {
    /// Write one streamed fragment, without a line break.
    fn fragment(&mut self, text: &str);

    /// Finish a streamed answer.
    fn end_stream(&mut self);

    /// Write a full line.
    fn line(&mut self, text: &str);

    /// Write a concise diagnostic line.
    fn diagnostic(&mut self, text: &str);
}

/// Consume a fragment stream into a sink.
///
/// A stream error ends the answer and is reported through `on_error`'s text.
/// Returns the full text that was rendered.
pub async fn render_stream(
    mut stream: FragmentStream,
    sink: &mut dyn OutputSink,
    on_error: impl Fn(&anyhow::Error) -> String + Send,
) -> String {
    let mut full = String::new();

    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                sink.fragment(&text);
                full.push_str(&text);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion stream failed");
                sink.end_stream();
                sink.diagnostic(&on_error(&e));
                return full;
            }
        }
    }

    sink.end_stream();
    full
}

/// Writes to stdout; diagnostics in yellow.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// Create a console sink.
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for ConsoleSink {
    fn fragment(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", text);
        let _ = stdout.flush();
    }

    fn end_stream(&mut self) {
        println!("\n");
    }

    fn line(&mut self, text: &str) {
        println!("{}", text);
    }

    fn diagnostic(&mut self, text: &str) {
        println!("{}", text.yellow());
    }
}

/// Something written to a [`BufferSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A streamed fragment
    Fragment(String),
    /// End of a streamed answer
    EndStream,
    /// A full line
    Line(String),
    /// A diagnostic line
    Diagnostic(String),
}

/// Records output in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    /// Everything written so far, in order
    pub events: Vec<OutputEvent>,
}

impl BufferSink {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Streamed text, one string per answer.
    pub fn answers(&self) -> Vec<String> {
        let mut answers = Vec::new();
        let mut current = String::new();
        for event in &self.events {
            match event {
                OutputEvent::Fragment(text) => current.push_str(text),
                OutputEvent::EndStream => answers.push(std::mem::take(&mut current)),
                _ => {}
            }
        }
        answers
    }

    /// Diagnostic lines.
    pub fn diagnostics(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Diagnostic(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Plain lines.
    pub fn lines(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Line(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl OutputSink for BufferSink {
    fn fragment(&mut self, text: &str) {
        self.events.push(OutputEvent::Fragment(text.to_string()));
    }

    fn end_stream(&mut self) {
        self.events.push(OutputEvent::EndStream);
    }

    fn line(&mut self, text: &str) {
        self.events.push(OutputEvent::Line(text.to_string()));
    }

    fn diagnostic(&mut self, text: &str) {
        self.events.push(OutputEvent::Diagnostic(text.to_string()));
    }
}
