//! Output rendering for routed completions.
//!
//! Defines the [`Renderer`] trait that decouples completion events from the
//! display layer. [`StdoutRenderer`] prints chunks to the terminal as they
//! arrive and keeps the text of the current attempt.

use colored::Colorize;
use std::io::{self, Write};

use crate::fallback::StreamEvent;

/// Trait for rendering a streamed completion.
pub trait Renderer {
    /// Render a single chunk as it arrives.
    fn render_token(&mut self, token: &str);

    /// Output so far came from a failed attempt and is being replaced.
    fn render_restart(&mut self, provider: &str, model: &str);

    /// Called when the full response is complete.
    fn render_done(&mut self);

    /// Called when the request ends in failure.
    fn render_error(&mut self, err: &str);

    /// Routes one stream event to the matching method.
    fn render_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Chunk(text) => self.render_token(text),
            StreamEvent::Restart { provider, model } => self.render_restart(provider, model),
        }
    }
}

/// Renders streamed output directly to stdout.
///
/// Each chunk is printed immediately with an explicit flush so the user
/// sees a "typing" effect.
pub struct StdoutRenderer {
    chunk_count: usize,
    buffer: String,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self {
            chunk_count: 0,
            buffer: String::new(),
        }
    }

    /// Chunks rendered for the current attempt.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Text of the current attempt.
    pub fn raw_text(&self) -> &str {
        &self.buffer
    }
}

impl Default for StdoutRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for StdoutRenderer {
    fn render_token(&mut self, token: &str) {
        self.buffer.push_str(token);
        print!("{}", token);
        io::stdout().flush().ok();
        self.chunk_count += 1;
    }

    fn render_restart(&mut self, provider: &str, model: &str) {
        self.buffer.clear();
        self.chunk_count = 0;
        println!();
        println!(
            "{}",
            format!("[{provider}/{model} failed mid-answer, retrying with the next model]")
                .yellow()
                .dimmed()
        );
    }

    fn render_done(&mut self) {
        println!();
        println!();
        println!("{}", format!("[{} chunks]", self.chunk_count).dimmed());
    }

    fn render_error(&mut self, err: &str) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), err);
    }
}
