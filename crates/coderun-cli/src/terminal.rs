//! Terminal front end for a session.
//!
//! The local terminal already echoes typed lines, so local-echo updates only
//! advance what the renderer believes is on screen. Remote output is written
//! as the difference between what is shown and the new transcript.

use anyhow::Result;
use coderun_core::{SessionEvent, SessionHandle};
use coderun_types::{SessionState, TextSource};
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Exit status when the run was stopped by the user.
pub const EXIT_STOPPED: i32 = 130;

/// Tracks what is on screen and computes the bytes to reach a new transcript.
#[derive(Debug, Default)]
pub struct TranscriptRenderer {
    shown: String,
}

impl TranscriptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output that turns the screen into `next`.
    pub fn render(&mut self, next: &str) -> String {
        let common = common_prefix_len(&self.shown, next);
        let removed = self.shown[common..].chars().count();

        let mut out = String::with_capacity(removed * 3 + next.len() - common);
        for _ in 0..removed {
            out.push_str("\u{8} \u{8}");
        }
        out.push_str(&next[common..]);

        self.shown = next.to_string();
        out
    }

    /// Record that the screen already shows `next`.
    pub fn sync(&mut self, next: &str) {
        self.shown = next.to_string();
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()))
}

/// Stdin lines read ahead of the program asking for them.
///
/// The engine announces waiting once and then keeps reading stdin, so every
/// queued line is handed over while the program waits.
#[derive(Debug, Default)]
pub struct LineQueue {
    pending: VecDeque<String>,
}

impl LineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        self.pending.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Lines to submit now: all of them while waiting for input, else none.
    pub fn take_ready(&mut self, state: SessionState) -> Vec<String> {
        if state == SessionState::WaitingForInput {
            self.pending.drain(..).collect()
        } else {
            Vec::new()
        }
    }

    /// Put unsent lines back ahead of anything queued since.
    pub fn requeue(&mut self, lines: impl IntoIterator<Item = String>) {
        let lines: Vec<String> = lines.into_iter().collect();
        for line in lines.into_iter().rev() {
            self.pending.push_front(line);
        }
    }
}

/// Language label implied by a file extension.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "c" => Some("C"),
        "cpp" | "cc" | "cxx" | "c++" => Some("C++"),
        "java" => Some("Java"),
        "py" => Some("Python"),
        "js" | "mjs" | "cjs" => Some("JavaScript"),
        _ => None,
    }
}

/// Process exit code for the state a run settled in.
pub fn exit_code(state: SessionState) -> i32 {
    match state {
        SessionState::Completed => 0,
        SessionState::Idle => EXIT_STOPPED,
        _ => 1,
    }
}

/// Start a run and drive it from the terminal until it settles.
///
/// Stdin lines are queued until the program waits for input, then all of
/// them are submitted. Ctrl-C stops the run.
pub async fn run_interactive(
    handle: &SessionHandle,
    code: String,
    language: &str,
    initial_input: Option<String>,
) -> Result<i32> {
    let mut events = handle.subscribe();
    handle.start_with_input(code, language, initial_input).await?;

    let mut renderer = TranscriptRenderer::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut queue = LineQueue::new();
    let mut stdin_open = true;
    let mut stop_requested = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::TranscriptUpdated { transcript, source, .. }) => match source {
                    TextSource::Remote => {
                        stdout.write_all(renderer.render(&transcript).as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    TextSource::LocalEcho => renderer.sync(&transcript),
                },
                Ok(SessionEvent::StateChanged { new_state, .. }) => {
                    if new_state == SessionState::WaitingForInput {
                        feed_lines(handle, &mut queue, new_state).await?;
                    } else if !new_state.is_active() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(target: "coderun::session", "Terminal fell behind by {} updates", missed);
                    stdout.write_all(renderer.render(&handle.transcript()).as_bytes()).await?;
                    stdout.flush().await?;
                    if !handle.state().is_active() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    queue.push(line);
                    feed_lines(handle, &mut queue, handle.state()).await?;
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(target: "coderun::input", "Reading stdin failed: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c(), if !stop_requested => {
                info!(target: "coderun::session", "Interrupted; stopping run");
                stop_requested = true;
                handle.stop().await?;
            }
        }
    }

    let settled = handle.wait_until_settled().await?;
    stdout.write_all(renderer.render(&settled.transcript).as_bytes()).await?;
    stdout.flush().await?;
    Ok(exit_code(settled.state))
}

async fn feed_lines(handle: &SessionHandle, queue: &mut LineQueue, state: SessionState) -> Result<()> {
    let mut ready = queue.take_ready(state).into_iter();
    while let Some(line) = ready.next() {
        if handle.submit_line(line.clone()).await? {
            continue;
        }
        if line.is_empty() {
            debug!(target: "coderun::input", "Skipping empty stdin line");
            continue;
        }
        // Program stopped waiting; hold the rest for the next request.
        queue.requeue(std::iter::once(line).chain(ready));
        debug!(target: "coderun::input", "{} stdin lines held back", queue.len());
        break;
    }
    Ok(())
}
