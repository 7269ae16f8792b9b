//! Log and progress sinks handed to a session by its caller.
//!
//! Every layer that has something to say receives the sink explicitly;
//! nothing in the engine writes to a global log stream except `tracing`.

use std::sync::Mutex;

/// Receives raw build output and engine decisions, one line at a time.
pub trait LogSink: Send + Sync {
    fn line(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn line(&self, line: &str) {
        self(line)
    }
}

/// Receives session progress as a percentage in `0..=100`.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn progress(&self, percent: u8) {
        self(percent)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn line(&self, _line: &str) {}
}

impl ProgressSink for NullSink {
    fn progress(&self, _percent: u8) {}
}

/// Buffers lines and progress values in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    progress: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

impl ProgressSink for MemorySink {
    fn progress(&self, percent: u8) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(percent);
        }
    }
}

/// Percentage for `attempt` out of `max_attempts`, clamped to 100.
pub fn attempt_percent(attempt: u32, max_attempts: u32) -> u8 {
    if max_attempts == 0 {
        return 100;
    }
    ((attempt as u64 * 100) / max_attempts as u64).min(100) as u8
}
