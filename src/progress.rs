//! Progress reporting for long stitching runs.

use log::info;

/// Receives `(percent, message)` updates while a pipeline runs.
///
/// `percent` is in `0.0..=100.0`. Updates may arrive from worker threads,
/// slightly out of order, when trimming runs in parallel.
pub trait ProgressSink: Sync {
    /// Report that the run reached `percent`.
    fn update(&self, percent: f32, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f32, &str) + Sync,
{
    fn update(&self, percent: f32, message: &str) {
        self(percent, message);
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _percent: f32, _message: &str) {}
}

/// Forwards updates to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&self, percent: f32, message: &str) {
        info!("[{percent:>5.1}%] {message}");
    }
}
