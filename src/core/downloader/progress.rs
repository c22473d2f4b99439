use serde::Serialize;
use tokio::sync::mpsc;

/// Progress notification emitted from inside in-flight fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub item: String,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
}

/// Outward, one-way channel. Fetches never wait on the consumer.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}
