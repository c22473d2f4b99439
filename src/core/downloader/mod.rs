pub mod client;
pub mod progress;
pub mod task;

pub use client::{sha1_hex, Downloader};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use task::{DownloadReport, DownloadTask, FetchFailure, FetchOutcome};
