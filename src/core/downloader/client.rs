use std::collections::HashMap;
use std::path::Path;

use futures_util::future::join_all;
use futures_util::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::core::config::DEFAULT_CONCURRENCY;
use crate::core::error::{LauncherError, LauncherResult};

use super::progress::{ProgressEvent, ProgressSender};
use super::task::{DownloadTask, FetchFailure, FetchOutcome};

const HASH_CHUNK: usize = 64 * 1024;

/// Concurrent, SHA-1 validated downloader.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    /// Maximum number of transfers in flight at once.
    concurrency: usize,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    // ── Single file ─────────────────────────────────────

    /// Place one artifact at `task.dest`.
    ///
    /// An existing destination that already satisfies the task is reported
    /// as `Skipped` without touching the network. Otherwise the body is
    /// streamed into a temp file next to the destination, hashed on the fly,
    /// and renamed into place only once it verifies. A partially written
    /// destination is never observable.
    #[instrument(skip(self, task), fields(item = %task.label))]
    pub async fn fetch(&self, task: &DownloadTask) -> FetchOutcome {
        if self.cancel.is_cancelled() {
            return FetchOutcome::Failure(FetchFailure::Cancelled);
        }

        match self.is_already_present(task).await {
            Ok(true) => {
                debug!("Up to date: {:?}", task.dest);
                return FetchOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => debug!("Could not inspect {:?}, refetching: {}", task.dest, e),
        }

        match self.transfer(task).await {
            Ok(bytes) => {
                debug!("Downloaded: {} -> {:?}", task.url, task.dest);
                FetchOutcome::Success { bytes }
            }
            Err(failure) => {
                debug!("Fetch failed for {}: {}", task.url, failure);
                FetchOutcome::Failure(failure)
            }
        }
    }

    async fn is_already_present(&self, task: &DownloadTask) -> LauncherResult<bool> {
        let metadata = match tokio::fs::metadata(&task.dest).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LauncherError::io(&task.dest, e)),
        };

        if let Some(size) = task.size {
            if size != metadata.len() {
                return Ok(false);
            }
        }

        match &task.sha1 {
            Some(expected) => Self::validate_sha1(&task.dest, expected).await,
            None => Ok(true),
        }
    }

    async fn transfer(&self, task: &DownloadTask) -> Result<u64, FetchFailure> {
        let network = |e: reqwest::Error| FetchFailure::Network {
            url: task.url.clone(),
            message: e.to_string(),
        };
        let io = |path: &Path, e: std::io::Error| FetchFailure::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(FetchFailure::Cancelled),
            response = self.client.get(&task.url).send() => response.map_err(network)?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                url: task.url.clone(),
                status: status.as_u16(),
            });
        }
        let total = response.content_length().or(task.size);

        let parent = task.dest.parent().ok_or_else(|| FetchFailure::Io {
            path: task.dest.clone(),
            message: "destination has no parent directory".into(),
        })?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io(parent, e))?;

        // Same directory as the destination so the final rename is atomic.
        // The temp path deletes itself on every early return.
        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| io(parent, e))?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = Sha1::new();
        let mut done = 0_u64;
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchFailure::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(network)?;

            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| io(&*temp_path, e))?;
            done += chunk.len() as u64;
            self.report_progress(&task.label, done, total);
        }
        file.flush().await.map_err(|e| io(&*temp_path, e))?;
        // Close the handle before renaming; Windows refuses to move open files.
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = &task.sha1 {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(FetchFailure::IntegrityMismatch {
                    path: task.dest.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        temp_path
            .persist(&task.dest)
            .map_err(|e| io(task.dest.as_path(), e.error))?;
        Ok(done)
    }

    fn report_progress(&self, item: &str, bytes_done: u64, bytes_total: Option<u64>) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ProgressEvent {
                item: item.to_string(),
                bytes_done,
                bytes_total,
            });
        }
    }

    // ── Batch ───────────────────────────────────────────

    /// Fetch every task with at most `concurrency` transfers in flight.
    ///
    /// The returned outcomes mirror the input order regardless of completion
    /// order. Failures stay per task. Tasks sharing a destination are fetched
    /// once and all receive that outcome.
    pub async fn download_all(&self, tasks: &[DownloadTask]) -> Vec<FetchOutcome> {
        let mut owner_of_dest: HashMap<&Path, usize> = HashMap::new();
        let owners: Vec<usize> = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| *owner_of_dest.entry(task.dest.as_path()).or_insert(index))
            .collect();
        let unique: Vec<usize> = (0..tasks.len()).filter(|&i| owners[i] == i).collect();

        info!(
            "Starting batch download: {} files ({} unique), concurrency={}",
            tasks.len(),
            unique.len(),
            self.concurrency
        );

        let gate = Semaphore::new(self.concurrency);
        let fetches = unique.iter().map(|&index| {
            let gate = &gate;
            async move {
                // The permit is released when it drops, whatever the outcome.
                let Ok(_permit) = gate.acquire().await else {
                    return FetchOutcome::Failure(FetchFailure::Cancelled);
                };
                self.fetch(&tasks[index]).await
            }
        });
        let results = join_all(fetches).await;

        let by_owner: HashMap<usize, FetchOutcome> = unique.into_iter().zip(results).collect();
        owners
            .iter()
            .map(|owner| {
                by_owner
                    .get(owner)
                    .cloned()
                    .unwrap_or(FetchOutcome::Failure(FetchFailure::Cancelled))
            })
            .collect()
    }

    /// Validate an existing file's SHA-1, reading it in bounded chunks.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0_u8; HASH_CHUNK];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .map_err(|e| LauncherError::io(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let actual = hex::encode(hasher.finalize());
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

/// SHA-1 of an in-memory document, hex encoded.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_sha1_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let data = vec![7_u8; HASH_CHUNK * 2 + 13];
        tokio::fs::write(&path, &data).await.unwrap();

        let expected = sha1_hex(&data);
        assert!(Downloader::validate_sha1(&path, &expected).await.unwrap());
        assert!(Downloader::validate_sha1(&path, &expected.to_uppercase())
            .await
            .unwrap());
        assert!(!Downloader::validate_sha1(&path, &sha1_hex(b"other"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn existing_file_is_skipped_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lib.jar");
        tokio::fs::write(&dest, b"payload").await.unwrap();

        // Unroutable URL: any network attempt would fail the test.
        let task = DownloadTask::new("http://127.0.0.1:9/lib.jar", &dest)
            .with_sha1(Some(sha1_hex(b"payload")))
            .with_size(Some(7));
        let downloader = Downloader::new(Client::new());
        assert_eq!(downloader.fetch(&task).await, FetchOutcome::Skipped);
    }

    #[tokio::test]
    async fn size_mismatch_forces_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("lib.jar");
        tokio::fs::write(&dest, b"payload").await.unwrap();

        let task = DownloadTask::new("http://127.0.0.1:9/lib.jar", &dest).with_size(Some(8));
        let downloader = Downloader::new(Client::new());
        let outcome = downloader.fetch(&task).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failure(FetchFailure::Network { .. })
        ));
        // The stale file is left alone on failure.
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn cancelled_downloader_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let downloader = Downloader::new(Client::new()).with_cancellation(token);

        let task = DownloadTask::new("http://127.0.0.1:9/x", dir.path().join("x"));
        assert_eq!(
            downloader.fetch(&task).await,
            FetchOutcome::Failure(FetchFailure::Cancelled)
        );
    }

    #[test]
    fn concurrency_has_floor_of_one() {
        let downloader = Downloader::new(Client::new()).with_concurrency(0);
        assert_eq!(downloader.concurrency(), 1);
    }
}
