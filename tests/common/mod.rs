//! Shared fixtures: a local HTTP server standing in for every remote
//! endpoint, and helpers to build launcher configs against it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::StreamExt;
use interface_resolver::core::config::{Endpoints, JavaSettings};
use interface_resolver::LauncherConfig;
use tokio::net::TcpListener;

/// Files served by path, with per-path hit counters and an in-flight probe.
#[derive(Default)]
pub struct Remote {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<String, usize>>,
    delay: Mutex<Option<Duration>>,
    trickle: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Remote {
    pub fn put(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.to_string(), body.into());
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Stream the body of `path` in small chunks with `pause` between them.
    pub fn trickle(&self, path: &str, pause: Duration) {
        self.trickle.lock().unwrap().insert(path.to_string(), pause);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn serve(State(remote): State<Arc<Remote>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    *remote.hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    let now = remote.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    remote.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let delay = *remote.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let failing = remote.failing.lock().unwrap().contains(&path);
    let body = remote.files.lock().unwrap().get(&path).cloned();
    let trickle = remote.trickle.lock().unwrap().get(&path).copied();
    let response = match (failing, body, trickle) {
        (true, _, _) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        (false, Some(body), Some(pause)) => {
            let chunks: Vec<Vec<u8>> = body.chunks(16).map(<[u8]>::to_vec).collect();
            let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(pause).await;
                Ok::<_, std::convert::Infallible>(Bytes::from(chunk))
            });
            Body::from_stream(stream).into_response()
        }
        (false, Some(body), None) => body.into_response(),
        (false, None, _) => StatusCode::NOT_FOUND.into_response(),
    };

    remote.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

pub struct TestServer {
    base_url: String,
    pub remote: Arc<Remote>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let remote = Arc::new(Remote::default());
        let router = Router::new().fallback(serve).with_state(remote.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            base_url: format!("http://{addr}"),
            remote,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Config rooted at `data_dir` with every endpoint on this server and
    /// Java searched only under `data_dir/jvm`.
    pub fn config(&self, data_dir: &Path) -> LauncherConfig {
        let mut config = LauncherConfig::with_data_dir(data_dir);
        config.endpoints = Endpoints {
            version_manifest: self.url("/mc/game/version_manifest_v2.json"),
            resources: self.url("/resources"),
            libraries: self.url("/maven"),
            legacy_client: self.url("/legacy"),
            runtime_api: self.url("/adoptium"),
        };
        config.java = JavaSettings {
            use_system_path: false,
            search_roots: vec![data_dir.join("jvm")],
        };
        config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

pub fn fake_java_script(version: &str) -> String {
    format!(
        "#!/bin/sh\n\
         echo 'openjdk version \"{version}\" 2023-07-18' >&2\n\
         echo 'OpenJDK Runtime Environment Temurin' >&2\n\
         echo '    os.arch = amd64' >&2\n"
    )
}

/// Install a shell script that answers like `java -version` at
/// `<root>/<name>/bin/java`.
#[cfg(unix)]
pub fn install_fake_java(root: &Path, name: &str, version: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = root.join(name).join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let java = bin.join("java");
    std::fs::write(&java, fake_java_script(version)).unwrap();
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
    java
}
