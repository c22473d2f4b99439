#![cfg(unix)]

mod common;

use std::path::Path;

use common::{install_fake_java, TestServer};
use interface_resolver::core::downloader::{progress_channel, sha1_hex, Downloader, FetchOutcome};
use interface_resolver::core::java::RuntimeSource;
use interface_resolver::core::platform::{CpuArch, Environment, OsFamily};
use interface_resolver::core::version::applicable_libraries;
use interface_resolver::{LaunchRequest, LauncherError, Resolver};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const LINUX: Environment = Environment {
    os: OsFamily::Linux,
    arch: CpuArch::X86_64,
};

const UNIVERSAL: &[u8] = b"universal library bytes";
const WINDOWS_NATIVE: &[u8] = b"windows native bytes";
const CLIENT: &[u8] = b"client jar bytes";
const ICON: &[u8] = b"icon bytes";

fn linux_native_jar() -> Vec<u8> {
    use std::io::Write;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in [("liblwjgl.so", &b"elf"[..]), ("META-INF/MANIFEST.MF", &b"Manifest-Version: 1.0"[..])] {
        zip.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn artifact(server: &TestServer, path: &str, body: &[u8]) -> serde_json::Value {
    server.remote.put(&format!("/maven/{path}"), body.to_vec());
    json!({
        "path": path,
        "url": server.url(&format!("/maven/{path}")),
        "sha1": sha1_hex(body),
        "size": body.len()
    })
}

/// Publish index, descriptor, asset index, objects and libraries for 1.20.1.
fn publish_1_20_1(server: &TestServer) -> Vec<u8> {
    let icon_hash = sha1_hex(ICON);
    server
        .remote
        .put(&format!("/resources/{}/{}", &icon_hash[..2], icon_hash), ICON.to_vec());
    let asset_index = serde_json::to_vec(&json!({
        "objects": { "icons/icon_16x16.png": { "hash": icon_hash, "size": ICON.len() } }
    }))
    .unwrap();
    server.remote.put("/indexes/5.json", asset_index.clone());

    server.remote.put("/client/1.20.1.jar", CLIENT.to_vec());

    let descriptor = serde_json::to_vec(&json!({
        "id": "1.20.1",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assets": "5",
        "assetIndex": {
            "id": "5",
            "url": server.url("/indexes/5.json"),
            "sha1": sha1_hex(&asset_index),
            "size": asset_index.len(),
            "totalSize": ICON.len()
        },
        "downloads": {
            "client": { "url": server.url("/client/1.20.1.jar"), "sha1": sha1_hex(CLIENT), "size": CLIENT.len() }
        },
        "javaVersion": { "component": "java-runtime-gamma", "majorVersion": 17 },
        "libraries": [
            {
                "name": "org.lwjgl:lwjgl:3.3.1:natives-windows",
                "downloads": { "artifact": artifact(server, "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-windows.jar", WINDOWS_NATIVE) },
                "rules": [{ "action": "allow", "os": { "name": "windows" } }]
            },
            {
                "name": "org.lwjgl:lwjgl:3.3.1:natives-linux",
                "downloads": { "artifact": artifact(server, "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar", &linux_native_jar()) },
                "rules": [{ "action": "allow", "os": { "name": "linux" } }]
            },
            {
                "name": "com.mojang:brigadier:1.1.8",
                "downloads": { "artifact": artifact(server, "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar", UNIVERSAL) }
            }
        ]
    }))
    .unwrap();
    server.remote.put("/v1/packages/1.20.1.json", descriptor.clone());
    publish_index(server, &descriptor);
    descriptor
}

fn publish_index(server: &TestServer, descriptor: &[u8]) {
    let manifest = json!({
        "latest": { "release": "1.20.1", "snapshot": "1.20.1" },
        "versions": [{
            "id": "1.20.1",
            "type": "release",
            "url": server.url("/v1/packages/1.20.1.json"),
            "sha1": sha1_hex(descriptor),
            "releaseTime": "2023-06-12T13:25:51+00:00"
        }]
    });
    server.remote.put(
        "/mc/game/version_manifest_v2.json",
        serde_json::to_vec(&manifest).unwrap(),
    );
}

fn resolver_for(server: &TestServer, data_dir: &Path) -> Resolver {
    install_fake_java(&data_dir.join("jvm"), "jdk-17", "17.0.8");
    Resolver::new(server.config(data_dir), Downloader::new(reqwest::Client::new()))
}

fn files_under(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

#[tokio::test]
async fn linux_resolution_downloads_exactly_the_applicable_libraries() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());

    let resolved = resolver
        .resolve_and_acquire(&LaunchRequest::new("1.20.1").with_environment(LINUX))
        .await
        .unwrap();

    let names: Vec<_> = resolved.libraries.iter().map(|l| l.spec.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["org.lwjgl:lwjgl:3.3.1:natives-linux", "com.mojang:brigadier:1.1.8"]
    );
    assert_eq!(resolved.report.library_outcomes.len(), 2);
    assert!(resolved.report.library_outcomes.iter().all(FetchOutcome::is_success));

    let libraries = dir.path().join("libraries");
    let expected = {
        let mut v = vec![
            libraries.join("org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"),
            libraries.join("com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"),
        ];
        v.sort();
        v
    };
    assert_eq!(files_under(&libraries), expected);
    assert_eq!(std::fs::read(&expected[0]).unwrap(), UNIVERSAL);

    let client = resolved.client_jar.as_ref().unwrap();
    assert_eq!(std::fs::read(client).unwrap(), CLIENT);
    assert_eq!(resolved.natives_dir, dir.path().join("versions/1.20.1/natives"));
    assert!(resolved.natives_dir.join("liblwjgl.so").is_file());
    assert!(!resolved.natives_dir.join("META-INF").exists());
    assert_eq!(resolved.asset_index_id.as_deref(), Some("5"));
    assert_eq!(resolved.report.assets.downloaded, 1);
    assert_eq!(resolved.runtime.major, 17);
    assert_eq!(resolved.runtime.source, RuntimeSource::System);
    assert!(resolved.demo);
    assert_eq!(server.remote.hits("/maven/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-windows.jar"), 0);
}

#[tokio::test]
async fn warm_cache_makes_no_artifact_requests() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());
    let request = LaunchRequest::new("1.20.1").with_environment(LINUX);

    let first = resolver.resolve_and_acquire(&request).await.unwrap();
    assert_eq!(first.report.failure_count(), 0);
    let descriptor_hits = server.remote.hits("/v1/packages/1.20.1.json");

    let second = resolver.resolve_and_acquire(&request).await.unwrap();
    assert_eq!(second.report.fetched(), 0);
    assert!(second.report.library_outcomes.iter().all(FetchOutcome::is_skipped));
    assert_eq!(server.remote.hits("/v1/packages/1.20.1.json"), descriptor_hits);
    assert_eq!(server.remote.hits("/client/1.20.1.jar"), 1);
    assert_eq!(server.remote.hits("/indexes/5.json"), 1);
    assert_eq!(server.remote.hits("/maven/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"), 1);
}

#[tokio::test]
async fn corrupted_artifact_is_the_only_one_refetched() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());
    let request = LaunchRequest::new("1.20.1").with_environment(LINUX);
    resolver.resolve_and_acquire(&request).await.unwrap();

    let universal = dir
        .path()
        .join("libraries/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar");
    let mut bytes = std::fs::read(&universal).unwrap();
    bytes[0] ^= 0xff;
    std::fs::write(&universal, &bytes).unwrap();

    let resolved = resolver.resolve_and_acquire(&request).await.unwrap();
    assert!(resolved.report.library_outcomes[0].is_skipped());
    assert!(resolved.report.library_outcomes[1].is_success());
    assert_eq!(resolved.report.fetched(), 1);
    assert_eq!(std::fs::read(&universal).unwrap(), UNIVERSAL);
    assert_eq!(server.remote.hits("/maven/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"), 2);
    assert_eq!(
        server.remote.hits("/maven/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"),
        1
    );
}

#[tokio::test]
async fn library_failures_do_not_abort_resolution() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    server
        .remote
        .fail("/maven/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar");
    server.remote.fail("/client/1.20.1.jar");
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());

    let resolved = resolver
        .resolve_and_acquire(&LaunchRequest::new("1.20.1").with_environment(LINUX))
        .await
        .unwrap();
    assert!(resolved.report.library_outcomes[0].is_failure());
    assert!(resolved.report.library_outcomes[1].is_success());
    assert_eq!(resolved.library_files.len(), 1);
    assert!(resolved.client_jar.is_none());
    assert_eq!(resolved.report.failure_count(), 2);
}

#[tokio::test]
async fn unknown_version_is_reported_as_not_found() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());

    let err = resolver
        .resolve_and_acquire(&LaunchRequest::new("0.0.1").with_environment(LINUX))
        .await
        .unwrap_err();
    assert!(matches!(err, LauncherError::VersionNotFound(_)));
}

#[tokio::test]
async fn missing_runtime_blocks_the_launch() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    // Only Java 8 installed and nothing to provision from.
    install_fake_java(&dir.path().join("jvm"), "jdk8", "1.8.0_392");
    let resolver = Resolver::new(server.config(dir.path()), Downloader::new(reqwest::Client::new()));
    let provisioner = interface_resolver::core::java::RuntimeProvisioner::new(
        resolver.config(),
        resolver.downloader().clone(),
    )
    .with_min_free_disk(0);
    let resolver = resolver.with_provisioner(provisioner);

    let err = resolver
        .resolve_and_acquire(&LaunchRequest::new("1.20.1").with_environment(LINUX))
        .await
        .unwrap_err();
    assert!(matches!(err, LauncherError::RuntimeUnavailable { major: 17, .. }));
    // Artifacts acquired before the runtime step stay on disk.
    assert!(dir
        .path()
        .join("libraries/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar")
        .is_file());
}

#[tokio::test]
async fn descriptor_cache_follows_the_declared_hash() {
    let server = TestServer::start().await;
    let descriptor = publish_1_20_1(&server);
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());

    resolver.store().resolve_descriptor("1.20.1").await.unwrap();
    resolver.store().resolve_descriptor("1.20.1").await.unwrap();
    assert_eq!(server.remote.hits("/v1/packages/1.20.1.json"), 1);

    // A new descriptor published under a new hash invalidates the cache.
    let mut updated: serde_json::Value = serde_json::from_slice(&descriptor).unwrap();
    updated["mainClass"] = json!("net.minecraft.client.main.Updated");
    let updated = serde_json::to_vec(&updated).unwrap();
    server.remote.put("/v1/packages/1.20.1.json", updated.clone());
    publish_index(&server, &updated);

    let d = resolver.store().resolve_descriptor("1.20.1").await.unwrap();
    assert_eq!(d.main_class.as_deref(), Some("net.minecraft.client.main.Updated"));
    assert_eq!(server.remote.hits("/v1/packages/1.20.1.json"), 2);
    assert_eq!(applicable_libraries(&d, &LINUX).len(), 2);
}

#[tokio::test]
async fn descriptor_with_wrong_hash_is_rejected() {
    let server = TestServer::start().await;
    let descriptor = publish_1_20_1(&server);
    server
        .remote
        .put("/v1/packages/1.20.1.json", [descriptor.as_slice(), b" "].concat());
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_for(&server, dir.path());

    let err = resolver.store().resolve_descriptor("1.20.1").await.unwrap_err();
    assert!(matches!(err, LauncherError::IntegrityMismatch { .. }));
    assert!(!dir.path().join("versions/1.20.1/1.20.1.json").exists());
}

fn runtime_zip(version: &str) -> Vec<u8> {
    use std::io::Write;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("jdk-17.0.8+7-jre/bin/java", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(common::fake_java_script(version).as_bytes())
        .unwrap();
    zip.start_file("jdk-17.0.8+7-jre/release", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"JAVA_VERSION=\"17.0.8\"\n").unwrap();
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn missing_runtime_is_provisioned_then_cached() {
    let server = TestServer::start().await;
    server.remote.put(
        "/adoptium/binary/latest/17/ga/linux/x64/jre/hotspot/normal/eclipse",
        runtime_zip("17.0.8"),
    );
    let dir = tempfile::tempdir().unwrap();
    let config = server.config(dir.path());
    let provisioner = interface_resolver::core::java::RuntimeProvisioner::new(
        &config,
        Downloader::new(reqwest::Client::new()),
    )
    .with_min_free_disk(0);

    let first = provisioner.ensure_runtime(17, &LINUX).await.unwrap();
    assert_eq!(first.source, RuntimeSource::Provisioned);
    assert_eq!(first.major, 17);
    assert!(first.executable.starts_with(provisioner.runtime_dir(17)));
    assert!(provisioner.runtime_dir(17).join("runtime.json").is_file());

    let second = provisioner.ensure_runtime(17, &LINUX).await.unwrap();
    assert_eq!(second.source, RuntimeSource::Cached);
    assert_eq!(second.executable, first.executable);
    assert_eq!(
        server
            .remote
            .hits("/adoptium/binary/latest/17/ga/linux/x64/jre/hotspot/normal/eclipse"),
        1
    );
}

#[tokio::test]
async fn legacy_descriptor_uses_derived_locations() {
    let server = TestServer::start().await;
    let descriptor = serde_json::to_vec(&json!({
        "id": "1.2.5",
        "type": "release",
        "mainClass": "net.minecraft.client.Minecraft",
        "assets": "pre-1.6",
        "libraries": [{ "name": "net.java.jinput:jinput:2.0.5" }]
    }))
    .unwrap();
    server.remote.put("/v1/packages/1.2.5.json", descriptor.clone());
    server.remote.put(
        "/mc/game/version_manifest_v2.json",
        serde_json::to_vec(&json!({
            "versions": [{
                "id": "1.2.5",
                "type": "release",
                "url": server.url("/v1/packages/1.2.5.json"),
                "sha1": sha1_hex(&descriptor)
            }]
        }))
        .unwrap(),
    );
    server.remote.put("/legacy/1.2.5/1.2.5.jar", CLIENT.to_vec());
    server.remote.put(
        "/maven/net/java/jinput/jinput/2.0.5/jinput-2.0.5.jar",
        UNIVERSAL.to_vec(),
    );

    let dir = tempfile::tempdir().unwrap();
    install_fake_java(&dir.path().join("jvm"), "jdk8", "1.8.0_392");
    let resolver = Resolver::new(server.config(dir.path()), Downloader::new(reqwest::Client::new()));

    let resolved = resolver
        .resolve_and_acquire(&LaunchRequest::new("1.2.5").with_environment(LINUX))
        .await
        .unwrap();
    assert_eq!(resolved.report.failure_count(), 0);
    assert_eq!(resolved.asset_index_id.as_deref(), Some("pre-1.6"));
    assert_eq!(resolved.report.assets.total(), 0);
    assert_eq!(
        std::fs::read(resolved.client_jar.as_ref().unwrap()).unwrap(),
        CLIENT
    );
    assert_eq!(
        resolved.library_files,
        vec![dir
            .path()
            .join("libraries/net/java/jinput/jinput/2.0.5/jinput-2.0.5.jar")]
    );
    assert_eq!(resolved.runtime.major, 8);
}

#[tokio::test]
async fn cancellation_during_library_downloads_aborts_resolution() {
    let server = TestServer::start().await;
    publish_1_20_1(&server);
    let brigadier = "/maven/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar";
    server.remote.put(brigadier, vec![7_u8; 4096]);
    server.remote.trickle(brigadier, std::time::Duration::from_millis(20));
    let dir = tempfile::tempdir().unwrap();

    let token = CancellationToken::new();
    let (tx, mut rx) = progress_channel();
    let downloader = Downloader::new(reqwest::Client::new())
        .with_progress(tx)
        .with_cancellation(token.clone());
    let resolver = Resolver::new(server.config(dir.path()), downloader);

    let canceller = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if event.item == "com.mojang:brigadier:1.1.8" {
                token.cancel();
                break;
            }
        }
    });
    let err = resolver
        .resolve_and_acquire(&LaunchRequest::new("1.20.1").with_environment(LINUX))
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, LauncherError::Cancelled));
    let brigadier_dir = dir.path().join("libraries/com/mojang/brigadier/1.1.8");
    let leftovers: Vec<_> = std::fs::read_dir(&brigadier_dir).unwrap().collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    assert_eq!(server.remote.hits("/indexes/5.json"), 0);
}
