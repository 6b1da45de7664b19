//! Shared helpers for the end-to-end scenario tests. Each test binary
//! includes this via `#[path = "common.rs"] mod common;` since Cargo
//! integration tests don't share a crate.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// Build a gzip-tar archive from `(path, contents)` pairs, returning the
/// raw bytes and their hex-encoded SHA-256.
pub fn package_archive(files: &[(&str, &[u8])]) -> (Vec<u8>, String) {
    let mut buf = Vec::new();
    {
        let encoder = GzEncoder::new(&mut buf, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }
    let hash = hex::encode(Sha256::digest(&buf));
    (buf, hash)
}

/// Spawn an in-process Omaha endpoint serving `response_xml` at `/update`
/// and `archive` at `/pkg.tgz`. Returns the server's base URL.
pub async fn spawn_update_server(response_xml: Arc<Mutex<String>>, archive: Arc<Vec<u8>>) -> String {
    let app = Router::new()
        .route(
            "/update",
            post({
                let response_xml = response_xml.clone();
                move |_body: axum::body::Bytes| {
                    let response_xml = response_xml.clone();
                    async move { response_xml.lock().unwrap().clone() }
                }
            }),
        )
        .route(
            "/pkg.tgz",
            get({
                let archive = archive.clone();
                move || {
                    let archive = archive.clone();
                    async move { (*archive).clone() }
                }
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Fill in the `PLACEHOLDER` codebase URL once the server's real address
/// is known, without double-locking the mutex in one statement.
pub fn resolve_placeholder(response: &Mutex<String>, base: &str) {
    let resolved = response.lock().unwrap().replace("PLACEHOLDER", base);
    *response.lock().unwrap() = resolved;
}

/// Write an executable shell script target at `dir/version/app.sh`.
#[cfg(unix)]
pub fn write_script(dir: &std::path::Path, version: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let version_dir = dir.join(version);
    std::fs::create_dir_all(&version_dir).unwrap();
    let script = version_dir.join("app.sh");
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}
