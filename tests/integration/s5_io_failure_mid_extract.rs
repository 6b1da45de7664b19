//! An archive whose declared entry size exceeds the bytes actually
//! delivered triggers a short-write failure mid-extract. The attempt
//! fails and the partially staged version directory is removed rather
//! than left behind.

#[path = "common.rs"]
mod common;

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tempfile::tempdir;
use unattended::{Config, Target, UpdateManifest};

#[tokio::test]
async fn io_failure_mid_extract_removes_staged_directory() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("1.0.0.0")).unwrap();

    // A single entry declaring a size larger than the bytes actually
    // present forces a short write during extraction.
    let mut buf = Vec::new();
    {
        let mut encoder = GzEncoder::new(&mut buf, Compression::default());
        let mut header = tar::Header::new_gnu();
        header.set_path("app").unwrap();
        header.set_size(999);
        header.set_mode(0o755);
        header.set_cksum();
        encoder.write_all(header.as_bytes()).unwrap();
        encoder.write_all(&[0u8; 16]).unwrap();
        encoder.finish().unwrap();
    }
    let hash = hex::encode(Sha256::digest(&buf));

    let response_xml = format!(
        r#"<response protocol="3"><app appid="testapp" status="ok"><updatecheck status="ok"><manifest version="1.0.0.1" trace="t"><url codebase="PLACEHOLDER/pkg.tgz"/><package hash="{hash}" name="pkg.tgz" size="{}"/></manifest></updatecheck></app></response>"#,
        buf.len()
    );
    let response = Arc::new(Mutex::new(response_xml));
    let base = common::spawn_update_server(response.clone(), Arc::new(buf)).await;
    common::resolve_placeholder(&response, &base);

    let config = Config::new(
        "TEST001",
        Target {
            app_id: "testapp".into(),
            versions_root: root.path().to_path_buf(),
            executable_name: PathBuf::from("app"),
            executable_args: vec![],
            channel: "stable".into(),
        },
        Duration::from_secs(60),
        vec![UpdateManifest {
            app_id: "testapp".into(),
            endpoint: format!("{base}/update"),
        }],
    )
    .unwrap();

    let result = unattended::apply_updates_once(&config).await;
    assert!(result.is_err());
    assert!(!root.path().join("1.0.0.1").exists());
}
