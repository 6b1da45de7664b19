//! An advertised candidate that verifies is cloned from the current
//! version, overlaid with the new archive's contents, and becomes the
//! new "latest" — while the previous version directory is left intact.

#[path = "common.rs"]
mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use unattended::{Config, Target, UpdateManifest};

#[tokio::test]
async fn happy_path_clones_and_overlays_new_version() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("1.0.0.0")).unwrap();
    fs::write(root.path().join("1.0.0.0").join("data.txt"), b"old").unwrap();

    let (archive, hash) = common::package_archive(&[("data.txt", b"new"), ("app", b"binary")]);
    let response_xml = format!(
        r#"<response protocol="3"><app appid="testapp" status="ok"><updatecheck status="ok"><manifest version="1.0.0.1" trace="t"><url codebase="PLACEHOLDER/pkg.tgz"/><package hash="{hash}" name="pkg.tgz" size="{}"/></manifest></updatecheck></app></response>"#,
        archive.len()
    );
    let response = Arc::new(Mutex::new(response_xml));
    let base = common::spawn_update_server(response.clone(), Arc::new(archive)).await;
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

    let installed = unattended::apply_updates_once(&config).await.unwrap();
    assert!(installed);

    assert_eq!(
        fs::read(root.path().join("1.0.0.0").join("data.txt")).unwrap(),
        b"old"
    );
    assert_eq!(
        fs::read(root.path().join("1.0.0.1").join("data.txt")).unwrap(),
        b"new"
    );
    assert!(root.path().join("1.0.0.1").join("app").exists());
}
