//! A target already at the latest advertised version leaves the
//! on-disk version store untouched.

#[path = "common.rs"]
mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use unattended::{Config, Target, UpdateManifest};

#[tokio::test]
async fn no_update_leaves_versions_root_untouched() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("1.0.0.0")).unwrap();
    fs::write(root.path().join("1.0.0.0").join("app"), b"binary").unwrap();

    let response = Arc::new(Mutex::new(
        r#"<response protocol="3"><app appid="testapp" status="ok"><updatecheck status="noupdate"/></app></response>"#
            .to_string(),
    ));
    let base = common::spawn_update_server(response, Arc::new(Vec::new())).await;

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
    assert!(!installed);
    assert_eq!(
        fs::read(root.path().join("1.0.0.0").join("app")).unwrap(),
        b"binary"
    );
}
