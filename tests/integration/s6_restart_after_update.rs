//! End-to-end: the target is running an old version when an update
//! tick installs a new one; the scheduler restarts the target into the
//! newly installed version without the embedding program's involvement.

#[path = "common.rs"]
mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use unattended::{BufferingSink, Config, OutputSink, Stream, Target, UpdateManifest};

#[cfg(unix)]
#[tokio::test]
async fn restart_after_update_runs_the_new_version() {
    let root = tempdir().unwrap();
    common::write_script(root.path(), "1.0.0.0", "#!/bin/sh\necho v1\nsleep 5\n");

    let (archive, hash) = common::package_archive(&[("app.sh", b"#!/bin/sh\necho v2\n")]);
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
            executable_name: PathBuf::from("app.sh"),
            executable_args: vec![],
            channel: "stable".into(),
        },
        Duration::from_millis(150),
        vec![UpdateManifest {
            app_id: "testapp".into(),
            endpoint: format!("{base}/update"),
        }],
    )
    .unwrap();

    let sink = Arc::new(BufferingSink::new());
    let dyn_sink: Arc<dyn OutputSink> = sink.clone();

    // app.sh v1.0.0.1, once extracted, is what the restarted process
    // should run and immediately exit from, unblocking `run()`.
    tokio::time::timeout(Duration::from_secs(10), unattended::run(config, dyn_sink))
        .await
        .expect("run() did not complete after the new version exited")
        .unwrap();

    assert!(fs::read_to_string(root.path().join("1.0.0.1").join("app.sh"))
        .unwrap()
        .contains("v2"));

    let lines = sink.lines();
    let texts: Vec<&str> = lines.iter().map(|(_, l)| l.as_str()).collect();
    assert!(texts.contains(&"v1"), "expected v1 output, got {texts:?}");
    assert!(texts.contains(&"v2"), "expected v2 output, got {texts:?}");
    assert!(lines.iter().any(|(s, _)| *s == Stream::Stdout));
}
