//! Black-box coverage of the probe's pre-execution verdicts (spec §4.1,
//! §8): a real non-interactive shell, spoken to over a real Unix socket.

use std::time::Duration;

use conduit::probe::ProbeClient;
use conduit::protocol::ProbeVerdict;

async fn wait_for_socket(path: &std::path::Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("socket {} never appeared", path.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_reports_exit_codes_and_captured_output() {
    let home = tempfile::tempdir().expect("tempdir");
    std::env::set_var("HOME", home.path());
    std::env::set_var("SHELL", "/bin/sh");

    tokio::spawn(conduit::probe::probe_main(false));
    wait_for_socket(&conduit::socket_path(conduit::PROBE_SOCK)).await;

    let mut client = ProbeClient::connect().await.expect("connect to probe");

    match client.probe("echo hello-from-probe").await.unwrap() {
        ProbeVerdict::Ok {
            exit_code, stdout, ..
        } => {
            assert_eq!(exit_code, 0);
            assert!(stdout.contains("hello-from-probe"));
        }
        other => panic!("expected an Ok verdict, got {other:?}"),
    }

    match client.probe("false").await.unwrap() {
        ProbeVerdict::Ok { exit_code, .. } => assert_ne!(exit_code, 0),
        other => panic!("expected an Ok verdict, got {other:?}"),
    }

    // Sequential requests on one connection reuse the same inner shell,
    // so a `cd` issued out of band must be visible to a later probed line
    // (spec §4.1: "the probe's working directory must mirror the front
    // end's").
    client.probe(&format!("cd {}", home.path().display())).await.unwrap();
    match client.probe("pwd").await.unwrap() {
        ProbeVerdict::Ok { stdout, .. } => {
            assert!(stdout.trim().ends_with(
                home.path()
                    .file_name()
                    .unwrap()
                    .to_str()
                    .unwrap()
            ));
        }
        other => panic!("expected an Ok verdict, got {other:?}"),
    }
}
