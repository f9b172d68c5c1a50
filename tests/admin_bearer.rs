use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::Client;

#[tokio::test]
async fn admin_bearer() {
    // find free port
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let data_dir = tempfile::tempdir().expect("tempdir");

    let mut child = Command::new(env!("CARGO_BIN_EXE_fxline-node"))
        .arg("serve")
        .env("FXLINE_PORT", port.to_string())
        .env("FXLINE_DATA_DIR", data_dir.path())
        .env("FXLINE_ADMIN_TOKEN", "testtoken")
        .env("FXLINE_SCHEDULER", "off")
        .env_remove("FXLINE_CONFIG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn server");

    // wait for server
    let client = Client::new();
    let base = format!("http://127.0.0.1:{}", port);
    let mut ok = false;
    for _ in 0..50 {
        if let Ok(r) = client.get(format!("{}/health", base)).send().await {
            if r.status().is_success() {
                ok = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !ok {
        let _ = child.kill();
        panic!("server did not start");
    }

    // Bearer header with correct token
    let r = client
        .get(format!("{}/admin/withdrawals/pending", base))
        .header("Authorization", "Bearer testtoken")
        .send()
        .await
        .unwrap();
    assert!(r.status().is_success());

    // Bearer header with wrong token
    let r = client
        .get(format!("{}/admin/withdrawals/pending", base))
        .header("Authorization", "Bearer wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(r.status(), reqwest::StatusCode::UNAUTHORIZED);

    // shutdown
    let _ = child.kill();
    let _ = child.wait();
}
