use httpmock::prelude::*;
use kalki_launcher::download::{fetch, DownloadRequest};
use sha2::{Digest, Sha256};
use std::fs;
use tempfile::tempdir;

fn request_for(server: &MockServer, dest: &std::path::Path) -> DownloadRequest {
    DownloadRequest {
        url: server.url("/latest/KalkiOS.iso"),
        dest_dir: dest.to_path_buf(),
        expected_sha256: None,
        max_retries: 1,
        timeout_secs: 10,
        resume: true,
    }
}

#[test]
fn fetch_writes_the_file_and_reports_progress() {
    let server = MockServer::start();
    let body = "kalki os iso payload";
    server.mock(|when, then| {
        when.method(GET).path("/latest/KalkiOS.iso");
        then.status(200).body(body);
    });

    let dir = tempdir().unwrap();
    let req = request_for(&server, dir.path());

    let mut seen = Vec::new();
    let path = fetch(&req, &mut |p| {
        seen.push(p.received);
        true
    })
    .unwrap();

    assert_eq!(path.file_name().unwrap(), "KalkiOS.iso");
    assert_eq!(fs::read_to_string(&path).unwrap(), body);
    assert_eq!(*seen.last().unwrap(), body.len() as u64);
}

#[test]
fn fetch_resumes_a_partial_file_with_a_range_request() {
    let server = MockServer::start();
    let tail = server.mock(|when, then| {
        when.method(GET)
            .path("/latest/KalkiOS.iso")
            .header("Range", "bytes=6-");
        then.status(206).body("os iso");
    });

    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path()).unwrap();
    fs::write(dir.path().join("KalkiOS.iso"), "kalki ").unwrap();

    let req = request_for(&server, dir.path());
    let path = fetch(&req, &mut |_| true).unwrap();

    tail.assert();
    assert_eq!(fs::read_to_string(&path).unwrap(), "kalki os iso");
}

#[test]
fn fetch_verifies_the_checksum_when_given_one() {
    let server = MockServer::start();
    let body = "verified payload";
    server.mock(|when, then| {
        when.method(GET).path("/latest/KalkiOS.iso");
        then.status(200).body(body);
    });

    let dir = tempdir().unwrap();
    let mut req = request_for(&server, dir.path());
    req.expected_sha256 = Some(format!("{:x}", Sha256::digest(body.as_bytes())));

    let path = fetch(&req, &mut |_| true).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), body);
}

#[test]
fn fetch_rejects_a_checksum_mismatch_and_removes_the_file() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/latest/KalkiOS.iso");
        then.status(200).body("corrupted payload");
    });

    let dir = tempdir().unwrap();
    let mut req = request_for(&server, dir.path());
    req.max_retries = 2;
    req.expected_sha256 = Some("0".repeat(64));

    let err = fetch(&req, &mut |_| true).unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!dir.path().join("KalkiOS.iso").exists());
}

#[test]
fn fetch_stops_when_the_progress_callback_cancels() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/latest/KalkiOS.iso");
        then.status(200).body("payload");
    });

    let dir = tempdir().unwrap();
    let mut req = request_for(&server, dir.path());
    req.max_retries = 3;

    let err = fetch(&req, &mut |_| false).unwrap_err();
    assert!(err.to_string().contains("cancelled"));
    // Cancellation is not an error worth retrying.
    mock.assert_hits(1);
}
