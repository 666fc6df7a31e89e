use std::sync::{Arc, Mutex};

use bai_client::{
    ApiConfig, AsyncSession, DownloadOptions, Error, Method, MockReply, MockTransport, Session,
    SyncSession, TransferPhase, TransferProgress,
};
use bytes::Bytes;

const BOUNDARY: &str = "bai-boundary";

fn part(filename: &str, extra_headers: &[&str], body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
    )
    .into_bytes();
    for header in extra_headers {
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
}

fn multipart(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut out = parts.concat();
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

fn reply(body: Vec<u8>, total: Option<u64>) -> MockReply {
    // Split the body so parts straddle chunk boundaries.
    let chunks = body.chunks(7).map(Bytes::copy_from_slice).collect();
    let reply = MockReply::ok()
        .header("Content-Type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .chunks(chunks);
    match total {
        Some(total) => reply.header("X-TOTAL-PAYLOADS-LENGTH", total.to_string()),
        None => reply,
    }
}

fn session_with(body: Vec<u8>, total: Option<u64>) -> (Arc<MockTransport>, SyncSession) {
    let transport = Arc::new(MockTransport::new(move |_| Ok(reply(body.clone(), total))));
    let config = ApiConfig::new("http://127.0.0.1:8081").unwrap().credentials("AKIA", "secret");
    let session = SyncSession::with_transport(config, transport.clone()).unwrap();
    (transport, session)
}

fn recorder() -> (Arc<Mutex<Vec<TransferProgress>>>, bai_client::ProgressCallback) {
    let events: Arc<Mutex<Vec<TransferProgress>>> = Arc::default();
    let sink = events.clone();
    (events, Arc::new(move |p: &TransferProgress| sink.lock().unwrap().push(p.clone())))
}

#[test]
fn test_download_writes_parts_in_order() {
    let files: [(&str, &[u8]); 3] = [
        ("a.txt", &b"alpha"[..]),
        ("nested/b.txt", &b"bravo bravo"[..]),
        ("c.bin", &[0u8, 1, 2, 3, 255][..]),
    ];
    let total: u64 = files.iter().map(|(_, body)| body.len() as u64).sum();
    let body = multipart(&files.map(|(name, body)| part(name, &[], body)));
    let (transport, session) = session_with(body, Some(total));

    let dir = tempfile::tempdir().unwrap();
    let (events, callback) = recorder();
    let options = DownloadOptions::to_directory(dir.path()).on_progress(callback);
    let written = session
        .vfolder("mydata")
        .download(files.iter().map(|(name, _)| name.to_string()).collect(), options)
        .unwrap();

    let expected: Vec<_> = files.iter().map(|(name, _)| dir.path().join(name)).collect();
    assert_eq!(written, expected);
    for (name, body) in files {
        assert_eq!(std::fs::read(dir.path().join(name)).unwrap(), body);
    }

    let events = events.lock().unwrap();
    assert_eq!(events.iter().map(|p| p.delta).sum::<u64>(), total);
    assert!(events.iter().all(|p| p.total_bytes == Some(total)));
    let last = events.last().unwrap();
    assert_eq!(last.phase, TransferPhase::Completed);
    assert_eq!(last.bytes_transferred, total);
    assert_eq!(last.percentage(), Some(100.0));

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path(), "/v4/folders/mydata/download");
    let sent: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent["files"][1], "nested/b.txt");
}

#[test]
fn test_progress_reaches_declared_total() {
    let body = multipart(&[part("a.txt", &[], b"alpha")]);
    let (_, session) = session_with(body, Some(64));
    let dir = tempfile::tempdir().unwrap();
    let (events, callback) = recorder();

    session
        .vfolder("mydata")
        .download(
            vec!["a.txt".into()],
            DownloadOptions::to_directory(dir.path()).on_progress(callback),
        )
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.iter().map(|p| p.delta).sum::<u64>(), 64);
    let last = events.last().unwrap();
    assert!(last.is_completed());
    assert_eq!(last.bytes_transferred, 64);
    assert_eq!(last.percentage(), Some(100.0));
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
}

#[test]
fn test_file_target_takes_a_single_part() {
    let (_, session) = session_with(multipart(&[part("report.csv", &[], b"x,y\n1,2\n")]), None);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out").join("renamed.csv");

    let written = session
        .vfolder("mydata")
        .download(vec!["report.csv".into()], DownloadOptions::to_file(&target))
        .unwrap();
    assert_eq!(written, vec![target.clone()]);
    assert_eq!(std::fs::read_to_string(target).unwrap(), "x,y\n1,2\n");
}

#[test]
fn test_file_target_rejects_several_parts() {
    let body = multipart(&[part("a", &[], b"1"), part("b", &[], b"2")]);
    let (_, session) = session_with(body, None);
    let dir = tempfile::tempdir().unwrap();

    let err = session
        .vfolder("mydata")
        .download(vec!["a".into(), "b".into()], DownloadOptions::to_file(dir.path().join("one")))
        .unwrap_err();
    assert!(matches!(err, Error::Transport { ref message, .. } if message.contains("single part")));
}

#[test]
fn test_traversal_part_names_are_rejected() {
    for name in ["../escape.txt", "/etc/cron.d/job", "a/../../b"] {
        let (_, session) = session_with(multipart(&[part(name, &[], b"payload")]), None);
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");

        let err = session
            .vfolder("mydata")
            .download(vec![name.into()], DownloadOptions::to_directory(&inner))
            .unwrap_err();
        assert!(
            matches!(err, Error::Transport { ref message, .. } if message.contains("unsafe")),
            "{name}: {err}"
        );
        assert!(!dir.path().join("escape.txt").exists());
    }
}

#[test]
fn test_unsupported_transfer_encoding_is_rejected() {
    let body = multipart(&[part("a.txt", &["Content-Transfer-Encoding: base64"], b"YWxwaGE=")]);
    let (_, session) = session_with(body, None);
    let dir = tempfile::tempdir().unwrap();

    let err = session
        .vfolder("mydata")
        .download(vec!["a.txt".into()], DownloadOptions::to_directory(dir.path()))
        .unwrap_err();
    assert!(matches!(err, Error::Transport { ref message, .. } if message.contains("base64")));
    assert!(!dir.path().join("a.txt").exists());
}

#[test]
fn test_binary_transfer_encoding_is_accepted() {
    let body = multipart(&[part("a.txt", &["Content-Transfer-Encoding: BINARY"], b"alpha")]);
    let (_, session) = session_with(body, None);
    let dir = tempfile::tempdir().unwrap();

    session
        .vfolder("mydata")
        .download(vec!["a.txt".into()], DownloadOptions::to_directory(dir.path()))
        .unwrap();
    assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
}

fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

#[tokio::test]
async fn test_tar_parts_are_expanded() {
    let archive = tarball(&[
        ("model/config.json", &b"{}"[..]),
        ("model/weights.bin", &[7u8; 64][..]),
    ]);
    let body = multipart(&[part("bundle.tar", &["Content-Type: application/x-tar"], &archive)]);
    let transport = Arc::new(MockTransport::new(move |_| Ok(reply(body.clone(), None))));
    let config = ApiConfig::new("http://127.0.0.1:8081").unwrap().credentials("AKIA", "secret");
    let session = AsyncSession::with_transport(config, transport);

    let dir = tempfile::tempdir().unwrap();
    let (events, callback) = recorder();
    let options = DownloadOptions::to_directory(dir.path()).on_progress(callback);
    let written = session.vfolder("mydata").download(vec!["model".into()], options).await.unwrap();

    assert_eq!(written, vec![dir.path().to_path_buf()]);
    assert_eq!(std::fs::read(dir.path().join("model/config.json")).unwrap(), b"{}");
    assert_eq!(std::fs::read(dir.path().join("model/weights.bin")).unwrap(), vec![7u8; 64]);
    assert!(!dir.path().join("bundle.tar").exists());
    assert!(events.lock().unwrap().iter().any(|p| p.phase == TransferPhase::Expanding));
}

#[tokio::test]
async fn test_tar_parts_kept_when_expansion_disabled() {
    let archive = tarball(&[("x.txt", &b"x"[..])]);
    let body = multipart(&[part("bundle.tar", &[], &archive)]);
    let transport = Arc::new(MockTransport::new(move |_| Ok(reply(body.clone(), None))));
    let config = ApiConfig::new("http://127.0.0.1:8081").unwrap().credentials("AKIA", "secret");
    let session = AsyncSession::with_transport(config, transport);

    let dir = tempfile::tempdir().unwrap();
    let options = DownloadOptions::to_directory(dir.path()).expand_archives(false);
    let written = session
        .vfolder("mydata")
        .download(vec!["bundle.tar".into()], options)
        .await
        .unwrap();

    assert_eq!(written, vec![dir.path().join("bundle.tar")]);
    assert_eq!(std::fs::read(dir.path().join("bundle.tar")).unwrap(), archive);
}

#[test]
fn test_error_status_is_api_error() {
    let transport = Arc::new(MockTransport::new(|_| {
        Ok(MockReply::json(
            404,
            &serde_json::json!({
                "type": "https://api.backend.ai/probs/vfolder-not-found",
                "title": "Virtual folder not found."
            }),
        ))
    }));
    let config = ApiConfig::new("http://127.0.0.1:8081").unwrap().credentials("AKIA", "secret");
    let session = SyncSession::with_transport(config, transport).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = session
        .vfolder("missing")
        .download(vec!["a".into()], DownloadOptions::to_directory(dir.path()))
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}
