use std::sync::{Arc, Mutex};
use std::thread;

use bai_client::{
    ApiConfig, AsyncSession, Error, Method, MockReply, MockTransport, Session, SyncSession, bind,
};
use serde_json::json;

fn config() -> ApiConfig {
    ApiConfig::new("http://127.0.0.1:8081").unwrap().credentials("AKIA", "secret")
}

fn hello_server() -> Arc<MockTransport> {
    Arc::new(MockTransport::new(|req| match req.path() {
        "/" | "/v4" => Ok(MockReply::json(
            200,
            &json!({"version": "v4.20190615", "manager": "19.09.0"}),
        )),
        "/v4/server/login" => Ok(MockReply::json(200, &json!({"authenticated": true, "data": {}}))
            .header("Set-Cookie", "AIOHTTP_SESSION=abc; Path=/")),
        "/v4/folders/mydata/files" => Ok(MockReply::json(
            200,
            &json!({"files": "[]", "folder_path": "/"}),
        )),
        "/v4/folders/mydata/upload" => Ok(MockReply::no_content()),
        _ => Ok(MockReply::text(404, "not found")),
    }))
}

#[test]
fn test_sync_calls_return_plain_values() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();

    assert_eq!(session.system().manager_version().unwrap(), "19.09.0");
    assert_eq!(session.system().hello().unwrap()["version"], "v4.20190615");

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path(), "/v4");
    assert!(
        request
            .header("authorization")
            .unwrap()
            .starts_with("BackendAI signMethod=HMAC-SHA256, credential=AKIA:")
    );
    assert_eq!(request.header("x-backendai-version"), Some("v4.20190315"));
    assert!(request.header("date").is_some());
}

#[test]
fn test_login_is_unsigned() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();

    let result = session.auth().login("user@example.com", "pw").unwrap();
    assert!(result.authenticated);
    assert_eq!(result.username, "user@example.com");
    assert_eq!(result.cookies, ["AIOHTTP_SESSION=abc; Path=/"]);

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Post);
    assert!(request.header("authorization").is_none());
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, json!({"username": "user@example.com", "password": "pw"}));
}

#[test]
fn test_vfolder_list_and_upload() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();
    let folder = session.vfolder("mydata");

    let listing = folder.list_files(".").unwrap();
    assert_eq!(listing["folder_path"], "/");

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/main.py"), "print(1)\n").unwrap();
    std::fs::write(dir.path().join("README"), "hi").unwrap();
    folder
        .upload(
            vec![dir.path().join("src/main.py"), dir.path().join("README")],
            Some(dir.path().to_path_buf()),
        )
        .unwrap();

    let requests = transport.requests();
    let list = &requests[0];
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&list.body).unwrap(),
        json!({"path": "."})
    );

    let upload = &requests[1];
    assert_eq!(upload.method, Method::Post);
    assert_eq!(upload.header("content-type"), Some("multipart/form-data"));
    let names: Vec<&str> = upload.files.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["src/main.py", "README"]);
    assert_eq!(upload.files[0].1, "print(1)\n".as_bytes());
}

#[test]
fn test_upload_outside_basedir_fails_before_sending() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();
    let base = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    std::fs::write(other.path().join("x"), "x").unwrap();

    let err = session
        .vfolder("mydata")
        .upload(vec![other.path().join("x")], Some(base.path().to_path_buf()))
        .unwrap_err();
    assert!(matches!(err, Error::Client(_)));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn test_negotiation_picks_lower_version() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();
    assert_eq!(session.system().negotiate_api_version().unwrap(), "v4.20190315");

    let hello = &transport.requests()[0];
    assert_eq!(hello.url.as_str(), "http://127.0.0.1:8081/");
    assert!(hello.header("authorization").is_none());

    let older =
        SyncSession::with_transport(config().version("v4.20200101"), hello_server()).unwrap();
    assert_eq!(older.system().negotiate_api_version().unwrap(), "v4.20190615");
}

#[test]
fn test_negotiation_falls_back_when_unreachable() {
    let transport = Arc::new(MockTransport::new(|_| Err(Error::protocol("connection refused"))));
    let session = SyncSession::with_transport(config(), transport).unwrap();
    assert_eq!(session.system().negotiate_api_version().unwrap(), "v4.20190315");

    let failing = Arc::new(MockTransport::new(|_| Ok(MockReply::text(502, "bad gateway"))));
    let session = SyncSession::with_transport(config(), failing).unwrap();
    assert_eq!(session.system().negotiate_api_version().unwrap(), "v4.20190315");
}

#[test]
fn test_sequential_calls_keep_submission_order() {
    let session = SyncSession::with_transport(config(), Arc::new(MockTransport::ok())).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let seen = seen.clone();
        let value = session
            .execute(async move {
                tokio::task::yield_now().await;
                seen.lock().unwrap().push(i);
                Ok(i * 2)
            })
            .unwrap();
        assert_eq!(value, i * 2);
    }
    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_calls_from_many_threads_are_all_served() {
    let session = Arc::new(SyncSession::with_transport(config(), hello_server()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                (0..5).map(|_| session.system().manager_version().unwrap()).collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().iter().all(|v| v == "19.09.0"));
    }
}

#[test]
fn test_closed_sync_session_rejects_calls() {
    let transport = hello_server();
    let session = SyncSession::with_transport(config(), transport.clone()).unwrap();
    session.close();
    session.close();

    assert!(session.is_closed());
    assert_eq!(transport.close_count(), 1);
    assert!(matches!(session.system().hello(), Err(Error::Client(_))));
    assert!(matches!(session.execute(async { Ok(1) }), Err(Error::Client(_))));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn test_dropping_sync_session_closes_transport() {
    let transport = hello_server();
    drop(SyncSession::with_transport(config(), transport.clone()).unwrap());
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_async_session_flow() {
    let transport = hello_server();
    let session = AsyncSession::with_transport(config(), transport.clone());

    let version = session.system().api_version().await.unwrap();
    assert_eq!(version, "v4.20190615");

    let custom = bind(&session, |ctx| async move {
        let response = ctx.request(Method::Get, "folders/mydata/files").fetch().await?;
        Ok(response.status())
    });
    assert_eq!(custom.await.unwrap(), 200);
    assert_eq!(transport.requests()[1].path(), "/v4/folders/mydata/files");

    session.close().await;
    session.close().await;
    assert_eq!(transport.close_count(), 1);
    assert!(matches!(session.system().hello().await, Err(Error::Client(_))));
}

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let first = AsyncSession::with_transport(config(), hello_server());
    let second = AsyncSession::with_transport(config(), hello_server());

    first.close().await;
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(second.system().manager_version().await.unwrap(), "19.09.0");
}
