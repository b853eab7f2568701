mod common;

use axum::http::StatusCode;
use axum_test::TestServer;

use sockjs::EndpointConfig;

fn test_server(config: EndpointConfig) -> TestServer {
    TestServer::new(common::echo_endpoint(config).router()).unwrap()
}

/// Read one body chunk as text.
async fn next_chunk(resp: &mut reqwest::Response) -> String {
    let chunk = resp.chunk().await.unwrap().expect("stream ended");
    String::from_utf8(chunk.to_vec()).unwrap()
}

// ---------------------------------------------------------------------------
// XHR streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn xhr_streaming_starts_with_prelude() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, _manager) = common::start_server(&endpoint).await;

    let mut resp = reqwest::Client::new()
        .post(format!("http://{addr}/sockjs/000/s1/xhr_streaming"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut body = String::new();
    while !body.contains("a[\"open\"]\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }
    assert!(body.starts_with(&format!("{}\n", "h".repeat(2048))));
    assert!(body.contains("o\n"));
}

#[tokio::test]
async fn xhr_streaming_delivers_sends_in_flight() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, manager) = common::start_server(&endpoint).await;
    let client = reqwest::Client::new();

    let mut resp = client
        .post(format!("http://{addr}/sockjs/000/s1/xhr_streaming"))
        .send()
        .await
        .unwrap();

    let mut body = String::new();
    while !body.contains("o\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }

    client
        .post(format!("http://{addr}/sockjs/000/s1/xhr_send"))
        .body(r#"["ping"]"#)
        .send()
        .await
        .unwrap();

    let mut body = String::new();
    while !body.contains("a[\"ping world\"]\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }

    // A local close terminates the stream with the close frame.
    manager.get("s1").unwrap().close();
    let mut body = String::new();
    while !body.contains("c[3000,\"Go away!\"]\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }
    assert!(resp.chunk().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

#[tokio::test]
async fn eventsource_frames_as_sse_data() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, _manager) = common::start_server(&endpoint).await;

    let mut resp = reqwest::Client::new()
        .get(format!("http://{addr}/sockjs/000/s1/eventsource"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"],
        "text/event-stream"
    );

    let mut body = String::new();
    while !body.contains("data: a[\"open\"]\r\n\r\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }
    assert!(body.starts_with("\r\n"));
    assert!(body.contains("data: o\r\n\r\n"));
}

// ---------------------------------------------------------------------------
// HTMLFile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn htmlfile_streams_script_chunks() {
    let endpoint = common::echo_endpoint(EndpointConfig::default());
    let (addr, _manager) = common::start_server(&endpoint).await;

    let mut resp = reqwest::Client::new()
        .get(format!("http://{addr}/sockjs/000/s1/htmlfile?c=callback"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut body = String::new();
    while !body.contains("<script>\np(\"a[\\\"open\\\"]\");\n</script>\r\n") {
        body.push_str(&next_chunk(&mut resp).await);
    }
    assert!(body.starts_with("<!doctype html>"));
    assert!(body.contains("var c = parent.callback;"));
    assert!(body.contains("<script>\np(\"o\");\n</script>\r\n"));
}

#[tokio::test]
async fn htmlfile_requires_callback() {
    let server = test_server(EndpointConfig::default());

    let resp = server.get("/sockjs/000/s1/htmlfile").await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text(), "\"callback\" parameter required");

    let resp = server.get("/sockjs/000/s2/htmlfile?c=invalid(").await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text(), "invalid \"callback\" parameter");
}

// ---------------------------------------------------------------------------
// JSONP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn jsonp_poll_wraps_one_frame() {
    let server = test_server(EndpointConfig::default());

    let resp = server.get("/sockjs/000/s1/jsonp?c=callback").await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "/**/callback(\"o\");\r\n");

    let resp = server.get("/sockjs/000/s1/jsonp?c=callback").await;
    assert_eq!(resp.text(), "/**/callback(\"a[\\\"open\\\"]\");\r\n");
}

#[tokio::test]
async fn jsonp_requires_callback() {
    let server = test_server(EndpointConfig::default());
    let resp = server.get("/sockjs/000/s1/jsonp").await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text(), "\"callback\" parameter required");
}

#[tokio::test]
async fn jsonp_send_accepts_plain_json_body() {
    let server = test_server(EndpointConfig::default());
    server.get("/sockjs/000/s1/jsonp?c=callback").await;

    let resp = server
        .post("/sockjs/000/s1/jsonp_send")
        .text(r#"["hi"]"#)
        .await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "ok");

    let resp = server.get("/sockjs/000/s1/jsonp?c=callback").await;
    assert_eq!(resp.text(), "/**/callback(\"a[\\\"open\\\",\\\"hi world\\\"]\");\r\n");
}

#[tokio::test]
async fn jsonp_send_accepts_form_encoded_body() {
    let server = test_server(EndpointConfig::default());
    server.get("/sockjs/000/s1/jsonp?c=callback").await;

    let resp = server
        .post("/sockjs/000/s1/jsonp_send")
        .content_type("application/x-www-form-urlencoded")
        .bytes("d=%5B%22form%22%5D".into())
        .await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "ok");
}

#[tokio::test]
async fn jsonp_send_rejects_missing_d_parameter() {
    let server = test_server(EndpointConfig::default());
    server.get("/sockjs/000/s1/jsonp?c=callback").await;

    let resp = server
        .post("/sockjs/000/s1/jsonp_send")
        .content_type("application/x-www-form-urlencoded")
        .bytes("x=1".into())
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text(), "Payload expected.");
}

#[tokio::test]
async fn jsonp_rejects_unexpected_method() {
    let server = test_server(EndpointConfig::default());
    let resp = server.put("/sockjs/000/s1/jsonp").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.text(), "No support for such method:{PUT}");
}
