use httpmock::Method::{GET, HEAD, POST, PUT};
use httpmock::MockServer;
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;
use tagindex_client::{ClientError, HttpTagClient, TagClient};
use tagindex_core::Digest;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn digest(data: &[u8]) -> Digest {
    Digest::compute(data)
}

#[tokio::test]
async fn client_put_get_and_origin() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let d = digest(b"labrat");

    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/tags/labrat")
            .json_body(json!({
                "digest": d.to_string(),
                "dependencies": [],
                "replicate": false
            }));
        then.status(200);
    });
    let get = server.mock(|when, then| {
        when.method(GET).path("/tags/labrat");
        then.status(200).body(d.to_string());
    });
    let origin = server.mock(|when, then| {
        when.method(GET).path("/origin");
        then.status(200).body("some-dns-record");
    });

    let client = HttpTagClient::new(&server.base_url()).unwrap();
    client.put("labrat", &d).await.unwrap();
    assert_eq!(client.get("labrat").await.unwrap(), d);
    assert_eq!(client.origin().await.unwrap(), "some-dns-record");

    put.assert();
    get.assert();
    origin.assert();
}

#[tokio::test]
async fn client_maps_not_found() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tags/missing");
        then.status(404)
            .json_body(json!({"code": "not_found", "message": "tag not found: missing"}));
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/tags/missing");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/tags/present");
        then.status(200);
    });

    let client = HttpTagClient::new(&server.base_url()).unwrap();
    let err = client.get("missing").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
    assert!(!client.has("missing").await.unwrap());
    assert!(client.has("present").await.unwrap());
}

#[tokio::test]
async fn client_surfaces_server_errors() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/tags/broken");
        then.status(502)
            .json_body(json!({"code": "upstream_failure", "message": "backend down"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/tags/garbage");
        then.status(200).body("not-a-digest");
    });

    let client = HttpTagClient::new(&server.base_url()).unwrap();
    match client.get("broken").await {
        Err(ClientError::Server { status, code, .. }) => {
            assert_eq!(status, 502);
            assert_eq!(code, "upstream_failure");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        client.get("garbage").await,
        Err(ClientError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn client_replication_calls() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let d = digest(b"tag");
    let deps = vec![digest(b"layer-1"), digest(b"layer-2")];

    let replicate = server.mock(|when, then| {
        when.method(POST)
            .path("/tags/labrat/replicate")
            .json_body(json!({
                "digest": d.to_string(),
                "dependencies": [deps[0].to_string(), deps[1].to_string()]
            }));
        then.status(200);
    });
    let duplicate = server.mock(|when, then| {
        when.method(POST)
            .path("/tags/labrat/duplicate-replicate")
            .json_body(json!({
                "digest": d.to_string(),
                "dependencies": [deps[0].to_string(), deps[1].to_string()],
                "delay_ms": 20 * 60 * 1000
            }));
        then.status(200);
    });
    let put_and_replicate = server.mock(|when, then| {
        when.method(PUT)
            .path("/tags/labrat")
            .json_body(json!({
                "digest": d.to_string(),
                "dependencies": [deps[0].to_string(), deps[1].to_string()],
                "replicate": true
            }));
        then.status(200);
    });

    let client = HttpTagClient::new(&server.base_url()).unwrap();
    client.replicate("labrat", &d, &deps).await.unwrap();
    client
        .duplicate_replicate("labrat", &d, &deps, Duration::from_secs(20 * 60))
        .await
        .unwrap();
    client.put_and_replicate("labrat", &d, &deps).await.unwrap();

    replicate.assert();
    duplicate.assert();
    put_and_replicate.assert();
}
