//! Integration tests for `HyperFetch` and `create_fetch` using wiremock.

use std::time::Duration;

use assert2::{check, let_assert};
use async_trait::async_trait;
use bytes::Bytes;
use plait::plugins::TimeoutPlugin;
use plait::{
    ClientConfig, Error, Fetch, HyperFetch, Pipeline, Plugin, ReasonPhrase, Request, Response, ResponseUrl,
    Result, Retry, create_fetch,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string, header, method, path},
};

/// Appends its name to the `x-trail` header, on the way in and out.
struct Trail(&'static str);

#[async_trait]
impl Plugin for Trail {
    fn name(&self) -> &str {
        self.0
    }

    async fn before_request(&self, request: Request) -> Result<Request> {
        let trail = match request.headers().get("x-trail") {
            Some(trail) => format!("{trail},{}", self.0),
            None => self.0.to_string(),
        };
        request.with_header("x-trail", &trail)
    }

    async fn after_response(
        &self,
        response: Response,
        _request: &Request,
        _retry: &Retry<'_>,
    ) -> Result<Response> {
        let trail = match response.headers().get("x-trail") {
            Some(trail) => format!("{trail},{}", self.0),
            None => self.0.to_string(),
        };
        response.with_header("x-trail", &trail)
    }
}

fn get(url: String) -> http::Request<Bytes> {
    http::Request::get(url).body(Bytes::new()).expect("request")
}

#[tokio::test]
async fn test_plain_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("world"))
        .mount(&mock_server)
        .await;

    let fetch = HyperFetch::new();
    let url = format!("{}/hello", mock_server.uri());
    let response = fetch.fetch(get(url.clone())).await.expect("response");

    check!(response.status() == 200);
    check!(response.body().as_ref() == b"world");
    check!(response.extensions().get::<ReasonPhrase>() == Some(&ReasonPhrase("OK".to_string())));
    let_assert!(Some(ResponseUrl(response_url)) = response.extensions().get::<ResponseUrl>());
    check!(response_url.as_str() == url);
}

#[tokio::test]
async fn test_empty_pipeline_is_transparent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-custom", "1"))
        .and(body_string("payload"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-server", "mock")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetch = create_fetch(HyperFetch::new(), Pipeline::new());
    let request = http::Request::post(format!("{}/echo", mock_server.uri()))
        .header("x-custom", "1")
        .body(Bytes::from_static(b"payload"))
        .expect("request");

    let response = fetch.fetch(request).await.expect("response");

    check!(response.status() == 201);
    check!(response.headers()["x-server"] == "mock");
    check!(response.body().as_ref() == b"created");
}

#[tokio::test]
async fn test_plugins_run_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trail"))
        .and(header("x-trail", "first,second"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pipeline = Pipeline::new().with(Trail("first")).with(Trail("second"));
    let fetch = create_fetch(HyperFetch::new(), pipeline);

    let response = fetch
        .fetch(get(format!("{}/trail", mock_server.uri())))
        .await
        .expect("response");

    check!(response.headers()["x-trail"] == "first,second");
}

#[tokio::test]
async fn test_nested_fetch_layers_pipelines() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nested"))
        .and(header("x-trail", "outer,inner"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let inner = create_fetch(HyperFetch::new(), Pipeline::new().with(Trail("inner")));
    let outer = create_fetch(inner, Pipeline::new().with(Trail("outer")));

    let response = outer
        .fetch(get(format!("{}/nested", mock_server.uri())))
        .await
        .expect("response");

    check!(response.headers()["x-trail"] == "inner,outer");
}

#[tokio::test]
async fn test_no_content_has_empty_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let fetch = create_fetch(HyperFetch::new(), Pipeline::new().with(Trail("only")));
    let request = http::Request::delete(format!("{}/items/1", mock_server.uri()))
        .body(Bytes::new())
        .expect("request");

    let response = fetch.fetch(request).await.expect("response");

    check!(response.status() == 204);
    check!(response.body().is_empty());
}

#[tokio::test]
async fn test_timeout_plugin_aborts_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let fetch = create_fetch(
        HyperFetch::new(),
        Pipeline::new().with(TimeoutPlugin::new(Duration::from_millis(100))),
    );

    let result = fetch.fetch(get(format!("{}/slow", mock_server.uri()))).await;

    let_assert!(Err(Error::Aborted) = result);
}

#[tokio::test]
async fn test_connection_refused() {
    let fetch = HyperFetch::new();
    // Port 9 (discard) is closed on test machines
    let result = fetch.fetch(get("http://127.0.0.1:9/".to_string())).await;

    let_assert!(Err(err) = result);
    check!(err.is_connection());
}

#[tokio::test]
async fn test_timeout_covers_head_and_body() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0_u8; 1024];
        let _ = socket.read(&mut buf).await;
        // Head and body each arrive within the deadline, but not together.
        tokio::time::sleep(Duration::from_millis(200)).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nab")
            .await
            .expect("head");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = socket.write_all(b"cd").await;
    });

    let fetch = HyperFetch::with_config(
        &ClientConfig::builder()
            .timeout(Duration::from_millis(300))
            .build(),
    );
    let result = fetch.fetch(get(format!("http://{addr}/dribble"))).await;

    let_assert!(Err(Error::Timeout) = result);
}
