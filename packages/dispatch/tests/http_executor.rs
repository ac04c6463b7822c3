use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use silo_core::{
    encode_value, Call, ExecutionFailure, ExecutionRequest, ExecutionResult, FailureKind,
    TaskRegistry,
};
use silo_dispatch::{
    DispatchClient, DispatchConfig, DispatchError, Endpoint, EndpointPool, Executor, FixedSampler,
    HttpExecutor, RequestForm, RpcError,
};
use silo_store::ContentStoreClient;

fn output(value: serde_json::Value) -> serde_json::Value {
    json!({ "output": encode_value(&value).unwrap() })
}

async fn client_for(servers: &[&MockServer], config: DispatchConfig) -> DispatchClient {
    let urls: Vec<String> = servers.iter().map(|s| s.uri()).collect();
    DispatchClient::builder(
        ContentStoreClient::in_memory(),
        EndpointPool::from_urls(urls.as_slice()).unwrap(),
    )
    .config(config)
    .sampler(FixedSampler(false))
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_execute_posts_json_and_decodes_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(output(json!("Hello, World!"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&[&server], DispatchConfig::default()).await;
    let out = client
        .function("greet")
        .remote(&Call::with_args(("World",)).unwrap())
        .await
        .unwrap();
    assert_eq!(out, json!("Hello, World!"));
}

#[tokio::test]
async fn test_reference_request_carries_address_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(output(json!(1))))
        .mount(&server)
        .await;

    let client = client_for(&[&server], DispatchConfig::default()).await;
    client.function("one").remote(&Call::new()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent: ExecutionRequest = serde_json::from_slice(&requests[0].body).unwrap();
    match sent {
        ExecutionRequest::Reference(address) => {
            assert_eq!(address.address.len(), 64);
            // the blob is really in the caller's store
            assert!(client.store().fetch_package(&address).await.is_ok());
        }
        other => panic!("expected reference request, got {other:?}"),
    }
}

#[tokio::test]
async fn test_inline_request_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .and(body_partial_json(json!({ "inline": {} })))
        .respond_with(ResponseTemplate::new(200).set_body_json(output(json!(42))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(
        &[&server],
        DispatchConfig::default().with_request_form(RequestForm::Inline),
    )
    .await;
    let out = client
        .function("answer")
        .remote(&Call::new())
        .await
        .unwrap();
    assert_eq!(out, json!(42));
}

#[tokio::test]
async fn test_remote_error_payload_is_surfaced() {
    let server = MockServer::start().await;
    let failure = ExecutionFailure::new(FailureKind::Failed, "division by zero");
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(ExecutionResult::Error(failure.clone())),
        )
        .mount(&server)
        .await;

    let client = client_for(&[&server], DispatchConfig::default()).await;
    let err = client
        .function("div")
        .remote(&Call::new())
        .await
        .unwrap_err();
    match err {
        DispatchError::Remote(reported) => assert_eq!(reported, failure),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_success_status_is_rpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client_for(&[&server], DispatchConfig::default()).await;
    let err = client.function("x").remote(&Call::new()).await.unwrap_err();
    match err {
        DispatchError::Rpc(RpcError::Status { status, body, .. }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_response_is_rpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&[&server], DispatchConfig::default()).await;
    let err = client.function("x").remote(&Call::new()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Rpc(RpcError::Malformed { .. })));
}

#[tokio::test]
async fn test_slow_endpoint_hits_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(output(json!(1)))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client_for(
        &[&server],
        DispatchConfig::default().with_timeout(Duration::from_millis(100)),
    )
    .await;
    let err = client.function("x").remote(&Call::new()).await.unwrap_err();
    // either the dispatch bound or the reqwest bound fires first
    assert!(matches!(
        err,
        DispatchError::Timeout(_) | DispatchError::Rpc(RpcError::Http(_))
    ));
}

#[tokio::test]
async fn test_api_key_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .and(header("X-API-Key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(output(json!(true))))
        .expect(1)
        .mount(&server)
        .await;

    let executor = HttpExecutor::with_api_key(Duration::from_secs(5), "s3cret").unwrap();
    let endpoint = Endpoint::parse(&server.uri()).unwrap();
    let result = executor
        .execute(
            &endpoint,
            &ExecutionRequest::Inline {
                package: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(result, ExecutionResult::output(&json!(true)).unwrap());
}

#[tokio::test]
async fn test_map_spreads_over_pool_and_keeps_order() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    for server in [&a, &b] {
        Mock::given(method("POST"))
            .and(path("/api/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(output(json!("ok"))))
            .mount(server)
            .await;
    }

    let client = client_for(&[&a, &b], DispatchConfig::default().with_concurrency(4)).await;
    let outputs = client
        .function("echo")
        .map((0..10).map(|i| Call::new().arg(i).unwrap()))
        .await
        .unwrap();
    assert_eq!(outputs.len(), 10);

    let served_a = a.received_requests().await.unwrap().len();
    let served_b = b.received_requests().await.unwrap().len();
    assert_eq!(served_a + served_b, 10);
}

#[tokio::test]
async fn test_verification_against_lying_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(output(json!(5))))
        .mount(&server)
        .await;

    let registry = TaskRegistry::new().with_typed("add", |(a, b): (i64, i64)| Ok(a + b));
    let client = DispatchClient::builder(
        ContentStoreClient::in_memory(),
        EndpointPool::from_urls(&[server.uri()]).unwrap(),
    )
    .registry(registry)
    .sampler(FixedSampler(true))
    .build()
    .unwrap();

    let add = client.function("add");
    assert_eq!(
        add.remote(&Call::with_args((2, 3)).unwrap()).await.unwrap(),
        json!(5)
    );
    let err = add
        .remote(&Call::with_args((2, 2)).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Verification { .. }));
}
