// Copyright 2025 Oxide Computer Company

//! Test cases for sharing compiled plans across tasks.

use http::Method;
use http::StatusCode;
use restbind::Bindings;
use restbind::ConfigBinding;
use restbind::Input;
use restbind::Output;
use restbind::RawRequest;
use restbind::RequestDecoder;
use restbind::ResponseEncoder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Lookup {
    id: u32,
    #[schemars(range(min = 1, max = 10))]
    depth: u8,
    #[serde(rename = "X-Tenant")]
    tenant: String,
}

impl Input for Lookup {
    fn bindings() -> Bindings {
        Bindings::new().path("id").query("depth").header("X-Tenant")
    }
}

fn raw_lookup(id: u32, depth: u32, tenant: &str) -> RawRequest {
    let request = http::Request::builder()
        .method(Method::GET)
        .uri(format!("/lookup/{}?depth={}", id, depth))
        .header("x-tenant", tenant)
        .body(restbind::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    let path: BTreeMap<String, String> =
        [("id".to_string(), id.to_string())].into_iter().collect();
    RawRequest::new(parts.method, parts.uri, parts.headers)
        .unwrap()
        .with_path_params(path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_shared_decoder() {
    let decoder = Arc::new(
        RequestDecoder::for_input::<Lookup>(
            &Method::GET,
            &ConfigBinding::default(),
        )
        .unwrap(),
    );

    let tasks = (0..64u32)
        .map(|i| {
            let decoder = Arc::clone(&decoder);
            tokio::spawn(async move {
                // Every third request is out of range.
                let depth = if i % 3 == 0 { 11 } else { 1 + i % 10 };
                let tenant = format!("tenant-{}", i);
                let raw = raw_lookup(i, depth, &tenant);
                match decoder.decode::<Lookup>(&raw) {
                    Ok(lookup) => {
                        assert_ne!(i % 3, 0);
                        assert_eq!(
                            lookup,
                            Lookup { id: i, depth: depth as u8, tenant }
                        );
                    }
                    Err(error) => {
                        assert_eq!(i % 3, 0);
                        assert_eq!(error.status_code, StatusCode::BAD_REQUEST);
                        assert_eq!(
                            error.details.get("query:depth").unwrap(),
                            &["#: must be <= 10 but found 11".to_string()]
                        );
                        assert_eq!(error.details.len(), 1);
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }
}

#[derive(Debug, Default, JsonSchema, Serialize)]
struct Tally {
    #[serde(rename = "X-Shard")]
    #[schemars(range(max = 8))]
    shard: u32,
    #[schemars(range(max = 100))]
    count: u32,
    owner: String,
}

impl Output for Tally {
    fn bindings() -> Bindings {
        Bindings::new().header("X-Shard")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_shared_response_encoder() {
    let config =
        ConfigBinding { validate_responses: true, ..Default::default() };
    let encoder =
        Arc::new(ResponseEncoder::setup_output::<Tally>(&config).unwrap());

    let tasks = (0..96u32)
        .map(|i| {
            let encoder = Arc::clone(&encoder);
            tokio::spawn(async move {
                // Every fourth shard is out of range and every fifth count.
                let shard = if i % 4 == 0 { 9 } else { i % 8 };
                let count = if i % 5 == 0 { 150 } else { i };
                let output =
                    Tally { shard, count, owner: format!("owner-{}", i) };
                let request_id = format!("req-{}", i);
                let result = encoder.write_successful_response(
                    output,
                    &Method::GET,
                    &request_id,
                );
                match result {
                    Ok(response) => {
                        assert!(i % 4 != 0 && i % 5 != 0);
                        assert_eq!(response.status(), StatusCode::OK);
                        assert_eq!(
                            response.headers()["x-shard"],
                            shard.to_string().as_str()
                        );
                        assert_eq!(
                            response.headers()["x-request-id"],
                            request_id.as_str()
                        );
                        let body: serde_json::Value =
                            restbind::test_util::read_json(response).await;
                        assert_eq!(
                            body,
                            serde_json::json!({
                                "count": i,
                                "owner": format!("owner-{}", i),
                            })
                        );
                    }
                    Err(error) => {
                        assert!(i % 4 == 0 || i % 5 == 0);
                        assert_eq!(
                            error.status_code,
                            StatusCode::INTERNAL_SERVER_ERROR
                        );
                        let shard_error = error.details.get("header:X-Shard");
                        let body_error = error.details.get("body");
                        // Headers are checked before the body is built.
                        if i % 4 == 0 {
                            assert_eq!(
                                shard_error.unwrap(),
                                &["#: must be <= 8 but found 9".to_string()]
                            );
                            assert!(body_error.is_none());
                        } else {
                            assert!(shard_error.is_none());
                            assert_eq!(
                                body_error.unwrap(),
                                &["#/count: must be <= 100 but found 150"
                                    .to_string()]
                            );
                        }
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }
}
