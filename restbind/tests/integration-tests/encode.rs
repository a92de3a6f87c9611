// Copyright 2025 Oxide Computer Company

//! Test cases for encoding responses.

use async_trait::async_trait;
use http::Method;
use http::StatusCode;
use restbind::test_util::read_body;
use restbind::test_util::read_error;
use restbind::test_util::read_json;
use restbind::ApiDescription;
use restbind::ApiEndpoint;
use restbind::Bindings;
use restbind::ConfigBinding;
use restbind::HttpError;
use restbind::Input;
use restbind::Interactor;
use restbind::Output;
use restbind::RequestContext;
use restbind::HEADER_REQUEST_ID;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::common::request;
use crate::common::TestContext;

#[derive(Debug, Deserialize, JsonSchema)]
struct Gauge {
    level: i64,
}

impl Input for Gauge {
    fn bindings() -> Bindings {
        Bindings::new().query("level")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct Reading {
    #[serde(rename = "X-Output")]
    #[schemars(range(max = 20))]
    output: i64,
    unit: String,
}

impl Output for Reading {
    fn bindings() -> Bindings {
        Bindings::new().header("X-Output")
    }
}

struct GaugeReader;

#[async_trait]
impl Interactor for GaugeReader {
    type Context = ();
    type Input = Gauge;
    type Output = Reading;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Gauge,
        output: &mut Reading,
    ) -> Result<(), HttpError> {
        output.output = input.level;
        output.unit = "bar".to_string();
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NewWidget {
    name: String,
}

impl Input for NewWidget {}

#[derive(Default, JsonSchema, Serialize)]
struct Created {
    #[serde(rename = "Location")]
    location: String,
    name: String,
    version: u32,
}

impl Output for Created {
    fn bindings() -> Bindings {
        Bindings::new().header("Location")
    }

    fn success_status() -> StatusCode {
        StatusCode::CREATED
    }

    fn etag(&self) -> Option<String> {
        Some(format!("{}-{}", self.name, self.version))
    }
}

struct WidgetCreator;

#[async_trait]
impl Interactor for WidgetCreator {
    type Context = ();
    type Input = NewWidget;
    type Output = Created;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: NewWidget,
        output: &mut Created,
    ) -> Result<(), HttpError> {
        output.location = format!("/widgets/{}", input.name);
        output.name = input.name;
        output.version = 1;
        Ok(())
    }
}

fn encode_api(validate_responses: bool) -> ApiDescription<()> {
    let mut api = ApiDescription::with_config(ConfigBinding {
        validate_responses,
        ..Default::default()
    });
    api.register(ApiEndpoint::new("gauge", Method::GET, "/gauge", GaugeReader))
        .unwrap();
    api.register(ApiEndpoint::new(
        "widget_create",
        Method::POST,
        "/widgets",
        WidgetCreator,
    ))
    .unwrap();
    api
}

#[tokio::test]
async fn test_bad_response_header() {
    let testctx =
        TestContext::new("test_bad_response_header", encode_api(true), ());

    let response =
        testctx.send(request(Method::GET, "/gauge?level=45", &[], None)).await;
    let error =
        read_error(response, StatusCode::INTERNAL_SERVER_ERROR).await;
    assert_eq!(error.msg, "internal: bad response: validation failed");
    assert_eq!(
        error.details.get("header:X-Output").unwrap(),
        &["#: must be <= 20 but found 45".to_string()]
    );

    let response =
        testctx.send(request(Method::GET, "/gauge?level=12", &[], None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-output"], "12");
    let reading: serde_json::Value = read_json(response).await;
    assert_eq!(reading, json!({ "unit": "bar" }));

    testctx.teardown();
}

#[tokio::test]
async fn test_responses_unchecked_by_default() {
    let testctx = TestContext::new(
        "test_responses_unchecked_by_default",
        encode_api(false),
        (),
    );

    let response =
        testctx.send(request(Method::GET, "/gauge?level=45", &[], None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-output"], "45");

    testctx.teardown();
}

#[tokio::test]
async fn test_head_matches_get() {
    let testctx = TestContext::new("test_head_matches_get", encode_api(true), ());

    let get =
        testctx.send(request(Method::GET, "/gauge?level=3", &[], None)).await;
    let head =
        testctx.send(request(Method::HEAD, "/gauge?level=3", &[], None)).await;

    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(head.status(), get.status());
    for name in ["x-output", "content-type", "content-length"] {
        assert_eq!(head.headers()[name], get.headers()[name], "header {}", name);
    }
    assert_ne!(
        head.headers()[HEADER_REQUEST_ID],
        get.headers()[HEADER_REQUEST_ID]
    );

    let get_body = read_body(get).await;
    let head_body = read_body(head).await;
    assert!(!get_body.is_empty());
    assert!(head_body.is_empty());

    testctx.teardown();
}

#[tokio::test]
async fn test_created_with_headers() {
    let testctx =
        TestContext::new("test_created_with_headers", encode_api(true), ());

    let response = testctx
        .send(request(
            Method::POST,
            "/widgets",
            &[],
            Some(json!({ "name": "sprocket" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["location"], "/widgets/sprocket");
    assert_eq!(response.headers()["etag"], "\"sprocket-1\"");
    let created: serde_json::Value = read_json(response).await;
    assert_eq!(created, json!({ "name": "sprocket", "version": 1 }));

    testctx.teardown();
}
