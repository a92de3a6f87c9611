// Copyright 2025 Oxide Computer Company

//! Test cases for decoding and validating requests.

use async_trait::async_trait;
use chrono::NaiveDate;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use restbind::test_util::read_error;
use restbind::test_util::read_json;
use restbind::ApiDescription;
use restbind::ApiEndpoint;
use restbind::Bindings;
use restbind::Body;
use restbind::ConfigBinding;
use restbind::HttpError;
use restbind::Input;
use restbind::Interactor;
use restbind::Output;
use restbind::ParamLocation;
use restbind::RawRequest;
use restbind::RequestContext;
use restbind::RequestDecoder;
use restbind::RequestEncoder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::common::request;
use crate::common::TestContext;

#[derive(Debug, Deserialize, JsonSchema)]
struct Threshold {
    #[serde(rename = "X-Input")]
    #[schemars(range(min = 10))]
    input: i64,
}

impl Input for Threshold {
    fn bindings() -> Bindings {
        Bindings::new().header("X-Input")
    }
}

struct ThresholdInteractor;

#[async_trait]
impl Interactor for ThresholdInteractor {
    type Context = ();
    type Input = Threshold;
    type Output = ();
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        _input: Threshold,
        _output: &mut (),
    ) -> Result<(), HttpError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
struct Signup {
    id: u64,
    name: String,
    #[serde(rename = "X-Header")]
    header: String,
    in_query: NaiveDate,
}

impl Input for Signup {
    fn bindings() -> Bindings {
        Bindings::new().header("X-Header").query("in_query")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct SignupEcho {
    id: u64,
    name: String,
    header: String,
    in_query: Option<NaiveDate>,
}

impl Output for SignupEcho {}

struct SignupInteractor;

#[async_trait]
impl Interactor for SignupInteractor {
    type Context = ();
    type Input = Signup;
    type Output = SignupEcho;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Signup,
        output: &mut SignupEcho,
    ) -> Result<(), HttpError> {
        output.id = input.id;
        output.name = input.name;
        output.header = input.header;
        output.in_query = Some(input.in_query);
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct Search {
    q: String,
    #[serde(default = "default_page")]
    page: u32,
}

fn default_page() -> u32 {
    1
}

impl Input for Search {
    fn bindings() -> Bindings {
        Bindings::new().query("q").query("page")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct SearchResult {
    q: String,
    page: u32,
}

impl Output for SearchResult {}

struct SearchInteractor;

#[async_trait]
impl Interactor for SearchInteractor {
    type Context = ();
    type Input = Search;
    type Output = SearchResult;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Search,
        output: &mut SearchResult,
    ) -> Result<(), HttpError> {
        output.q = input.q;
        output.page = input.page;
        Ok(())
    }
}

fn decode_api() -> ApiDescription<()> {
    let mut api = ApiDescription::with_config(ConfigBinding {
        request_body_max_bytes: 64,
        ..Default::default()
    });
    api.register(ApiEndpoint::new(
        "threshold_check",
        Method::GET,
        "/threshold",
        ThresholdInteractor,
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "signup",
        Method::POST,
        "/signup",
        SignupInteractor,
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "search",
        Method::GET,
        "/search",
        SearchInteractor,
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "listing_get",
        Method::GET,
        "/listings",
        ListingInteractor,
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "catalog_find",
        Method::GET,
        "/catalog",
        CatalogInteractor,
    ))
    .unwrap();
    api
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
struct Listing {
    #[schemars(range(min = 1))]
    limit: u32,
    #[serde(rename = "X-Tenant")]
    tenant: Option<String>,
    session: Option<String>,
    tags: Vec<String>,
    ids: Vec<u32>,
    #[serde(default = "default_size")]
    size: u32,
}

fn default_size() -> u32 {
    10
}

impl Input for Listing {
    fn bindings() -> Bindings {
        Bindings::new()
            .query("limit")
            .header("X-Tenant")
            .cookie("session")
            .query("tags")
            .query("ids")
            .delimited("ids")
            .query("size")
            .default_value("size", json!(25))
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct ListingEcho {
    limit: u32,
    tenant: Option<String>,
    session: Option<String>,
    tags: Vec<String>,
    ids: Vec<u32>,
    size: u32,
}

impl Output for ListingEcho {}

struct ListingInteractor;

#[async_trait]
impl Interactor for ListingInteractor {
    type Context = ();
    type Input = Listing;
    type Output = ListingEcho;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Listing,
        output: &mut ListingEcho,
    ) -> Result<(), HttpError> {
        *output = ListingEcho {
            limit: input.limit,
            tenant: input.tenant,
            session: input.session,
            tags: input.tags,
            ids: input.ids,
            size: input.size,
        };
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CatalogFilter {
    #[schemars(length(min = 1))]
    name: String,
    #[serde(default)]
    exact: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CatalogQuery {
    filter: CatalogFilter,
    #[serde(default = "default_size")]
    size: u32,
}

impl Input for CatalogQuery {
    fn bindings() -> Bindings {
        Bindings::new().query("size").whole_body("filter")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct CatalogPage {
    name: String,
    exact: bool,
    size: u32,
}

impl Output for CatalogPage {}

struct CatalogInteractor;

#[async_trait]
impl Interactor for CatalogInteractor {
    type Context = ();
    type Input = CatalogQuery;
    type Output = CatalogPage;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: CatalogQuery,
        output: &mut CatalogPage,
    ) -> Result<(), HttpError> {
        output.name = input.filter.name;
        output.exact = input.filter.exact;
        output.size = input.size;
        Ok(())
    }
}

#[tokio::test]
async fn test_header_below_minimum() {
    let testctx = TestContext::new("test_header_below_minimum", decode_api(), ());

    let response = testctx
        .send(request(Method::GET, "/threshold", &[("X-Input", "5")], None))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(error.msg, "invalid argument: validation failed");
    assert_eq!(error.details.len(), 1);
    assert_eq!(
        error.details.get("header:X-Input").unwrap(),
        &["#: must be >= 10 but found 5".to_string()]
    );

    let response = testctx
        .send(request(Method::GET, "/threshold", &[("x-input", "10")], None))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    testctx.teardown();
}

#[tokio::test]
async fn test_unknown_query_parameter() {
    let testctx =
        TestContext::new("test_unknown_query_parameter", decode_api(), ());

    let response = testctx
        .send(request(Method::GET, "/search?q=rust&color=blue", &[], None))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("query:color").unwrap(),
        &["unknown parameter with value blue".to_string()]
    );

    let response =
        testctx.send(request(Method::GET, "/search?q=rust", &[], None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let result: serde_json::Value = read_json(response).await;
    assert_eq!(result, json!({ "q": "rust", "page": 1 }));

    testctx.teardown();
}

#[tokio::test]
async fn test_all_locations_populated() {
    let testctx =
        TestContext::new("test_all_locations_populated", decode_api(), ());

    let response = testctx
        .send(request(
            Method::POST,
            "/signup?in_query=2006-01-02",
            &[("X-Header", "def")],
            Some(json!({ "id": 321, "name": "Jane" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(
        echo,
        json!({
            "id": 321,
            "name": "Jane",
            "header": "def",
            "in_query": "2006-01-02",
        })
    );

    let response = testctx
        .send(request(
            Method::POST,
            "/signup?in_query=yesterday",
            &[],
            Some(json!({ "id": 321, "name": "Jane" })),
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("header:X-Header").unwrap(),
        &["missing value".to_string()]
    );
    assert!(error.details.get("query:in_query").is_some());

    testctx.teardown();
}

#[tokio::test]
async fn test_encode_then_decode() {
    let signup = Signup {
        id: 321,
        name: "Jane".to_string(),
        header: "def".to_string(),
        in_query: NaiveDate::from_ymd_opt(2006, 1, 2).unwrap(),
    };
    let encoded = RequestEncoder::for_input::<Signup>(&Method::POST)
        .encode(Method::POST, "/signup", &signup)
        .unwrap();
    assert_eq!(encoded.uri(), "/signup?in_query=2006-01-02");
    assert_eq!(encoded.headers()["x-header"], "def");

    let raw = RawRequest::from_request(encoded, BTreeMap::new(), 1024)
        .await
        .unwrap();
    let decoder = RequestDecoder::for_input::<Signup>(
        &Method::POST,
        &ConfigBinding::default(),
    )
    .unwrap();
    let decoded: Signup = decoder.decode(&raw).unwrap();
    assert_eq!(decoded, signup);
    assert!(decoder.field_map().has_location(ParamLocation::Query));
}

#[tokio::test]
async fn test_body_limits() {
    let testctx = TestContext::new("test_body_limits", decode_api(), ());

    let long_name = "x".repeat(100);
    let response = testctx
        .send(request(
            Method::POST,
            "/signup?in_query=2006-01-02",
            &[("X-Header", "def")],
            Some(json!({ "id": 1, "name": long_name })),
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.msg,
        "invalid argument: request body exceeded maximum size of 64 bytes"
    );

    let response = testctx
        .send(
            http::Request::builder()
                .method(Method::POST)
                .uri("/signup?in_query=2006-01-02")
                .header("X-Header", "def")
                .header(http::header::CONTENT_TYPE, "text/plain")
                .body(restbind::Body::from("id=1"))
                .unwrap(),
        )
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.msg,
        "invalid argument: expected content type \"application/json\", got \
         \"text/plain\""
    );
    assert!(error.details.is_empty());

    let response = testctx
        .send(request(
            Method::POST,
            "/signup?in_query=2006-01-02",
            &[("X-Header", "def")],
            None,
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("body").unwrap(),
        &["missing request body".to_string()]
    );

    testctx.teardown();
}

fn listing_request(
    uri: &str,
    headers: &[(&str, &[u8])],
) -> http::Request<Body> {
    let mut builder = http::Request::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        builder =
            builder.header(*name, HeaderValue::from_bytes(value).unwrap());
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_undecodable_header_keeps_report() {
    let testctx = TestContext::new(
        "test_undecodable_header_keeps_report",
        decode_api(),
        (),
    );

    // Nothing reads User-Agent, so its encoding doesn't matter.
    let response = testctx
        .send(listing_request(
            "/listings?limit=0&ids=1",
            &[("user-agent", &b"caf\xe9"[..])],
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("query:limit").unwrap(),
        &["#: must be >= 1 but found 0".to_string()]
    );
    assert_eq!(error.details.len(), 1);

    let response = testctx
        .send(listing_request(
            "/listings?limit=0&ids=1",
            &[("x-tenant", &b"caf\xe9"[..])],
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("header:X-Tenant").unwrap(),
        &["value of header \"X-Tenant\" is not valid UTF-8".to_string()]
    );
    assert!(error.details.get("query:limit").is_some());
    assert_eq!(error.details.len(), 2);

    let response = testctx
        .send(listing_request(
            "/listings?limit=2&ids=1",
            &[("x-tenant", "café".as_bytes())],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(echo["tenant"], "café");

    testctx.teardown();
}

#[tokio::test]
async fn test_cookie_parameters() {
    let testctx =
        TestContext::new("test_cookie_parameters", decode_api(), ());

    let response = testctx
        .send(listing_request(
            "/listings?limit=1&ids=4,5",
            &[("cookie", &b"session=abc%3D; other=%FF"[..])],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(echo["session"], "abc=");
    assert_eq!(echo["ids"], json!([4, 5]));

    let response = testctx
        .send(listing_request(
            "/listings?limit=1&ids=4",
            &[("cookie", &b"session=%FF"[..])],
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("cookie:session").unwrap(),
        &["value of cookie \"session\" is not valid UTF-8".to_string()]
    );
    assert_eq!(error.details.len(), 1);

    testctx.teardown();
}

#[tokio::test]
async fn test_arrays_and_defaults() {
    let testctx =
        TestContext::new("test_arrays_and_defaults", decode_api(), ());

    // The declared default beats the one on the field.
    let response = testctx
        .send(listing_request("/listings?limit=1&ids=&tags=a,b&tags=", &[]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(
        echo,
        json!({
            "limit": 1,
            "tenant": null,
            "session": null,
            "tags": ["a,b", ""],
            "ids": [],
            "size": 25,
        })
    );

    let response = testctx
        .send(listing_request("/listings?limit=1&ids=2,3&size=4", &[]))
        .await;
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(echo["tags"], json!([]));
    assert_eq!(echo["ids"], json!([2, 3]));
    assert_eq!(echo["size"], 4);

    let response =
        testctx.send(listing_request("/listings?limit=1", &[])).await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("query:ids").unwrap(),
        &["missing value".to_string()]
    );

    testctx.teardown();
}

#[tokio::test]
async fn test_whole_body_on_get() {
    let testctx =
        TestContext::new("test_whole_body_on_get", decode_api(), ());

    let response = testctx
        .send(request(
            Method::GET,
            "/catalog?size=5",
            &[],
            Some(json!({ "name": "disk" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page: serde_json::Value = read_json(response).await;
    assert_eq!(page, json!({ "name": "disk", "exact": false, "size": 5 }));

    let response = testctx
        .send(request(
            Method::GET,
            "/catalog?size=many",
            &[],
            Some(json!({ "name": "" })),
        ))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("body").unwrap(),
        &["#/name: length must be >= 1 but found 0".to_string()]
    );
    assert_eq!(
        error.details.get("query:size").unwrap(),
        &["#: unable to parse 'many' as integer".to_string()]
    );

    testctx.teardown();
}

#[tokio::test]
async fn test_encode_then_dispatch() {
    let testctx =
        TestContext::new("test_encode_then_dispatch", decode_api(), ());
    let encoder = RequestEncoder::for_input::<Listing>(&Method::GET);

    let listing = Listing {
        limit: 3,
        tenant: Some("acme".to_string()),
        session: Some("a b;c".to_string()),
        tags: vec!["x,y".to_string(), String::new()],
        ids: vec![7, 8],
        size: 4,
    };
    let encoded = encoder.encode(Method::GET, "/listings", &listing).unwrap();
    let response = testctx.send(encoded).await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(echo["limit"], 3);
    assert_eq!(echo["tenant"], "acme");
    assert_eq!(echo["session"], "a b;c");
    assert_eq!(echo["tags"], json!(["x,y", ""]));
    assert_eq!(echo["ids"], json!([7, 8]));
    assert_eq!(echo["size"], 4);

    let bare = Listing {
        limit: 1,
        tenant: None,
        session: None,
        tags: Vec::new(),
        ids: Vec::new(),
        size: 25,
    };
    let encoded = encoder.encode(Method::GET, "/listings", &bare).unwrap();
    let response = testctx.send(encoded).await;
    assert_eq!(response.status(), StatusCode::OK);
    let echo: serde_json::Value = read_json(response).await;
    assert_eq!(echo["tenant"], serde_json::Value::Null);
    assert_eq!(echo["tags"], json!([]));
    assert_eq!(echo["ids"], json!([]));

    testctx.teardown();
}
