// Copyright 2025 Oxide Computer Company

//! Test cases for form and multipart request bodies.

use async_trait::async_trait;
use http::Method;
use http::StatusCode;
use restbind::test_util::read_error;
use restbind::test_util::read_json;
use restbind::ApiDescription;
use restbind::ApiEndpoint;
use restbind::Bindings;
use restbind::Body;
use restbind::FileHeader;
use restbind::HttpError;
use restbind::Input;
use restbind::Interactor;
use restbind::Output;
use restbind::RequestContext;
use restbind::UploadedFile;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use std::io::Read;

use crate::common::TestContext;

const BOUNDARY: &str = "X-RESTBIND-BOUNDARY";

#[derive(Debug, Deserialize, JsonSchema)]
struct Upload {
    title: String,
    attachment: UploadedFile,
    #[serde(default)]
    extras: Vec<FileHeader>,
}

impl Input for Upload {
    fn bindings() -> Bindings {
        Bindings::new().form("title").file("attachment").file("extras")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct UploadReceipt {
    title: String,
    filename: Option<String>,
    content_type: Option<String>,
    content: String,
    extras: Vec<String>,
}

impl Output for UploadReceipt {}

struct Uploader;

#[async_trait]
impl Interactor for Uploader {
    type Context = ();
    type Input = Upload;
    type Output = UploadReceipt;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Upload,
        output: &mut UploadReceipt,
    ) -> Result<(), HttpError> {
        let mut content = String::new();
        input.attachment.reader().read_to_string(&mut content).map_err(|e| {
            HttpError::for_bad_request(format!("attachment is not text: {}", e))
        })?;
        output.title = input.title;
        output.filename = input.attachment.filename().map(str::to_string);
        output.content_type =
            input.attachment.content_type().map(str::to_string);
        output.content = content;
        output.extras = input
            .extras
            .into_iter()
            .filter_map(|extra| extra.filename)
            .collect();
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Subscribe {
    email: String,
    #[schemars(range(min = 13))]
    age: u32,
}

impl Input for Subscribe {
    fn bindings() -> Bindings {
        Bindings::new().form("email").form("age")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct Subscribed {
    email: String,
    age: u32,
}

impl Output for Subscribed {}

struct Subscriber;

#[async_trait]
impl Interactor for Subscriber {
    type Context = ();
    type Input = Subscribe;
    type Output = Subscribed;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: Subscribe,
        output: &mut Subscribed,
    ) -> Result<(), HttpError> {
        output.email = input.email;
        output.age = input.age;
        Ok(())
    }
}

fn form_api() -> ApiDescription<()> {
    let mut api = ApiDescription::new();
    api.register(ApiEndpoint::new("upload", Method::POST, "/uploads", Uploader))
        .unwrap();
    api.register(ApiEndpoint::new(
        "subscribe",
        Method::POST,
        "/subscriptions",
        Subscriber,
    ))
    .unwrap();
    api
}

/// One part of a multipart body: name, optional filename and content.
type Part<'a> = (&'a str, Option<&'a str>, &'a str);

fn multipart_request(parts: &[Part<'_>]) -> http::Request<Body> {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match filename {
            Some(filename) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; \
                     filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                    name, filename
                ));
            }
            None => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                ));
            }
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    http::Request::builder()
        .method(Method::POST)
        .uri("/uploads")
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn form_request(body: &'static str) -> http::Request<Body> {
    http::Request::builder()
        .method(Method::POST)
        .uri("/subscriptions")
        .header(
            http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_multipart_upload() {
    let testctx = TestContext::new("test_multipart_upload", form_api(), ());

    let response = testctx
        .send(multipart_request(&[
            ("title", None, "quarterly report"),
            ("attachment", Some("report.txt"), "all is well"),
            ("extras", Some("a.txt"), "a"),
            ("extras", Some("b.txt"), "b"),
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let receipt: serde_json::Value = read_json(response).await;
    assert_eq!(
        receipt,
        json!({
            "title": "quarterly report",
            "filename": "report.txt",
            "content_type": "text/plain",
            "content": "all is well",
            "extras": ["a.txt", "b.txt"],
        })
    );

    testctx.teardown();
}

#[tokio::test]
async fn test_multipart_missing_file() {
    let testctx =
        TestContext::new("test_multipart_missing_file", form_api(), ());

    let response = testctx
        .send(multipart_request(&[("title", None, "no attachment")]))
        .await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("file:attachment").unwrap(),
        &["missing required file".to_string()]
    );
    assert_eq!(error.details.len(), 1);

    testctx.teardown();
}

#[tokio::test]
async fn test_url_encoded_form() {
    let testctx = TestContext::new("test_url_encoded_form", form_api(), ());

    let response =
        testctx.send(form_request("email=jane%40example.com&age=42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let subscribed: serde_json::Value = read_json(response).await;
    assert_eq!(subscribed, json!({ "email": "jane@example.com", "age": 42 }));

    let response = testctx.send(form_request("email=kid&age=old")).await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("formData:age").unwrap(),
        &["#: unable to parse 'old' as integer".to_string()]
    );

    let response = testctx.send(form_request("email=kid&age=9")).await;
    let error = read_error(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(
        error.details.get("formData:age").unwrap(),
        &["#: must be >= 13 but found 9".to_string()]
    );

    testctx.teardown();
}
