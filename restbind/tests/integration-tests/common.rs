// Copyright 2025 Oxide Computer Company

//! Common facilities for automated testing.

use restbind::test_util::LogContext;
use restbind::ApiDescription;
use restbind::Body;
use restbind::ConfigLogging;
use restbind::ConfigLoggingIfExists;
use restbind::ConfigLoggingLevel;
use restbind::ServerContext;
use std::sync::Arc;

pub fn create_log_context(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Debug,
        path: "UNUSED".into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };
    LogContext::new(test_name, &log_config)
}

/// An API under test, with the context and logger its requests run with.
pub struct TestContext<C: ServerContext> {
    pub api: ApiDescription<C>,
    pub context: Arc<C>,
    pub logctx: LogContext,
}

impl<C: ServerContext> TestContext<C> {
    pub fn new(test_name: &str, api: ApiDescription<C>, context: C) -> Self {
        TestContext {
            api,
            context: Arc::new(context),
            logctx: create_log_context(test_name),
        }
    }

    pub async fn send(
        &self,
        request: http::Request<Body>,
    ) -> http::Response<Body> {
        let log = self.logctx.log.new(o!());
        self.api.handle(Arc::clone(&self.context), request, &log).await
    }

    pub fn teardown(self) {
        self.logctx.cleanup_successful();
    }
}

/// Builds a request with the given headers and an optional JSON body.
pub fn request(
    method: http::Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<serde_json::Value>,
) -> http::Request<Body> {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header(http::header::CONTENT_TYPE, restbind::CONTENT_TYPE_JSON)
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
