// Copyright 2025 Oxide Computer Company

//! One registered operation and its request pipeline

use crate::body::Body;
use crate::config::ConfigBinding;
use crate::dynamic::DynamicHandler;
use crate::dynamic::DynamicInteractor;
use crate::dynamic::DynamicShape;
use crate::field_map::FieldLocationMap;
use crate::handler::ExpectedError;
use crate::handler::Interactor;
use crate::handler::InteractorHandler;
use crate::handler::RequestContext;
use crate::handler::RouteHandler;
use crate::handler::ServerContext;
use crate::logging::request_logger;
use crate::request::RawRequest;
use crate::validator::SchemaError;
use http::Method;
use slog::Logger;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An interactor bound to a method and route, with its decoding and
/// encoding plans compiled.
pub struct Operation<C: ServerContext> {
    operation_id: String,
    method: Method,
    path: String,
    config: ConfigBinding,
    handler: Arc<dyn RouteHandler<C>>,
}

impl<C: ServerContext> fmt::Debug for Operation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("operation_id", &self.operation_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handler", &self.handler)
            .finish()
    }
}

impl<C: ServerContext> Operation<C> {
    /// Compiles the plans for `interactor`'s input and output.  This is the
    /// point where configuration faults in either type surface, as panics
    /// from the field map or as a [`SchemaError`].
    pub fn new<I>(
        operation_id: &str,
        method: Method,
        path: &str,
        interactor: I,
        config: &ConfigBinding,
    ) -> Result<Operation<C>, SchemaError>
    where
        I: Interactor<Context = C>,
    {
        let handler = InteractorHandler::new(&method, interactor, config)?;
        Ok(Operation::with_handler(
            operation_id,
            method,
            path,
            Arc::new(handler),
            config,
        ))
    }

    /// Compiles the plans for a [`DynamicInteractor`] reading `input` and
    /// producing `output`.
    pub fn dynamic<D>(
        operation_id: &str,
        method: Method,
        path: &str,
        input: &DynamicShape,
        output: &DynamicShape,
        interactor: D,
        config: &ConfigBinding,
    ) -> Result<Operation<C>, SchemaError>
    where
        D: DynamicInteractor<Context = C>,
    {
        let handler = DynamicHandler::new(input, output, interactor, config)?;
        Ok(Operation::with_handler(
            operation_id,
            method,
            path,
            Arc::new(handler),
            config,
        ))
    }

    fn with_handler(
        operation_id: &str,
        method: Method,
        path: &str,
        handler: Arc<dyn RouteHandler<C>>,
        config: &ConfigBinding,
    ) -> Operation<C> {
        Operation {
            operation_id: operation_id.to_string(),
            method,
            path: path.to_string(),
            config: config.clone(),
            handler,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn input_map(&self) -> &Arc<FieldLocationMap> {
        self.handler.decoder().field_map()
    }

    pub fn output_map(&self) -> &Arc<FieldLocationMap> {
        self.handler.encoder().field_map()
    }

    pub(crate) fn handler(&self) -> &dyn RouteHandler<C> {
        &*self.handler
    }

    pub fn expected_errors(&self) -> Vec<ExpectedError> {
        self.handler.expected_errors()
    }

    /// Runs one request through the operation.  `path_variables` are the
    /// decoded values of the route's variables.  Failures of any stage come
    /// back as an error response; this never fails.
    pub async fn handle(
        &self,
        context: Arc<C>,
        request: http::Request<Body>,
        path_variables: BTreeMap<String, String>,
        log: &Logger,
    ) -> http::Response<Body> {
        let request_id = generate_request_id();
        let request_log = request_logger(
            log,
            &request_id,
            request.method(),
            request.uri(),
            &self.operation_id,
        );
        debug!(request_log, "incoming request");

        let rqctx = RequestContext {
            context,
            request_id: request_id.clone(),
            log: request_log.clone(),
            operation_id: self.operation_id.clone(),
            method: request.method().clone(),
            uri: request.uri().clone(),
            path_variables: path_variables.clone(),
        };

        let result = match RawRequest::from_request(
            request,
            path_variables,
            self.config.request_body_max_bytes,
        )
        .await
        {
            Ok(raw) => self.handler.handle_request(rqctx, raw).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(response) => {
                debug!(request_log, "request completed";
                    "response_code" => response.status().as_str().to_string());
                response
            }
            Err(error) => {
                let response_code = error.status_code.as_str().to_string();
                if error.status_code.is_server_error() {
                    error!(request_log, "request completed";
                        "response_code" => response_code,
                        "error_message_internal" => &error.internal_message,
                        "error_message_external" => &error.external_message,
                    );
                } else {
                    debug!(request_log, "request completed";
                        "response_code" => response_code,
                        "error_message_internal" => &error.internal_message,
                    );
                }
                self.handler.encoder().write_err_response(error, &request_id)
            }
        }
    }
}

pub(crate) fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
