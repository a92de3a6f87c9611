// Copyright 2025 Oxide Computer Company

//! The business logic boundary
//!
//! Business logic implements [`Interactor`]: given the request context and a
//! decoded, validated input, it fills in an output or fails.  Everything on
//! either side of that call (decoding, validation, encoding and turning
//! failures into responses) belongs to this crate, so the interactor's types
//! are the whole contract of an operation.
//!
//! `InteractorHandler` is the only implementor of `RouteHandler`.  It exists
//! so an operation can hold any interactor behind one trait object that's not
//! parametrized by the interactor's input and output types.

use crate::body::Body;
use crate::config::ConfigBinding;
use crate::decoder::Input;
use crate::decoder::RequestDecoder;
use crate::encoder::Output;
use crate::encoder::PendingResponse;
use crate::encoder::ResponseEncoder;
use crate::encoder::ResponseHead;
use crate::error::ErrorResponseBody;
use crate::error::HandlerError;
use crate::error::HttpError;
use crate::request::RawRequest;
use crate::validator::SchemaError;
use async_trait::async_trait;
use http::Method;
use http::StatusCode;
use http::Uri;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use slog::Logger;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Shared state available to every interactor of an API.
pub trait ServerContext: Send + Sync + 'static {}

impl<T: 'static> ServerContext for T where T: Send + Sync {}

/// Handle for various interfaces useful during request processing.
#[derive(Debug)]
pub struct RequestContext<C: ServerContext> {
    /// shared state
    pub context: Arc<C>,
    /// unique id assigned to this request
    pub request_id: String,
    /// logger for this specific request
    pub log: Logger,
    pub operation_id: String,
    pub method: Method,
    pub uri: Uri,
    /// values of the route's path variables, as they appeared in the path
    pub path_variables: BTreeMap<String, String>,
}

impl<C: ServerContext> RequestContext<C> {
    pub fn context(&self) -> &C {
        &self.context
    }
}

/// Business logic for one operation.
#[async_trait]
pub trait Interactor: Send + Sync + 'static {
    type Context: ServerContext;
    type Input: Input;
    type Output: Output;
    type Error: HandlerError;

    /// Runs the operation.  `output` starts out as the output type's default
    /// (wired to a [`ResponseWriter`](crate::ResponseWriter) if it streams).
    async fn interact(
        &self,
        rqctx: &RequestContext<Self::Context>,
        input: Self::Input,
        output: &mut Self::Output,
    ) -> Result<(), Self::Error>;

    /// Failures this operation is known to produce, for the documentation.
    fn expected_errors() -> Vec<ExpectedError> {
        Vec::new()
    }
}

/// A failure response an operation declares up front.
#[derive(Clone)]
pub struct ExpectedError {
    pub status: StatusCode,
    pub description: String,
    schema: fn(&mut SchemaGenerator) -> Schema,
}

impl ExpectedError {
    /// An expected failure with the standard error body.
    pub fn new(status: StatusCode, description: &str) -> ExpectedError {
        ExpectedError::with_shape::<ErrorResponseBody>(status, description)
    }

    /// An expected failure whose body has the shape of `T`.
    pub fn with_shape<T: JsonSchema>(
        status: StatusCode,
        description: &str,
    ) -> ExpectedError {
        ExpectedError {
            status,
            description: description.to_string(),
            schema: |gen| gen.subschema_for::<T>(),
        }
    }

    pub(crate) fn schema(&self, gen: &mut SchemaGenerator) -> Schema {
        (self.schema)(gen)
    }
}

impl Debug for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedError")
            .field("status", &self.status)
            .field("description", &self.description)
            .finish()
    }
}

#[async_trait]
pub(crate) trait RouteHandler<C: ServerContext>: Debug + Send + Sync {
    fn decoder(&self) -> &RequestDecoder;

    fn encoder(&self) -> &ResponseEncoder;

    fn expected_errors(&self) -> Vec<ExpectedError>;

    /// Decodes the request, runs the interactor and encodes its output.
    async fn handle_request(
        &self,
        rqctx: RequestContext<C>,
        raw: RawRequest,
    ) -> Result<http::Response<Body>, HttpError>;
}

pub(crate) struct InteractorHandler<I: Interactor> {
    interactor: Arc<I>,
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
}

impl<I: Interactor> Debug for InteractorHandler<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractorHandler")
            .field("decoder", &self.decoder)
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl<I: Interactor> InteractorHandler<I> {
    pub(crate) fn new(
        method: &Method,
        interactor: I,
        config: &ConfigBinding,
    ) -> Result<InteractorHandler<I>, SchemaError> {
        Ok(InteractorHandler {
            interactor: Arc::new(interactor),
            decoder: RequestDecoder::for_input::<I::Input>(method, config)?,
            encoder: ResponseEncoder::setup_output::<I::Output>(config)?,
        })
    }

    /// Runs a streaming interactor on its own task.  The response goes back
    /// as soon as the writer sends its head, while the task keeps writing.
    /// A HEAD request gets the head only; what's written is read and dropped.
    async fn stream(
        &self,
        rqctx: RequestContext<I::Context>,
        input: I::Input,
        mut output: I::Output,
        pending: PendingResponse,
    ) -> Result<http::Response<Body>, HttpError> {
        enum First<T> {
            Head(Result<ResponseHead, oneshot::error::RecvError>),
            Done(Result<T, tokio::task::JoinError>),
        }

        let request_id = rqctx.request_id.clone();
        let method = rqctx.method.clone();
        let log = rqctx.log.clone();
        let interactor = Arc::clone(&self.interactor);
        let mut task = tokio::spawn(async move {
            let result = interactor.interact(&rqctx, input, &mut output).await;
            (result, output)
        });
        let mut head = pending.head;

        let first = tokio::select! {
            biased;
            h = &mut head => First::Head(h),
            d = &mut task => First::Done(d),
        };

        match first {
            First::Head(Ok(head)) => {
                // The status is out; a later failure can only be logged.
                tokio::spawn(async move {
                    match task.await {
                        Ok((Err(error), _)) => {
                            let error = error.into_http_error();
                            error!(log, "streaming response failed";
                                "error" => %error.internal_message);
                        }
                        Err(join_error) => {
                            error!(log, "streaming response panicked";
                                "error" => %join_error);
                        }
                        Ok((Ok(()), _)) => {}
                    }
                });
                Ok(streamed_response(head, &method, &request_id))
            }
            First::Head(Err(_)) => Err(HttpError::for_internal_error(
                "response writer went away without a response".to_string(),
            )),
            First::Done(Err(join_error)) => Err(HttpError::for_internal_error(
                format!("interactor panicked: {}", join_error),
            )),
            First::Done(Ok((Err(error), _))) => Err(error.into_http_error()),
            First::Done(Ok((Ok(()), output))) => {
                // Nothing was written; dropping the writer sends the head.
                drop(output);
                match head.await {
                    Ok(head) => {
                        Ok(streamed_response(head, &method, &request_id))
                    }
                    Err(_) => Err(HttpError::for_internal_error(
                        "streaming output has no response writer".to_string(),
                    )),
                }
            }
        }
    }
}

fn streamed_response(
    head: ResponseHead,
    method: &Method,
    request_id: &str,
) -> http::Response<Body> {
    let mut response = head.into_response(request_id);
    if *method == Method::HEAD {
        let body = std::mem::take(response.body_mut());
        tokio::spawn(body.discard());
    }
    response
}

#[async_trait]
impl<I: Interactor> RouteHandler<I::Context> for InteractorHandler<I> {
    fn decoder(&self) -> &RequestDecoder {
        &self.decoder
    }

    fn encoder(&self) -> &ResponseEncoder {
        &self.encoder
    }

    fn expected_errors(&self) -> Vec<ExpectedError> {
        I::expected_errors()
    }

    async fn handle_request(
        &self,
        rqctx: RequestContext<I::Context>,
        raw: RawRequest,
    ) -> Result<http::Response<Body>, HttpError> {
        let input: I::Input = self.decoder.decode(&raw)?;
        debug!(rqctx.log, "decoded request";
            "input" => self.decoder.field_map().type_name());

        let (mut output, pending) = self.encoder.make_output::<I::Output>();
        if let Some(pending) = pending {
            return self.stream(rqctx, input, output, pending).await;
        }

        self.interactor
            .interact(&rqctx, input, &mut output)
            .await
            .map_err(HandlerError::into_http_error)?;
        self.encoder.write_successful_response(
            output,
            &rqctx.method,
            &rqctx.request_id,
        )
    }
}
