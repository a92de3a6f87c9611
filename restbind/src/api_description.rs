// Copyright 2025 Oxide Computer Company

//! Describes the operations of an API: registration, routing of requests to
//! operations, and the OpenAPI document built from every operation's field
//! maps.

use crate::body::Body;
use crate::coerce::ArrayStyle;
use crate::config::ConfigBinding;
use crate::dynamic::DynamicInteractor;
use crate::dynamic::DynamicShape;
use crate::error::ErrorResponseBody;
use crate::error::HttpError;
use crate::field_map::FieldEntry;
use crate::field_map::FieldLocationMap;
use crate::handler::Interactor;
use crate::handler::ServerContext;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::CONTENT_TYPE_MULTIPART_FORM_DATA;
use crate::http_util::CONTENT_TYPE_URL_ENCODED;
use crate::location::ParamLocation;
use crate::operation::generate_request_id;
use crate::operation::Operation;
use crate::schema::body_doc_schema;
use crate::schema::form_doc_schema;
use crate::schema_util::j2oas_schema;
use crate::validator::SchemaError;
use http::Method;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use slog::Logger;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

type OperationBuilder<C> =
    Box<dyn FnOnce(&ConfigBinding) -> Result<Operation<C>, SchemaError> + Send>;

/// An operation waiting to be registered, with its documentation metadata.
pub struct ApiEndpoint<C: ServerContext> {
    operation_id: String,
    method: Method,
    path: String,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    deprecated: bool,
    build: OperationBuilder<C>,
}

impl<C: ServerContext> ApiEndpoint<C> {
    pub fn new<I>(
        operation_id: &str,
        method: Method,
        path: &str,
        interactor: I,
    ) -> ApiEndpoint<C>
    where
        I: Interactor<Context = C>,
    {
        let id = operation_id.to_string();
        let build_method = method.clone();
        let build_path = path.to_string();
        ApiEndpoint::with_builder(
            operation_id,
            method,
            path,
            Box::new(move |config| {
                Operation::new(
                    &id,
                    build_method,
                    &build_path,
                    interactor,
                    config,
                )
            }),
        )
    }

    /// An operation on dynamic records: `input_shape` is decoded from the
    /// request and `output_shape` written as the response.
    pub fn dynamic<D>(
        operation_id: &str,
        method: Method,
        path: &str,
        input_shape: DynamicShape,
        output_shape: DynamicShape,
        interactor: D,
    ) -> ApiEndpoint<C>
    where
        D: DynamicInteractor<Context = C>,
    {
        let id = operation_id.to_string();
        let build_method = method.clone();
        let build_path = path.to_string();
        ApiEndpoint::with_builder(
            operation_id,
            method,
            path,
            Box::new(move |config| {
                Operation::dynamic(
                    &id,
                    build_method,
                    &build_path,
                    &input_shape,
                    &output_shape,
                    interactor,
                    config,
                )
            }),
        )
    }

    fn with_builder(
        operation_id: &str,
        method: Method,
        path: &str,
        build: OperationBuilder<C>,
    ) -> ApiEndpoint<C> {
        ApiEndpoint {
            operation_id: operation_id.to_string(),
            method,
            path: path.to_string(),
            summary: None,
            description: None,
            tags: Vec::new(),
            deprecated: false,
            build,
        }
    }

    pub fn summary<T: ToString>(mut self, summary: T) -> Self {
        self.summary.replace(summary.to_string());
        self
    }

    pub fn description<T: ToString>(mut self, description: T) -> Self {
        self.description.replace(description.to_string());
        self
    }

    pub fn tag<T: ToString>(mut self, tag: T) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }
}

/// `PathSegment` represents a segment of a route's path: either a literal
/// string or a variable, written `{name}`.
#[derive(Debug, PartialEq)]
pub enum PathSegment {
    Literal(String),
    VarnameSegment(String),
}

impl PathSegment {
    /// Parses one segment of a route path.
    ///
    /// # Panics
    ///
    /// If the segment has unbalanced braces or an empty variable name.
    pub fn from(segment: &str) -> PathSegment {
        if segment.starts_with('{') || segment.ends_with('}') {
            assert!(
                segment.starts_with('{'),
                "HTTP URI path segment variable missing leading \"{{\""
            );
            assert!(
                segment.ends_with('}'),
                "HTTP URI path segment variable missing trailing \"}}\""
            );
            let var = &segment[1..segment.len() - 1];
            assert!(
                !var.is_empty(),
                "HTTP URI path segment variable name must not be empty",
            );
            PathSegment::VarnameSegment(var.to_string())
        } else {
            PathSegment::Literal(segment.to_string())
        }
    }
}

/// Splits a route path into its segments.  Route paths come from the
/// program, so problems are panics.  Paths must begin with "/" and only the
/// final segment may be empty.
pub fn route_path_to_segments(path: &str) -> Vec<&str> {
    if !path.starts_with('/') {
        panic!("route paths must begin with a '/': '{}'", path);
    }
    let mut ret = path.split('/').skip(1).collect::<Vec<_>>();
    for segment in &ret[..ret.len() - 1] {
        if segment.is_empty() {
            panic!("path segments may not be empty: '{}'", path);
        }
    }
    if ret[ret.len() - 1].is_empty() {
        ret.pop();
    }
    ret
}

/// Splits the path of a request into percent-decoded segments.
fn input_path_to_segments(path: &str) -> Result<Vec<String>, String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment {
            "." | ".." => Err("dot-segments are not permitted".to_string()),
            _ => Ok(percent_decode_str(segment)
                .decode_utf8()
                .map_err(|e| e.to_string())?
                .to_string()),
        })
        .collect()
}

struct Route<C: ServerContext> {
    segments: Vec<PathSegment>,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    deprecated: bool,
    operation: Operation<C>,
}

impl<C: ServerContext> Route<C> {
    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Literal(_)))
            .count()
    }

    /// Matches the request's segments, returning the variable values.
    fn matches(&self, input: &[String]) -> Option<BTreeMap<String, String>> {
        if input.len() != self.segments.len() {
            return None;
        }
        let mut variables = BTreeMap::new();
        for (segment, value) in self.segments.iter().zip(input) {
            match segment {
                PathSegment::Literal(literal) if literal == value => {}
                PathSegment::Literal(_) => return None,
                PathSegment::VarnameSegment(name) => {
                    variables.insert(name.clone(), value.clone());
                }
            }
        }
        Some(variables)
    }

    /// The path's shape with variable names erased; two routes with the same
    /// method and shape can't be told apart.
    fn shape(&self) -> Vec<Option<&str>> {
        self.segments
            .iter()
            .map(|s| match s {
                PathSegment::Literal(literal) => Some(literal.as_str()),
                PathSegment::VarnameSegment(_) => None,
            })
            .collect()
    }
}

/// The set of registered operations of an API.  It routes requests to them
/// and generates the API's OpenAPI document.
///
/// Registration takes `&mut self`, so it can't overlap with request handling
/// or document generation.
pub struct ApiDescription<C: ServerContext> {
    config: ConfigBinding,
    routes: Vec<Route<C>>,
}

impl<C: ServerContext> Default for ApiDescription<C> {
    fn default() -> Self {
        ApiDescription::new()
    }
}

impl<C: ServerContext> ApiDescription<C> {
    pub fn new() -> Self {
        ApiDescription::with_config(ConfigBinding::default())
    }

    /// Operations registered later are compiled with `config`.
    pub fn with_config(config: ConfigBinding) -> Self {
        ApiDescription { config, routes: Vec::new() }
    }

    pub fn config(&self) -> &ConfigBinding {
        &self.config
    }

    /// Register a new operation.
    ///
    /// # Panics
    ///
    /// If the route path is malformed, or the operation's input or output
    /// type has a configuration fault (see [`FieldLocationMap`]).
    pub fn register(&mut self, endpoint: ApiEndpoint<C>) -> Result<(), String> {
        if method_slot(&mut openapiv3::PathItem::default(), &endpoint.method)
            .is_none()
        {
            return Err(format!(
                "operation \"{}\": unsupported method {}",
                endpoint.operation_id, endpoint.method
            ));
        }

        let segments = route_path_to_segments(&endpoint.path)
            .into_iter()
            .map(PathSegment::from)
            .collect::<Vec<_>>();
        let operation = (endpoint.build)(&self.config).map_err(|error| {
            format!("operation \"{}\": {}", endpoint.operation_id, error)
        })?;

        let route = Route {
            segments,
            summary: endpoint.summary,
            description: endpoint.description,
            tags: endpoint.tags,
            deprecated: endpoint.deprecated,
            operation,
        };

        validate_path_parameters(&route)?;
        validate_named_parameters(&route)?;
        validate_body_parameters(&route)?;
        self.validate_unique(&route)?;

        self.routes.push(route);
        Ok(())
    }

    fn validate_unique(&self, route: &Route<C>) -> Result<(), String> {
        let shape = route.shape();
        let method = route.operation.method();
        match self
            .routes
            .iter()
            .find(|r| r.operation.method() == method && r.shape() == shape)
        {
            Some(existing) => Err(format!(
                "{} {} conflicts with operation \"{}\" ({} {})",
                method,
                route.operation.path(),
                existing.operation.operation_id(),
                existing.operation.method(),
                existing.operation.path(),
            )),
            None => Ok(()),
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation<C>> {
        self.routes.iter().map(|r| &r.operation)
    }

    /// Finds the operation for a request.  Routes with more literal segments
    /// win over routes with variables; a HEAD request falls back to GET.
    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<(&Operation<C>, BTreeMap<String, String>), HttpError> {
        let input = input_path_to_segments(path).map_err(|_| {
            HttpError::for_bad_request("invalid path encoding".to_string())
        })?;
        let candidates = self
            .routes
            .iter()
            .filter_map(|r| r.matches(&input).map(|vars| (r, vars)))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            return Err(HttpError::for_status(
                StatusCode::NOT_FOUND,
                "no route found (no path in router)".to_string(),
            ));
        }

        let best = |wanted: &Method| {
            candidates
                .iter()
                .filter(|(r, _)| r.operation.method() == wanted)
                .max_by_key(|(r, _)| r.literal_count())
        };
        let found = match best(method) {
            Some(found) => Some(found),
            None if *method == Method::HEAD => best(&Method::GET),
            None => None,
        };
        match found {
            Some(&(route, ref variables)) => {
                Ok((&route.operation, variables.clone()))
            }
            None => Err(HttpError::for_status(
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed".to_string(),
            )),
        }
    }

    /// Routes a request to its operation and runs it.
    pub async fn handle(
        &self,
        context: Arc<C>,
        request: http::Request<Body>,
        log: &Logger,
    ) -> http::Response<Body> {
        match self.lookup(request.method(), request.uri().path()) {
            Ok((operation, variables)) => {
                operation.handle(context, request, variables, log).await
            }
            Err(error) => {
                let request_id = generate_request_id();
                debug!(log, "no operation for request";
                    "req_id" => request_id.clone(),
                    "method" => request.method().as_str().to_string(),
                    "uri" => request.uri().to_string(),
                    "response_code" => error.status_code.as_str().to_string(),
                );
                error.into_response(&request_id)
            }
        }
    }

    /// Build the OpenAPI definition describing this API.  Returns an
    /// [`OpenApiDefinition`] which can be used to specify the contents of the
    /// definition and select an output format.
    ///
    /// The arguments to this function will be used for the mandatory `title`
    /// and `version` properties that the `Info` object in an OpenAPI
    /// definition must contain.
    pub fn openapi<S1, S2>(
        &self,
        title: S1,
        version: S2,
    ) -> OpenApiDefinition<'_, C>
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        OpenApiDefinition::new(self, title.as_ref(), version.as_ref())
    }

    fn gen_openapi(&self, info: openapiv3::Info) -> openapiv3::OpenAPI {
        let mut openapi = openapiv3::OpenAPI::default();

        openapi.openapi = "3.0.3".to_string();
        openapi.info = info;

        let settings = schemars::gen::SchemaSettings::openapi3();
        let mut generator = schemars::gen::SchemaGenerator::new(settings);
        let mut definitions = BTreeMap::new();

        let mut routes = self.routes.iter().collect::<Vec<_>>();
        routes.sort_by(|a, b| a.operation.path().cmp(b.operation.path()));

        for route in routes {
            let operation = &route.operation;
            let input_map = operation.input_map();
            let output_map = operation.output_map();
            definitions.extend(input_map.doc_definitions().clone());
            definitions.extend(output_map.doc_definitions().clone());

            let path = openapi
                .paths
                .paths
                .entry(operation.path().to_string())
                .or_insert(openapiv3::ReferenceOr::Item(
                    openapiv3::PathItem::default(),
                ));
            let pathitem = match path {
                openapiv3::ReferenceOr::Item(ref mut item) => item,
                openapiv3::ReferenceOr::Reference { .. } => continue,
            };
            let Some(slot) = method_slot(pathitem, operation.method()) else {
                continue;
            };

            let mut op = openapiv3::Operation::default();
            op.operation_id = Some(operation.operation_id().to_string());
            op.summary = route.summary.clone();
            op.description = route.description.clone();
            op.tags = route.tags.clone();
            op.deprecated = route.deprecated;

            op.parameters = input_map
                .entries()
                .iter()
                .filter_map(parameter_for)
                .map(openapiv3::ReferenceOr::Item)
                .collect();
            op.request_body =
                request_body_for(input_map).map(openapiv3::ReferenceOr::Item);

            let encoder = operation.handler().encoder();
            let mut content = indexmap::IndexMap::new();
            if !encoder.no_content() && *operation.method() != Method::HEAD {
                let schema = match body_doc_schema(output_map) {
                    Some(schema) => j2oas_schema(&schema),
                    None => any_schema(),
                };
                content.insert(
                    encoder.content_type().to_string(),
                    openapiv3::MediaType {
                        schema: Some(schema),
                        ..Default::default()
                    },
                );
            }
            let headers = output_map
                .entries_at(ParamLocation::Header)
                .map(|entry| {
                    (
                        entry.wire_name.clone(),
                        openapiv3::ReferenceOr::Item(openapiv3::Header {
                            description: entry.description.clone(),
                            style: openapiv3::HeaderStyle::Simple,
                            required: entry.required,
                            deprecated: None,
                            format: openapiv3::ParameterSchemaOrContent::Schema(
                                j2oas_schema(&entry.doc_schema),
                            ),
                            example: None,
                            examples: indexmap::IndexMap::new(),
                            extensions: indexmap::IndexMap::new(),
                        }),
                    )
                })
                .collect();
            op.responses.responses.insert(
                openapiv3::StatusCode::Code(encoder.success_status().as_u16()),
                openapiv3::ReferenceOr::Item(openapiv3::Response {
                    description: "successful operation".to_string(),
                    content,
                    headers,
                    ..Default::default()
                }),
            );

            for expected in operation.expected_errors() {
                let schema = expected.schema(&mut generator);
                let mut content = indexmap::IndexMap::new();
                content.insert(
                    CONTENT_TYPE_JSON.to_string(),
                    openapiv3::MediaType {
                        schema: Some(j2oas_schema(&schema)),
                        ..Default::default()
                    },
                );
                op.responses.responses.insert(
                    openapiv3::StatusCode::Code(expected.status.as_u16()),
                    openapiv3::ReferenceOr::Item(openapiv3::Response {
                        description: expected.description.clone(),
                        content,
                        ..Default::default()
                    }),
                );
            }

            // Any other 4xx and 5xx response uses the shared error response.
            let err_ref =
                openapiv3::ReferenceOr::ref_("#/components/responses/Error");
            op.responses
                .responses
                .insert(openapiv3::StatusCode::Range(4), err_ref.clone());
            op.responses
                .responses
                .insert(openapiv3::StatusCode::Range(5), err_ref);

            slot.replace(op);
        }

        let components = openapi
            .components
            .get_or_insert_with(openapiv3::Components::default);

        let mut content = indexmap::IndexMap::new();
        content.insert(
            CONTENT_TYPE_JSON.to_string(),
            openapiv3::MediaType {
                schema: Some(j2oas_schema(
                    &generator.subschema_for::<ErrorResponseBody>(),
                )),
                ..Default::default()
            },
        );
        components.responses.insert(
            "Error".to_string(),
            openapiv3::ReferenceOr::Item(openapiv3::Response {
                description: "Error".to_string(),
                content,
                ..Default::default()
            }),
        );

        let root_schema = generator.into_root_schema_for::<()>();
        for (name, schema) in
            root_schema.definitions.iter().chain(definitions.iter())
        {
            if !components.schemas.contains_key(name) {
                components.schemas.insert(name.clone(), j2oas_schema(schema));
            }
        }
        components.schemas.sort_keys();

        openapi
    }
}

/// Validate that the variables of the route's path are exactly the input's
/// path-bound fields.
fn validate_path_parameters<C: ServerContext>(
    route: &Route<C>,
) -> Result<(), String> {
    let mut path = BTreeSet::new();
    for segment in &route.segments {
        if let PathSegment::VarnameSegment(name) = segment {
            if !path.insert(name.clone()) {
                panic!(
                    "variable name \"{}\" is used more than once in '{}'",
                    name,
                    route.operation.path()
                );
            }
        }
    }
    let vars = route
        .operation
        .input_map()
        .entries_at(ParamLocation::Path)
        .map(|entry| entry.wire_name.clone())
        .collect::<BTreeSet<_>>();

    if path != vars {
        let pp = path.difference(&vars).cloned().collect::<Vec<_>>().join(",");
        let vv = vars.difference(&path).cloned().collect::<Vec<_>>().join(",");

        return match (pp.is_empty(), vv.is_empty()) {
            (false, true) => Err(format!(
                "{} ({})",
                "path parameters are not consumed", pp,
            )),
            (true, false) => Err(format!(
                "{} ({})",
                "specified parameters do not appear in the path", vv,
            )),
            _ => Err(format!(
                "{} ({}) and {} ({})",
                "path parameters are not consumed",
                pp,
                "specified parameters do not appear in the path",
                vv,
            )),
        };
    }

    Ok(())
}

/// Validate that no query parameter shares its name with a path variable.
fn validate_named_parameters<C: ServerContext>(
    route: &Route<C>,
) -> Result<(), String> {
    let map = route.operation.input_map();
    for entry in map.entries_at(ParamLocation::Query) {
        if map.entry(ParamLocation::Path, &entry.wire_name).is_some() {
            return Err(format!(
                "the parameter '{}' is specified for both query and path \
                 parameters",
                entry.wire_name
            ));
        }
    }
    Ok(())
}

/// Validate that the request body is read one way only.
fn validate_body_parameters<C: ServerContext>(
    route: &Route<C>,
) -> Result<(), String> {
    let map = route.operation.input_map();
    let form = map.has_location(ParamLocation::FormData)
        || map.has_location(ParamLocation::File);
    if form && map.has_location(ParamLocation::Body) {
        return Err(format!(
            "{} binds both body and form fields; the request body can only \
             be read once",
            map.type_name()
        ));
    }
    Ok(())
}

fn method_slot<'a>(
    pathitem: &'a mut openapiv3::PathItem,
    method: &Method,
) -> Option<&'a mut Option<openapiv3::Operation>> {
    match *method {
        Method::GET => Some(&mut pathitem.get),
        Method::PUT => Some(&mut pathitem.put),
        Method::POST => Some(&mut pathitem.post),
        Method::DELETE => Some(&mut pathitem.delete),
        Method::OPTIONS => Some(&mut pathitem.options),
        Method::HEAD => Some(&mut pathitem.head),
        Method::PATCH => Some(&mut pathitem.patch),
        Method::TRACE => Some(&mut pathitem.trace),
        _ => None,
    }
}

fn parameter_for(entry: &FieldEntry) -> Option<openapiv3::Parameter> {
    // Form style explodes arrays into repeated keys unless told otherwise.
    let explode = match entry.location {
        ParamLocation::Query | ParamLocation::Cookie
            if entry.shape.is_array()
                && entry.array_style == ArrayStyle::Delimited =>
        {
            Some(false)
        }
        _ => None,
    };
    let parameter_data = openapiv3::ParameterData {
        name: entry.wire_name.clone(),
        description: entry.description.clone(),
        // A client may leave out an empty repeated array.
        required: entry.required && !entry.absent_means_empty(),
        deprecated: None,
        format: openapiv3::ParameterSchemaOrContent::Schema(j2oas_schema(
            &entry.doc_schema,
        )),
        example: None,
        examples: indexmap::IndexMap::new(),
        extensions: indexmap::IndexMap::new(),
        explode,
    };
    match entry.location {
        ParamLocation::Path => Some(openapiv3::Parameter::Path {
            parameter_data,
            style: openapiv3::PathStyle::Simple,
        }),
        ParamLocation::Query => Some(openapiv3::Parameter::Query {
            parameter_data,
            allow_reserved: false,
            style: openapiv3::QueryStyle::Form,
            allow_empty_value: None,
        }),
        ParamLocation::Header => Some(openapiv3::Parameter::Header {
            parameter_data,
            style: openapiv3::HeaderStyle::Simple,
        }),
        ParamLocation::Cookie => Some(openapiv3::Parameter::Cookie {
            parameter_data,
            style: openapiv3::CookieStyle::Form,
        }),
        ParamLocation::FormData | ParamLocation::File | ParamLocation::Body => {
            None
        }
    }
}

fn request_body_for(map: &FieldLocationMap) -> Option<openapiv3::RequestBody> {
    let (media_type, schema, locations): (_, _, &[ParamLocation]) =
        if let Some(schema) = body_doc_schema(map) {
            (CONTENT_TYPE_JSON, schema, &[ParamLocation::Body])
        } else if let Some(schema) = form_doc_schema(map) {
            let media_type = if map.has_location(ParamLocation::File) {
                CONTENT_TYPE_MULTIPART_FORM_DATA
            } else {
                CONTENT_TYPE_URL_ENCODED
            };
            (
                media_type,
                schema,
                &[ParamLocation::FormData, ParamLocation::File],
            )
        } else {
            return None;
        };

    let mut content = indexmap::IndexMap::new();
    content.insert(
        media_type.to_string(),
        openapiv3::MediaType {
            schema: Some(j2oas_schema(&schema)),
            ..Default::default()
        },
    );
    Some(openapiv3::RequestBody {
        content,
        required: map
            .entries()
            .iter()
            .any(|e| locations.contains(&e.location) && e.required),
        ..Default::default()
    })
}

/// The permissive, "match anything" schema, for bodies written by streaming
/// outputs.
fn any_schema() -> openapiv3::ReferenceOr<openapiv3::Schema> {
    openapiv3::ReferenceOr::Item(openapiv3::Schema {
        schema_data: openapiv3::SchemaData::default(),
        schema_kind: openapiv3::SchemaKind::Any(
            openapiv3::AnySchema::default(),
        ),
    })
}

/// Info metadata for the OpenAPI document of an [`ApiDescription`], and the
/// way to render it.  Made by [`ApiDescription::openapi`].
pub struct OpenApiDefinition<'a, C: ServerContext> {
    api: &'a ApiDescription<C>,
    info: openapiv3::Info,
}

impl<'a, C: ServerContext> OpenApiDefinition<'a, C> {
    fn new(
        api: &'a ApiDescription<C>,
        title: &str,
        version: &str,
    ) -> OpenApiDefinition<'a, C> {
        let info = openapiv3::Info {
            title: title.to_owned(),
            version: version.to_owned(),
            ..Default::default()
        };
        OpenApiDefinition { api, info }
    }

    /// CommonMark text describing the API as a whole.
    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.info.description = Some(text.into());
        self
    }

    pub fn terms_of_service(&mut self, url: impl Into<String>) -> &mut Self {
        self.info.terms_of_service = Some(url.into());
        self
    }

    /// Who answers for the API.  Empty arguments are left out of the
    /// document.
    pub fn contact(&mut self, name: &str, url: &str, email: &str) -> &mut Self {
        let given =
            |value: &str| Some(value.to_owned()).filter(|v| !v.is_empty());
        self.info.contact = Some(openapiv3::Contact {
            name: given(name),
            url: given(url),
            email: given(email),
            ..Default::default()
        });
        self
    }

    /// License of the API, with a link to its text if there is one.
    pub fn license(
        &mut self,
        name: impl Into<String>,
        url: Option<&str>,
    ) -> &mut Self {
        self.info.license = Some(openapiv3::License {
            name: name.into(),
            url: url.map(str::to_owned),
            ..Default::default()
        });
        self
    }

    /// The document itself.
    pub fn document(&self) -> openapiv3::OpenAPI {
        self.api.gen_openapi(self.info.clone())
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.document())
    }

    /// Writes the document to `out` as indented JSON ending in a newline.
    pub fn write<W: std::io::Write>(
        &self,
        mut out: W,
    ) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(&mut out, &self.document())?;
        out.write_all(b"\n").map_err(serde_json::Error::io)
    }
}
