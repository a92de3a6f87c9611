// Copyright 2025 Oxide Computer Company

//! Test cases for the generated OpenAPI document.

use async_trait::async_trait;
use http::Method;
use http::StatusCode;
use restbind::ApiDescription;
use restbind::ApiEndpoint;
use restbind::Bindings;
use restbind::DynamicInteractor;
use restbind::DynamicRecord;
use restbind::DynamicShape;
use restbind::ExpectedError;
use restbind::FileHeader;
use restbind::HttpError;
use restbind::Input;
use restbind::Interactor;
use restbind::Output;
use restbind::ParamLocation;
use restbind::RequestContext;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
struct Address {
    street: String,
    city: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CreateAccount {
    /// organization that owns the account
    org: String,
    #[serde(rename = "X-Request-Source")]
    source: Option<String>,
    session: String,
    name: String,
    address: Address,
}

impl Input for CreateAccount {
    fn bindings() -> Bindings {
        Bindings::new()
            .path("org")
            .header("X-Request-Source")
            .cookie("session")
    }
}

#[derive(Default, JsonSchema, Serialize)]
struct Account {
    #[serde(rename = "Location")]
    location: String,
    id: u64,
    address: Address,
}

impl Output for Account {
    fn bindings() -> Bindings {
        Bindings::new().header("Location")
    }

    fn success_status() -> StatusCode {
        StatusCode::CREATED
    }
}

struct AccountCreator;

#[async_trait]
impl Interactor for AccountCreator {
    type Context = ();
    type Input = CreateAccount;
    type Output = Account;
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        input: CreateAccount,
        output: &mut Account,
    ) -> Result<(), HttpError> {
        output.location = format!("/orgs/{}/accounts/1", input.org);
        output.id = 1;
        output.address = input.address;
        Ok(())
    }

    fn expected_errors() -> Vec<ExpectedError> {
        vec![ExpectedError::new(StatusCode::CONFLICT, "account exists")]
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DeleteAccount {
    org: String,
    id: u64,
}

impl Input for DeleteAccount {
    fn bindings() -> Bindings {
        Bindings::new().path("org").path("id")
    }
}

struct AccountDeleter;

#[async_trait]
impl Interactor for AccountDeleter {
    type Context = ();
    type Input = DeleteAccount;
    type Output = ();
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        _input: DeleteAccount,
        _output: &mut (),
    ) -> Result<(), HttpError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AvatarUpload {
    org: String,
    caption: Option<String>,
    avatar: FileHeader,
}

impl Input for AvatarUpload {
    fn bindings() -> Bindings {
        Bindings::new().path("org").form("caption").file("avatar")
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Rename {
    org: String,
    new_name: String,
}

impl Input for Rename {
    fn bindings() -> Bindings {
        Bindings::new().path("org").form("new_name")
    }
}

struct Ignore<I>(std::marker::PhantomData<I>);

#[async_trait]
impl<I: Input + Send + Sync + 'static> Interactor for Ignore<I> {
    type Context = ();
    type Input = I;
    type Output = ();
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        _input: I,
        _output: &mut (),
    ) -> Result<(), HttpError> {
        Ok(())
    }
}

fn ignore<I>() -> Ignore<I> {
    Ignore(std::marker::PhantomData)
}

fn accounts_api() -> ApiDescription<()> {
    let mut api = ApiDescription::new();
    api.register(
        ApiEndpoint::new(
            "account_create",
            Method::POST,
            "/orgs/{org}/accounts",
            AccountCreator,
        )
        .summary("create an account")
        .tag("accounts"),
    )
    .unwrap();
    api.register(
        ApiEndpoint::new(
            "account_delete",
            Method::DELETE,
            "/orgs/{org}/accounts/{id}",
            AccountDeleter,
        )
        .tag("accounts")
        .deprecated(true),
    )
    .unwrap();
    api.register(ApiEndpoint::new(
        "avatar_upload",
        Method::PUT,
        "/orgs/{org}/avatar",
        ignore::<AvatarUpload>(),
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "org_rename",
        Method::POST,
        "/orgs/{org}/rename",
        ignore::<Rename>(),
    ))
    .unwrap();
    api
}

fn parameter<'a>(operation: &'a Value, location: &str, name: &str) -> &'a Value {
    operation["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["in"] == location && p["name"] == name)
        .unwrap_or_else(|| panic!("no {} parameter named {}", location, name))
}

#[test]
fn test_openapi_parameters_and_body() {
    let json = accounts_api().openapi("accounts", "2.0.0").json().unwrap();
    let create = &json["paths"]["/orgs/{org}/accounts"]["post"];

    assert_eq!(create["operationId"], "account_create");
    assert_eq!(create["summary"], "create an account");
    assert_eq!(create["tags"][0], "accounts");
    assert_eq!(create["parameters"].as_array().unwrap().len(), 3);

    let org = parameter(create, "path", "org");
    assert_eq!(org["required"], true);
    assert_eq!(org["description"], "organization that owns the account");
    assert_eq!(org["schema"]["type"], "string");

    let source = parameter(create, "header", "X-Request-Source");
    assert_eq!(source["required"], false);
    let session = parameter(create, "cookie", "session");
    assert_eq!(session["required"], true);

    let body = &create["requestBody"];
    assert_eq!(body["required"], true);
    let schema = &body["content"]["application/json"]["schema"];
    assert_eq!(schema["type"], "object");
    assert_eq!(
        schema["properties"]["address"]["$ref"],
        "#/components/schemas/Address"
    );
    assert!(schema["properties"]["org"].is_null());
    assert!(schema["properties"]["session"].is_null());

    let address = &json["components"]["schemas"]["Address"];
    assert_eq!(address["type"], "object");
    assert_eq!(address["properties"]["city"]["type"], "string");
}

#[test]
fn test_openapi_responses() {
    let json = accounts_api().openapi("accounts", "2.0.0").json().unwrap();
    let create = &json["paths"]["/orgs/{org}/accounts"]["post"];

    let created = &create["responses"]["201"];
    assert_eq!(created["description"], "successful operation");
    assert_eq!(created["headers"]["Location"]["schema"]["type"], "string");
    let body = &created["content"]["application/json"]["schema"];
    assert!(body["properties"]["id"].is_object());
    assert!(body["properties"]["Location"].is_null());

    let conflict = &create["responses"]["409"];
    assert_eq!(conflict["description"], "account exists");
    assert_eq!(
        conflict["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/Error"
    );
    assert_eq!(
        create["responses"]["5XX"]["$ref"],
        "#/components/responses/Error"
    );

    let delete = &json["paths"]["/orgs/{org}/accounts/{id}"]["delete"];
    assert_eq!(delete["deprecated"], true);
    assert!(delete["requestBody"].is_null());
    let no_content = &delete["responses"]["204"];
    assert_eq!(no_content["description"], "successful operation");
    assert!(no_content["content"].is_null());
    assert_eq!(parameter(delete, "path", "id")["schema"]["type"], "integer");

    let error = &json["components"]["schemas"]["Error"];
    assert!(error["properties"]["msg"].is_object());
}

#[test]
fn test_openapi_form_bodies() {
    let json = accounts_api().openapi("accounts", "2.0.0").json().unwrap();

    let upload = &json["paths"]["/orgs/{org}/avatar"]["put"];
    let multipart =
        &upload["requestBody"]["content"]["multipart/form-data"]["schema"];
    assert_eq!(multipart["properties"]["avatar"]["type"], "string");
    assert_eq!(multipart["properties"]["avatar"]["format"], "binary");
    assert!(multipart["properties"]["caption"].is_object());
    assert_eq!(upload["requestBody"]["required"], true);

    let rename = &json["paths"]["/orgs/{org}/rename"]["post"];
    let form = &rename["requestBody"]["content"]
        ["application/x-www-form-urlencoded"]["schema"];
    assert_eq!(form["properties"]["new_name"]["type"], "string");
    assert_eq!(form["required"][0], "new_name");
}

#[test]
fn test_openapi_paths_sorted() {
    let json = accounts_api().openapi("accounts", "2.0.0").json().unwrap();
    let paths: Vec<&String> =
        json["paths"].as_object().unwrap().keys().collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(paths.len(), 4);
}

struct JobSubmitter;

#[async_trait]
impl DynamicInteractor for JobSubmitter {
    type Context = ();
    type Error = HttpError;

    async fn interact(
        &self,
        _rqctx: &RequestContext<()>,
        _input: DynamicRecord,
    ) -> Result<DynamicRecord, HttpError> {
        Ok(DynamicRecord::new())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Filter {
    name: String,
    #[serde(default)]
    exact: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Search {
    filter: Filter,
    #[serde(default)]
    size: u32,
}

impl Input for Search {
    fn bindings() -> Bindings {
        Bindings::new().whole_body("filter").query("size")
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Listing {
    tags: Vec<String>,
    ids: Vec<u32>,
    prefs: Vec<String>,
}

impl Input for Listing {
    fn bindings() -> Bindings {
        Bindings::new()
            .query("tags")
            .query("ids")
            .delimited("ids")
            .cookie("prefs")
    }
}

fn catalog_api() -> ApiDescription<()> {
    let mut api = ApiDescription::new();
    api.register(ApiEndpoint::dynamic(
        "job_submit",
        Method::POST,
        "/queues/{queue}/jobs",
        DynamicShape::new("JobRequest")
            .required_field("queue", json!("default"), ParamLocation::Path)
            .field("priority", json!(0), ParamLocation::Query)
            .field("x-dry-run", json!(false), ParamLocation::Header)
            .required_field("command", json!("echo"), ParamLocation::Body),
        DynamicShape::new("JobAccepted")
            .field("Location", json!("/jobs/1"), ParamLocation::Header)
            .field("id", json!(1), ParamLocation::Body),
        JobSubmitter,
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "catalog_search",
        Method::GET,
        "/catalog/search",
        ignore::<Search>(),
    ))
    .unwrap();
    api.register(ApiEndpoint::new(
        "catalog_list",
        Method::GET,
        "/catalog",
        ignore::<Listing>(),
    ))
    .unwrap();
    api
}

#[test]
fn test_openapi_dynamic_operation() {
    let json = catalog_api().openapi("catalog", "1.0.0").json().unwrap();
    let submit = &json["paths"]["/queues/{queue}/jobs"]["post"];
    assert_eq!(submit["operationId"], "job_submit");

    let queue = parameter(submit, "path", "queue");
    assert_eq!(queue["required"], true);
    assert_eq!(queue["schema"]["type"], "string");
    assert_eq!(
        parameter(submit, "query", "priority")["schema"]["type"],
        "integer"
    );
    assert_eq!(
        parameter(submit, "header", "X-Dry-Run")["schema"]["type"],
        "boolean"
    );

    let body = &submit["requestBody"]["content"]["application/json"]["schema"];
    assert_eq!(body["properties"]["command"]["type"], "string");
    assert_eq!(body["required"][0], "command");
    assert_eq!(submit["requestBody"]["required"], true);

    let accepted = &submit["responses"]["200"];
    assert_eq!(accepted["headers"]["Location"]["schema"]["type"], "string");
    let body = &accepted["content"]["application/json"]["schema"];
    assert_eq!(body["properties"]["id"]["type"], "integer");
    assert!(body["properties"]["Location"].is_null());
}

#[test]
fn test_openapi_whole_body_on_get() {
    let json = catalog_api().openapi("catalog", "1.0.0").json().unwrap();
    let search = &json["paths"]["/catalog/search"]["get"];

    let body = &search["requestBody"];
    assert_eq!(body["required"], true);
    assert_eq!(
        body["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/Filter"
    );
    assert_eq!(search["parameters"].as_array().unwrap().len(), 1);
    assert_eq!(parameter(search, "query", "size")["schema"]["type"], "integer");

    let filter = &json["components"]["schemas"]["Filter"];
    assert_eq!(filter["properties"]["name"]["type"], "string");
}

#[test]
fn test_openapi_array_parameters() {
    let json = catalog_api().openapi("catalog", "1.0.0").json().unwrap();
    let list = &json["paths"]["/catalog"]["get"];

    // An empty repeated array is sent as no keys at all.
    let tags = parameter(list, "query", "tags");
    assert_ne!(tags["required"], true);
    assert!(tags["explode"].is_null());
    assert_eq!(tags["schema"]["type"], "array");

    let ids = parameter(list, "query", "ids");
    assert_eq!(ids["required"], true);
    assert_eq!(ids["explode"], false);
    assert_eq!(ids["style"], "form");

    let prefs = parameter(list, "cookie", "prefs");
    assert_eq!(prefs["required"], true);
    assert_eq!(prefs["explode"], false);
}
