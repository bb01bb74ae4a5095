//! HTTP endpoints.
//!
//! Resources are addressed generically: `<root>/<resource>[/<id>[/<sub>[/<child id>]]]`. Updates
//! are `POST`s to an existing id, as clients of the original web services expect.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use api_shared::{ErrorBody, ErrorEnvelope, HealthRes, HealthService, Link, SearchResult};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use emr_core::{schema, ResourceInfo, ResourceRegistry, RestError};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type QueryPairs = Query<Vec<(String, String)>>;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        catalogue,
        list_resource,
        create_resource,
        retrieve_resource,
        update_resource,
        delete_resource,
        list_children,
        create_child,
        retrieve_child,
        update_child,
        delete_child,
    ),
    components(schemas(HealthRes, SearchResult, Link, ErrorEnvelope, ErrorBody))
)]
pub struct ApiDoc;

/// The OpenAPI document: the endpoints above plus one model per resource and representation.
pub fn openapi(registry: &ResourceRegistry) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    schema::merge_into(&mut doc, registry);
    doc
}

/// Builds the application router around `state`.
pub fn router(state: AppState) -> Router {
    let root = state.config.rest_root();
    let doc = openapi(&state.registry);
    tracing::debug!("mounting resources under {}", root);

    Router::new()
        .route("/health", get(health))
        .route(&root, get(catalogue))
        .route(
            &format!("{root}/:resource"),
            get(list_resource).post(create_resource),
        )
        .route(
            &format!("{root}/:resource/:id"),
            get(retrieve_resource)
                .post(update_resource)
                .delete(delete_resource),
        )
        .route(
            &format!("{root}/:resource/:id/:sub"),
            get(list_children).post(create_child),
        )
        .route(
            &format!("{root}/:resource/:id/:sub/:child"),
            get(retrieve_child).post(update_child).delete(delete_child),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError(RestError::IllegalRequest(format!(
            "request body is not valid JSON: {e}"
        )))
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint, used for monitoring and load balancer checks.
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/ws/rest/v1",
    responses(
        (status = 200, description = "Registered resources with their versions and sub-resources")
    )
)]
async fn catalogue(State(state): State<AppState>) -> Json<Vec<ResourceInfo>> {
    Json(state.registry.resource_infos())
}

#[utoipa::path(
    get,
    path = "/ws/rest/v1/{resource}",
    params(("resource" = String, Path, description = "Resource name, e.g. `patient`")),
    responses(
        (status = 200, description = "One page of results", body = SearchResult),
        (status = 400, description = "Bad search parameters", body = ErrorEnvelope),
        (status = 404, description = "Unknown resource", body = ErrorEnvelope),
        (status = 405, description = "Resource cannot be listed or searched", body = ErrorEnvelope)
    )
)]
/// Lists a resource, or searches it when the query carries search parameters.
async fn list_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): QueryPairs,
) -> ApiResult<Json<SearchResult>> {
    let ctx = state.context(query)?;
    let result = state.registry.resource(&resource)?.list(&ctx)?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/ws/rest/v1/{resource}",
    params(("resource" = String, Path, description = "Resource name")),
    responses(
        (status = 201, description = "Created; the new object in the requested representation"),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 405, description = "Resource cannot be created", body = ErrorEnvelope)
    )
)]
async fn create_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(query): QueryPairs,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let ctx = state.context(query)?;
    let body = parse_body(&body)?;
    let created = state.registry.resource(&resource)?.create(&body, &ctx)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/ws/rest/v1/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Uuid, or a name for resources that allow it")
    ),
    responses(
        (status = 200, description = "The object in the requested representation"),
        (status = 400, description = "Unsupported representation", body = ErrorEnvelope),
        (status = 404, description = "Not found", body = ErrorEnvelope)
    )
)]
async fn retrieve_resource(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = state.context(query)?;
    let found = state.registry.resource(&resource)?.retrieve(&id, &ctx)?;
    Ok(Json(found))
}

#[utoipa::path(
    post,
    path = "/ws/rest/v1/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Uuid of the object to update")
    ),
    responses(
        (status = 200, description = "The updated object"),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 404, description = "Not found", body = ErrorEnvelope)
    )
)]
async fn update_resource(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): QueryPairs,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let ctx = state.context(query)?;
    let body = parse_body(&body)?;
    let updated = state.registry.resource(&resource)?.update(&id, &body, &ctx)?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/ws/rest/v1/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Resource name"),
        ("id" = String, Path, description = "Uuid of the object to delete")
    ),
    responses(
        (status = 204, description = "Voided, retired, or purged with `purge=true`"),
        (status = 404, description = "Not found", body = ErrorEnvelope),
        (status = 405, description = "Resource cannot be deleted", body = ErrorEnvelope)
    )
)]
async fn delete_resource(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): QueryPairs,
) -> ApiResult<StatusCode> {
    let ctx = state.context(query)?;
    state.registry.resource(&resource)?.delete(&id, &ctx)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/ws/rest/v1/{resource}/{id}/{sub}",
    params(
        ("resource" = String, Path, description = "Parent resource name"),
        ("id" = String, Path, description = "Parent uuid"),
        ("sub" = String, Path, description = "Sub-resource path, e.g. `name`")
    ),
    responses(
        (status = 200, description = "The parent's children", body = SearchResult),
        (status = 404, description = "Unknown parent or sub-resource", body = ErrorEnvelope)
    )
)]
async fn list_children(
    State(state): State<AppState>,
    Path((resource, id, sub)): Path<(String, String, String)>,
    Query(query): QueryPairs,
) -> ApiResult<Json<SearchResult>> {
    let ctx = state.context(query)?;
    let result = state.registry.sub_resource(&resource, &sub)?.list(&id, &ctx)?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/ws/rest/v1/{resource}/{id}/{sub}",
    params(
        ("resource" = String, Path, description = "Parent resource name"),
        ("id" = String, Path, description = "Parent uuid"),
        ("sub" = String, Path, description = "Sub-resource path")
    ),
    responses(
        (status = 201, description = "Created child"),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 404, description = "Unknown parent or sub-resource", body = ErrorEnvelope)
    )
)]
async fn create_child(
    State(state): State<AppState>,
    Path((resource, id, sub)): Path<(String, String, String)>,
    Query(query): QueryPairs,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let ctx = state.context(query)?;
    let body = parse_body(&body)?;
    let created = state
        .registry
        .sub_resource(&resource, &sub)?
        .create(&id, &body, &ctx)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/ws/rest/v1/{resource}/{id}/{sub}/{child}",
    params(
        ("resource" = String, Path, description = "Parent resource name"),
        ("id" = String, Path, description = "Parent uuid"),
        ("sub" = String, Path, description = "Sub-resource path"),
        ("child" = String, Path, description = "Child uuid")
    ),
    responses(
        (status = 200, description = "The child"),
        (status = 404, description = "Not found", body = ErrorEnvelope)
    )
)]
async fn retrieve_child(
    State(state): State<AppState>,
    Path((resource, id, sub, child)): Path<(String, String, String, String)>,
    Query(query): QueryPairs,
) -> ApiResult<Json<Value>> {
    let ctx = state.context(query)?;
    let found = state
        .registry
        .sub_resource(&resource, &sub)?
        .retrieve(&id, &child, &ctx)?;
    Ok(Json(found))
}

#[utoipa::path(
    post,
    path = "/ws/rest/v1/{resource}/{id}/{sub}/{child}",
    params(
        ("resource" = String, Path, description = "Parent resource name"),
        ("id" = String, Path, description = "Parent uuid"),
        ("sub" = String, Path, description = "Sub-resource path"),
        ("child" = String, Path, description = "Child uuid")
    ),
    responses(
        (status = 200, description = "The updated child"),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 404, description = "Not found", body = ErrorEnvelope)
    )
)]
async fn update_child(
    State(state): State<AppState>,
    Path((resource, id, sub, child)): Path<(String, String, String, String)>,
    Query(query): QueryPairs,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let ctx = state.context(query)?;
    let body = parse_body(&body)?;
    let updated = state
        .registry
        .sub_resource(&resource, &sub)?
        .update(&id, &child, &body, &ctx)?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/ws/rest/v1/{resource}/{id}/{sub}/{child}",
    params(
        ("resource" = String, Path, description = "Parent resource name"),
        ("id" = String, Path, description = "Parent uuid"),
        ("sub" = String, Path, description = "Sub-resource path"),
        ("child" = String, Path, description = "Child uuid")
    ),
    responses(
        (status = 204, description = "Voided, or purged with `purge=true`"),
        (status = 404, description = "Not found", body = ErrorEnvelope),
        (status = 405, description = "Children cannot be deleted this way", body = ErrorEnvelope)
    )
)]
async fn delete_child(
    State(state): State<AppState>,
    Path((resource, id, sub, child)): Path<(String, String, String, String)>,
    Query(query): QueryPairs,
) -> ApiResult<StatusCode> {
    let ctx = state.context(query)?;
    state
        .registry
        .sub_resource(&resource, &sub)?
        .delete(&id, &child, &ctx)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use emr_core::RestConfig;
    use emr_domain::{InMemoryEmr, Seed, Services};
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SEED: &str = r#"
locations:
  - uuid: 9356400c-a5a2-4532-8f2b-2361b3446eb8
    name: Xanadu
    tags: [Login Location]
    city_village: Kubla
persons:
  - uuid: ba1b19c2-3ed6-4f63-b8c0-f762dc8d7562
    gender: F
    names:
      - uuid: 399e3a7b-6482-487d-94ce-c07bb3ca3cc7
        given_name: Collet
        family_name: Chebaskwony
        preferred: true
"#;

    fn app() -> Router {
        let seed = Seed::from_yaml_str(SEED).expect("test seed should parse");
        let store = InMemoryEmr::from_seed(seed).expect("test seed should load");
        let services = Services::from_provider(Arc::new(store));
        router(AppState::new(services, RestConfig::default()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_retrieve_by_name_and_custom_representation() {
        let app = app();
        let (status, body) = send(&app, "GET", "/ws/rest/v1/location/Xanadu", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display"], "Xanadu");
        assert_eq!(body["resourceVersion"], "1.8");

        let (status, body) = send(
            &app,
            "GET",
            "/ws/rest/v1/location/Xanadu?v=custom:(uuid,cityVillage)",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "uuid": "9356400c-a5a2-4532-8f2b-2361b3446eb8", "cityVillage": "Kubla" })
        );
    }

    #[tokio::test]
    async fn test_missing_object_is_404_with_envelope() {
        let (status, body) = send(&app(), "GET", "/ws/rest/v1/location/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "object_not_found");

        let (status, _) = send(&app(), "GET", "/ws/rest/v1/spaceship", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_then_search() {
        let app = app();
        let (status, created) = send(
            &app,
            "POST",
            "/ws/rest/v1/location",
            Some(json!({ "name": "Outpatient Clinic" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "Outpatient Clinic");

        let (status, found) = send(&app, "GET", "/ws/rest/v1/location?q=clinic", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["results"].as_array().map(Vec::len), Some(1));
        assert_eq!(found["results"][0]["display"], "Outpatient Clinic");
    }

    #[tokio::test]
    async fn test_update_is_a_post_to_the_id() {
        let app = app();
        let (status, updated) = send(
            &app,
            "POST",
            "/ws/rest/v1/location/9356400c-a5a2-4532-8f2b-2361b3446eb8",
            Some(json!({ "description": "Summer capital" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "Summer capital");
    }

    #[tokio::test]
    async fn test_unsupported_operation_is_405() {
        let (status, body) = send(&app(), "DELETE", "/ws/rest/v1/conceptdatatype/numeric", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["code"], "operation_not_supported");
    }

    #[tokio::test]
    async fn test_invalid_payloads_are_400() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/ws/rest/v1/location")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request should build");
        let response = app.clone().oneshot(request).await.expect("router should respond");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/ws/rest/v1/location", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "conversion");
    }

    #[tokio::test]
    async fn test_paging_links() {
        let (status, body) =
            send(&app(), "GET", "/ws/rest/v1/conceptdatatype?limit=3&totalCount=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["totalCount"], 10);
        assert_eq!(body["links"][0]["rel"], "next");
    }

    #[tokio::test]
    async fn test_sub_resources() {
        let app = app();
        let person = "ba1b19c2-3ed6-4f63-b8c0-f762dc8d7562";
        let (status, names) = send(&app, "GET", &format!("/ws/rest/v1/person/{person}/name"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names["results"].as_array().map(Vec::len), Some(1));

        let (status, created) = send(
            &app,
            "POST",
            &format!("/ws/rest/v1/person/{person}/name"),
            Some(json!({ "givenName": "Colette", "familyName": "Chebaskwony" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let name = created["uuid"].as_str().expect("new name has a uuid");

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/ws/rest/v1/person/{person}/name/{name}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", "/ws/rest/v1/person/nobody/name", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_catalogue_and_openapi() {
        let app = app();
        let (status, catalogue) = send(&app, "GET", "/ws/rest/v1", None).await;
        assert_eq!(status, StatusCode::OK);
        let patient = catalogue
            .as_array()
            .and_then(|all| all.iter().find(|r| r["name"] == "patient"))
            .expect("patient is registered");
        assert_eq!(patient["subResources"], json!(["allergy", "identifier"]));

        let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        let schemas = &doc["components"]["schemas"];
        assert!(schemas.get("PatientGet").is_some(), "PatientGet model");
        assert!(schemas.get("PatientCreate").is_some(), "PatientCreate model");
        assert!(schemas.get("SearchResult").is_some(), "shared schema");
    }
}
