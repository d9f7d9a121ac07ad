//! OpenAPI documentation and schema generation
//!
//! The url-dl REST API described with utoipa at compile time.

use utoipa::OpenApi;

/// OpenAPI documentation for the url-dl REST API
///
/// Served at `/openapi.json`, and through Swagger UI at `/swagger-ui` when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "url-dl REST API",
        version = "0.1.0",
        description = "Submit batches of URLs as download tasks and poll them until every download settles",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Tasks
        crate::api::routes::create_task,
        crate::api::routes::get_task,
        crate::api::routes::list_tasks,

        // System
        crate::api::routes::health_check,
        crate::api::routes::stats,
        crate::api::routes::metrics,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::ItemStatus,
        crate::types::TaskStats,
        crate::types::Event,

        crate::api::routes::CreateTaskRequest,
        crate::api::routes::CreateTaskResponse,
        crate::api::routes::TaskResponse,
        crate::api::routes::DownloadView,
        crate::api::routes::StatsResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Download tasks - Submit URL batches and track their progress"),
        (name = "system", description = "System endpoints - Health, statistics, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_task_routes() {
        let spec = ApiDoc::openapi();

        assert!(spec.paths.paths.contains_key("/tasks"));
        assert!(spec.paths.paths.contains_key("/tasks/{id}"));
        assert!(spec.paths.paths.contains_key("/health"));
        assert!(spec.paths.paths.contains_key("/metrics"));
        assert!(spec.paths.paths.contains_key("/events"));
    }

    #[test]
    fn spec_has_response_schemas() {
        let components = ApiDoc::openapi().components.unwrap();

        assert!(components.schemas.contains_key("TaskResponse"));
        assert!(components.schemas.contains_key("ApiError"));
    }

    #[test]
    fn spec_has_tags() {
        let tags = ApiDoc::openapi().tags.unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["tasks", "system"]);
    }

    #[test]
    fn spec_info() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "url-dl REST API");
        assert!(spec.info.description.is_some());
    }
}
