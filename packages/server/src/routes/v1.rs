use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers::{dlq, resource};
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(resource_routes())
        .merge(dlq_routes())
}

fn resource_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(resource::create_resource))
        .routes(routes!(resource::submit_resource))
        .routes(routes!(resource::get_resource_content))
        .routes(routes!(resource::preview_resource))
}

fn dlq_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(dlq::list_dlq_messages))
        .routes(routes!(dlq::get_dlq_stats))
        .routes(routes!(dlq::get_dlq_message, dlq::delete_dlq_message))
        .routes(routes!(dlq::retry_dlq_message))
}
