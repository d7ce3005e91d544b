pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Auth routes
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/me", get(routes::auth::me));

    // Project routes
    let project_routes = Router::new()
        .route("/", get(routes::project::list))
        .route("/", post(routes::project::create))
        .route("/{project_id}", get(routes::project::get));

    // Member routes (under project)
    let member_routes = Router::new()
        .route("/", get(routes::project::members))
        .route("/", post(routes::project::add_member))
        .route(
            "/{user_id}/permission",
            put(routes::project::grant_permissions),
        );

    // Subtask routes (under project)
    let subtask_routes = Router::new()
        .route("/", get(routes::subtask::list))
        .route("/", post(routes::subtask::create))
        .route("/{subtask_id}", get(routes::subtask::get))
        .route("/{subtask_id}", put(routes::subtask::update));

    // Event routes (under project)
    let event_routes = Router::new()
        .route("/", get(routes::event::list))
        .route("/", post(routes::event::create))
        .route("/{event_id}", get(routes::event::get));

    // Scheduled-notification routes (under project)
    let notification_routes = Router::new()
        .route("/", get(routes::notification::list))
        .route("/subtask", post(routes::notification::schedule_subtask))
        .route("/event", post(routes::notification::schedule_event))
        .route("/{notification_id}", get(routes::notification::get))
        .route("/{notification_id}", put(routes::notification::reschedule))
        .route("/{notification_id}", delete(routes::notification::cancel));

    // Dispatch webhook (signature auth, POST only — axum answers 405 to the rest)
    let webhook_routes =
        Router::new().route("/dispatch", post(routes::webhook::dispatch_callback));

    // Compose API
    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/webhook", webhook_routes)
        .nest("/project", project_routes)
        .nest("/project/{project_id}/member", member_routes)
        .nest("/project/{project_id}/subtask", subtask_routes)
        .nest("/project/{project_id}/event", event_routes)
        .nest("/project/{project_id}/notification", notification_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
