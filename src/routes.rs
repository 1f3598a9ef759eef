// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::CSV_MAX_UPLOAD_BYTES,
    handlers::{admin, auth, exam, import, profile},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, topics, tests, profile, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (database pool and configuration).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let learner_routes = Router::new()
        .route("/topics", get(admin::list_topics))
        .route("/tests", post(exam::create_test))
        .route("/tests/history", get(exam::list_history))
        .route("/tests/{id}", get(exam::get_test))
        .route("/tests/{id}/submit", post(exam::submit_test))
        .route("/tests/{id}/results", get(exam::get_results))
        .route("/profile/me", get(profile::get_me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/topics", get(admin::list_topics).post(admin::create_topic))
        .route("/topics/{id}/questions", get(admin::list_topic_questions))
        .route(
            "/topics/{id}/import",
            post(import::import_questions).layer(DefaultBodyLimit::max(CSV_MAX_UPLOAD_BYTES)),
        )
        .route("/questions", post(admin::create_question))
        .route("/questions/search", get(admin::search_questions))
        .route(
            "/questions/{id}",
            get(admin::get_question)
                .put(admin::update_question)
                .delete(admin::delete_question),
        )
        .route("/choices/{id}", delete(admin::delete_choice))
        // Auth first, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", learner_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
