//! Versioned route organization plus module gating.

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use parcelwatch_core::analyzer::llm;
use parcelwatch_core::providers::{mail_global, mail_user};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::handlers::{
    accounts, auth, global_mail, modules, notifications, orders, queue, settings, system, users,
};
use crate::state::AppState;

/// Routes of a module's surface return 403 while the module is disabled.
async fn gate(state: AppState, key: &'static str, request: Request, next: Next) -> Response {
    match state.repos.modules.get(key).await {
        Ok(Some(record)) if record.enabled => next.run(request).await,
        Ok(_) => AppError::forbidden(format!("module {key} is disabled")).into_response(),
        Err(e) => AppError::internal(e.to_string()).into_response(),
    }
}

async fn gate_mail_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(state, mail_user::MODULE_KEY, request, next).await
}

async fn gate_mail_global(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(state, mail_global::MODULE_KEY, request, next).await
}

async fn gate_llm(State(state): State<AppState>, request: Request, next: Next) -> Response {
    gate(state, llm::MODULE_KEY, request, next).await
}

fn account_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/accounts", get(accounts::list_mailboxes).post(accounts::create_mailbox))
        .route("/accounts/test", post(accounts::test_connection))
        .route(
            "/accounts/{id}",
            patch(accounts::update_mailbox).delete(accounts::delete_mailbox),
        )
        .route(
            "/accounts/{id}/folders",
            get(accounts::list_folders).post(accounts::create_folder),
        )
        .route(
            "/accounts/{id}/available-folders",
            get(accounts::available_folders),
        )
        .route(
            "/accounts/{id}/folders/{folder_id}",
            delete(accounts::delete_folder),
        )
        .route(
            "/accounts/{id}/folders/{folder_id}/scan",
            post(accounts::scan_folder),
        )
        .layer(middleware::from_fn_with_state(state, gate_mail_user))
}

fn global_mail_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/global-mail",
            get(global_mail::get_global)
                .put(global_mail::upsert_global)
                .delete(global_mail::delete_global),
        )
        .route(
            "/sender-addresses",
            get(global_mail::list_bindings).post(global_mail::create_binding),
        )
        .route("/sender-addresses/{id}", delete(global_mail::delete_binding))
        .layer(middleware::from_fn_with_state(state, gate_mail_global))
}

fn llm_settings_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/settings/llm",
            get(settings::get_llm_config).put(settings::update_llm_config),
        )
        .layer(middleware::from_fn_with_state(state, gate_llm))
}

pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/users/me", get(users::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", delete(users::delete_user))
        .route(
            "/orders",
            get(orders::list_orders),
        )
        .route("/orders/counts", get(orders::order_counts))
        .route(
            "/orders/{id}",
            get(orders::get_order)
                .patch(orders::update_order)
                .delete(orders::delete_order),
        )
        .route("/orders/{id}/link", post(orders::link_order))
        .route("/queue", get(queue::list_queue))
        .route("/queue/{id}/retry", post(queue::retry_item))
        .route(
            "/notifications",
            get(notifications::list_configs).put(notifications::upsert_config),
        )
        .route("/modules", get(modules::list_modules))
        .route("/modules/{key}", patch(modules::update_module))
        .route(
            "/settings/imap",
            get(settings::get_imap_settings).put(settings::update_imap_settings),
        )
        .route(
            "/settings/queue",
            get(settings::get_queue_settings).put(settings::update_queue_settings),
        )
        .route("/system/status", get(system::system_status))
        .merge(account_routes(state.clone()))
        .merge(global_mail_routes(state.clone()))
        .merge(llm_settings_routes(state))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/api/v1", create_api_router(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
