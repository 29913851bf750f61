//! Order ledger API: listing, detail with state history, manual edits,
//! linking, and deletion.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use parcelwatch_core::orders::link_orders;
use parcelwatch_model::{Order, OrderId, OrderState, OrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    25
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub items: Vec<Order>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub async fn list_orders(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<OrderListResponse>> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 200);

    let items = state
        .repos
        .orders
        .list_for_user(user.id, per_page, (page - 1) * per_page)
        .await?;
    let total = state.repos.orders.count_for_user(user.id).await?;

    Ok(Json(OrderListResponse {
        items,
        total,
        page,
        per_page,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrderCountsResponse {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

pub async fn order_counts(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Json<OrderCountsResponse>> {
    let by_status: Vec<StatusCount> = state
        .repos
        .orders
        .counts_by_status(user.id)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    let total = by_status.iter().map(|entry| entry.count).sum();

    Ok(Json(OrderCountsResponse { total, by_status }))
}

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: Order,
    pub states: Vec<OrderState>,
}

pub async fn get_order(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderDetailResponse>> {
    let order = state
        .repos
        .orders
        .get(user.id, OrderId(id))
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))?;
    let states = state.repos.orders.states_for(order.id).await?;

    Ok(Json(OrderDetailResponse { order, states }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub order_number: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub vendor_name: Option<String>,
    pub status: Option<OrderStatus>,
    pub estimated_delivery: Option<chrono::NaiveDate>,
}

pub async fn update_order(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> AppResult<Json<Order>> {
    let mut order = state
        .repos
        .orders
        .get(user.id, OrderId(id))
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))?;

    let old_status = order.status;
    if let Some(order_number) = request.order_number {
        order.order_number = Some(order_number);
    }
    if let Some(tracking_number) = request.tracking_number {
        order.tracking_number = Some(tracking_number);
    }
    if let Some(carrier) = request.carrier {
        order.carrier = Some(carrier);
    }
    if let Some(vendor_name) = request.vendor_name {
        order.vendor_name = Some(vendor_name);
    }
    if let Some(status) = request.status {
        order.status = status;
    }
    if let Some(estimated) = request.estimated_delivery {
        order.estimated_delivery = Some(estimated);
    }
    order.updated_at = Utc::now();

    let audit = (order.status != old_status).then(|| OrderState {
        id: Uuid::now_v7(),
        order_id: order.id,
        status: order.status,
        source_type: Some("manual".into()),
        source_info: Some(user.username.clone()),
        created_at: Utc::now(),
    });
    state
        .repos
        .orders
        .update_with_state(&order, audit.as_ref())
        .await?;

    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct LinkOrderRequest {
    pub target_order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LinkOrderResponse {
    pub merged_into: OrderId,
}

pub async fn link_order(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LinkOrderRequest>,
) -> AppResult<Json<LinkOrderResponse>> {
    let merged = link_orders(
        &state.repos.orders,
        user.id,
        OrderId(id),
        OrderId(request.target_order_id),
    )
    .await?;

    Ok(Json(LinkOrderResponse {
        merged_into: merged.id,
    }))
}

pub async fn delete_order(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repos.orders.delete(user.id, OrderId(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("order not found"))
    }
}
