// Handlers for the back-office API; every route requires an administrator

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::{
    admin::{BackOffice, VehicleDraft},
    auth_middleware::AdminUser,
    error::AppError,
    models::{blank_as_none, FilterState, NewUser, OrderStatus, Role},
};

// --- Response Wrappers ---

#[derive(Serialize)]
struct GenericResponse {
    success: bool,
    message: Option<String>,
    id: Option<String>,
}

impl GenericResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(GenericResponse { success: true, message: Some(message.into()), id: None })
    }
}

// --- Request Structs ---

#[derive(Deserialize, Debug)]
pub struct OrdersQuery {
    status: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub struct StatusUpdate {
    status: String,
}

#[derive(Deserialize, Debug)]
pub struct RoleUpdate {
    role: Role,
}

fn parse_status(raw: &str) -> Result<OrderStatus, AppError> {
    raw.parse::<OrderStatus>().map_err(AppError::BadRequest)
}

// --- Inventory ---

pub async fn list_inventory(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Query(filters): Query<FilterState>,
) -> Result<impl IntoResponse, AppError> {
    let filters = filters.normalized();
    tracing::info!("[HANDLER] /api/admin/vehicles - Requested by {} with filters: {:?}", admin.user_id, filters);
    let vehicles = back_office.inventory(&filters).await?;
    Ok(Json(vehicles))
}

pub async fn create_vehicle(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    JsonExtract(draft): JsonExtract<VehicleDraft>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] POST /api/admin/vehicles - Requested by {}", admin.user_id);
    let record = draft.validate()?;
    let created = back_office.create_vehicle(record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_vehicle(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Path(id): Path<String>,
    JsonExtract(draft): JsonExtract<VehicleDraft>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] PUT /api/admin/vehicles/{} - Requested by {}", id, admin.user_id);
    let record = draft.validate()?;
    back_office.update_vehicle(&id, record).await?;
    Ok(GenericResponse::ok("Car updated successfully"))
}

pub async fn delete_vehicle(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] DELETE /api/admin/vehicles/{} - Requested by {}", id, admin.user_id);
    back_office.delete_vehicle(&id).await?;
    Ok(GenericResponse::ok("Car deleted successfully"))
}

// --- Orders ---

pub async fn list_orders(
    AdminUser(_admin): AdminUser,
    State(back_office): State<BackOffice>,
    Query(query): Query<OrdersQuery>,
) -> Result<impl IntoResponse, AppError> {
    // "all" or no value lists every order
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(parse_status(raw)?),
    };
    tracing::info!("[HANDLER] /api/admin/orders - status filter: {:?}, limit: {:?}", status, query.limit);
    let orders = back_office.orders(status, query.limit).await?;
    Ok(Json(orders))
}

pub async fn update_order_status(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Path(id): Path<String>,
    JsonExtract(update): JsonExtract<StatusUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let status = parse_status(&update.status)?;
    tracing::info!("[HANDLER] /api/admin/orders/{}/status - {} by {}", id, status, admin.user_id);
    back_office.set_order_status(&id, status).await?;
    Ok(GenericResponse::ok(format!("Order status updated to {}", status)))
}

// --- Users ---

pub async fn list_users(
    AdminUser(_admin): AdminUser,
    State(back_office): State<BackOffice>,
) -> Result<impl IntoResponse, AppError> {
    let users = back_office.users().await?;
    tracing::info!("[HANDLER] /api/admin/users - {} users.", users.len());
    Ok(Json(users))
}

pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    JsonExtract(user): JsonExtract<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    if user.email.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".into()));
    }
    tracing::info!("[HANDLER] POST /api/admin/users - Creating {} by {}", user.email, admin.user_id);
    let account = back_office.create_user(&user).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn update_user_role(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Path(id): Path<String>,
    JsonExtract(update): JsonExtract<RoleUpdate>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/admin/users/{}/role - {:?} by {}", id, update.role, admin.user_id);
    back_office.set_user_role(&id, update.role).await?;
    Ok(GenericResponse::ok("User role updated successfully"))
}

pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(back_office): State<BackOffice>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.user_id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }
    tracing::info!("[HANDLER] DELETE /api/admin/users/{} - Requested by {}", id, admin.user_id);
    back_office.delete_user(&id).await?;
    Ok(Json(GenericResponse { success: true, message: Some("User deleted successfully".into()), id: Some(id) }))
}

// --- Dashboard ---

pub async fn dashboard(
    AdminUser(_admin): AdminUser,
    State(back_office): State<BackOffice>,
) -> Result<impl IntoResponse, AppError> {
    let dashboard = back_office.dashboard().await?;
    tracing::info!("[HANDLER] /api/admin/dashboard - {:?}", dashboard.stats);
    Ok(Json(dashboard))
}
