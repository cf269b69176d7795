// Handlers for the public storefront API

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    backend::{VehicleQuery, VEHICLES_TABLE},
    catalog::CatalogViewModel,
    checkout::CheckoutAction,
    error::AppError,
    models::{deposit_amount, format_naira, CustomerContact, FilterState, Vehicle},
    payment::GatewayResponse,
    realtime::VehicleChange,
    AppState,
};

const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";
const FEATURED_LIMIT: usize = 6;
const LATEST_LIMIT: usize = 8;

// --- Response Wrappers ---

// A vehicle plus what the storefront needs to render it
#[derive(Serialize)]
struct VehicleView<'a> {
    #[serde(flatten)]
    vehicle: &'a Vehicle,
    title: String,
    price_label: String,
    image_urls: Vec<String>,
}

impl<'a> VehicleView<'a> {
    fn new(vehicle: &'a Vehicle, placeholder: &str) -> Self {
        VehicleView {
            title: vehicle.title(),
            price_label: format_naira(vehicle.price),
            image_urls: vehicle.display_images(placeholder),
            vehicle,
        }
    }
}

#[derive(Serialize)]
struct CatalogResponse<'a> {
    success: bool,
    vehicles: Vec<VehicleView<'a>>,
    visible: usize,
    total: usize,
    has_active_filters: bool,
    brands: Vec<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ShowcaseResponse<'a> {
    success: bool,
    vehicles: Vec<VehicleView<'a>>,
}

#[derive(Serialize)]
struct VehicleDetailResponse<'a> {
    success: bool,
    vehicle: VehicleView<'a>,
    deposit_label: String,
    payment_available: bool,
}

#[derive(Serialize)]
struct GenericResponse {
    success: bool,
    message: Option<String>,
}

// --- Request Structs ---

#[derive(Deserialize, Debug)]
pub struct StartCheckoutRequest {
    vehicle_id: String,
    action: CheckoutAction,
}

// --- Catalog Handlers ---

pub async fn list_vehicles(
    State(app_state): State<AppState>,
    Query(filters): Query<FilterState>,
) -> Result<impl IntoResponse, AppError> {
    let filters = filters.normalized();
    tracing::info!("[HANDLER] /api/vehicles - Request received with filters: {:?}", filters);

    let snapshot = app_state.catalog.snapshot().await;
    let view = CatalogViewModel::with_filters(snapshot.vehicles.clone(), filters);
    let placeholder = &app_state.settings.placeholder_image;

    let visible = view.visible_vehicles();
    tracing::info!("[HANDLER] /api/vehicles - Returning {}/{} vehicles.", visible.len(), view.total_count());

    let body = CatalogResponse {
        success: snapshot.error.is_none(),
        vehicles: visible.into_iter().map(|v| VehicleView::new(v, placeholder)).collect(),
        visible: view.visible_count(),
        total: view.total_count(),
        has_active_filters: view.has_active_filters(),
        brands: view.brands(),
        error: snapshot.error,
    };
    // Serialized here so the borrowed views never outlive this handler
    Ok(Json(serde_json::to_value(body).map_err(anyhow::Error::new)?))
}

async fn showcase(app_state: &AppState, query: VehicleQuery) -> Result<serde_json::Value, AppError> {
    let vehicles = app_state.catalog.backend().list_vehicles(&query).await?;
    let placeholder = &app_state.settings.placeholder_image;
    let body = ShowcaseResponse {
        success: true,
        vehicles: vehicles.iter().map(|v| VehicleView::new(v, placeholder)).collect(),
    };
    Ok(serde_json::to_value(body).map_err(anyhow::Error::new)?)
}

pub async fn featured_vehicles(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/vehicles/featured - Request received.");
    Ok(Json(showcase(&app_state, VehicleQuery::featured(FEATURED_LIMIT)).await?))
}

pub async fn latest_vehicles(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/vehicles/latest - Request received.");
    Ok(Json(showcase(&app_state, VehicleQuery::latest(LATEST_LIMIT)).await?))
}

pub async fn get_vehicle(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/vehicles/:id - Request received for id: {}", id);

    let vehicle = app_state
        .catalog
        .backend()
        .fetch_vehicle(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Vehicle '{}' not found", id)))?;

    let settings = &app_state.settings;
    let body = VehicleDetailResponse {
        success: true,
        vehicle: VehicleView::new(&vehicle, &settings.placeholder_image),
        deposit_label: format_naira(deposit_amount(vehicle.price)),
        payment_available: settings.payment_public_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && !vehicle.is_sold,
    };
    Ok(Json(serde_json::to_value(body).map_err(anyhow::Error::new)?))
}

pub async fn list_brands(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/brands - Request received.");
    let brands = app_state.catalog.backend().list_brands().await?;
    tracing::debug!("[HANDLER] /api/brands - {} brands.", brands.len());
    Ok(Json(brands))
}

// --- Checkout Handlers ---

pub async fn start_checkout(
    State(app_state): State<AppState>,
    JsonExtract(request): JsonExtract<StartCheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/checkout - {:?}", request);
    let view = app_state.checkout.start(&request.vehicle_id, request.action).await?;
    Ok(Json(view))
}

fn unknown_attempt(id: Uuid) -> AppError {
    AppError::NotFound(format!("Checkout attempt {} not found", id))
}

pub async fn submit_payment(
    State(app_state): State<AppState>,
    Path(attempt): Path<Uuid>,
    JsonExtract(contact): JsonExtract<CustomerContact>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/checkout/:attempt/payment - Attempt {}", attempt);
    let config = app_state
        .checkout
        .submit(attempt, &contact)
        .await?
        .ok_or_else(|| unknown_attempt(attempt))?;
    Ok(Json(config))
}

// The widget posts `null` when it is closed before reporting anything
pub async fn payment_callback(
    State(app_state): State<AppState>,
    Path(attempt): Path<Uuid>,
    JsonExtract(response): JsonExtract<Option<GatewayResponse>>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/checkout/:attempt/callback - Attempt {}", attempt);
    let view = app_state
        .checkout
        .callback(attempt, response)
        .await
        .ok_or_else(|| unknown_attempt(attempt))?;
    Ok(Json(view))
}

pub async fn close_payment(
    State(app_state): State<AppState>,
    Path(attempt): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/checkout/:attempt/close - Attempt {}", attempt);
    let view = app_state.checkout.close(attempt).await.ok_or_else(|| unknown_attempt(attempt))?;
    Ok(Json(view))
}

pub async fn reset_checkout(
    State(app_state): State<AppState>,
    Path(attempt): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("[HANDLER] /api/checkout/:attempt/reset - Attempt {}", attempt);
    let view = app_state.checkout.reset(attempt).await?.ok_or_else(|| unknown_attempt(attempt))?;
    Ok(Json(view))
}

// --- Backend Webhooks ---

// Database webhook from the managed backend; any vehicle change triggers a refetch
pub async fn vehicle_changed(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    JsonExtract(change): JsonExtract<VehicleChange>,
) -> Result<impl IntoResponse, AppError> {
    let expected = app_state
        .settings
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Unavailable("Webhooks are not configured".into()))?;
    let provided = headers.get(WEBHOOK_SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        return Err(AppError::Unauthorized("Invalid webhook secret".into()));
    }

    if change.table.as_deref().is_some_and(|t| t != VEHICLES_TABLE) {
        tracing::debug!("[HANDLER] /api/hooks/vehicles - Ignoring change on table {:?}", change.table);
        return Ok((StatusCode::OK, Json(GenericResponse { success: true, message: Some("ignored".into()) })));
    }

    tracing::info!("[HANDLER] /api/hooks/vehicles - {:?} change received.", change.kind);
    app_state.feed.publish(change);
    Ok((StatusCode::ACCEPTED, Json(GenericResponse { success: true, message: None })))
}
