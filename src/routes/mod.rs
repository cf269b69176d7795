// Route definitions

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::AppState;

// Declare submodules for different route groups
mod admin;
mod api;
mod auth;

pub fn create_router(app_state: AppState) -> Router {
    // Public storefront API: catalog, checkout and backend webhooks
    let api_router = Router::new()
        .route("/vehicles", get(api::list_vehicles))
        .route("/vehicles/featured", get(api::featured_vehicles))
        .route("/vehicles/latest", get(api::latest_vehicles))
        .route("/vehicles/:id", get(api::get_vehicle))
        .route("/brands", get(api::list_brands))
        .route("/checkout", post(api::start_checkout))
        .route("/checkout/:attempt/payment", post(api::submit_payment))
        .route("/checkout/:attempt/callback", post(api::payment_callback))
        .route("/checkout/:attempt/close", post(api::close_payment))
        .route("/checkout/:attempt/reset", post(api::reset_checkout))
        .route("/hooks/vehicles", post(api::vehicle_changed))
        // Back office, every handler takes an AdminUser
        .route("/admin/vehicles", get(admin::list_inventory).post(admin::create_vehicle))
        .route("/admin/vehicles/:id", put(admin::update_vehicle).delete(admin::delete_vehicle))
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/:id/status", put(admin::update_order_status))
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
        .route("/admin/users/:id/role", put(admin::update_user_role))
        .route("/admin/users/:id", delete(admin::delete_user))
        .route("/admin/dashboard", get(admin::dashboard))
        .with_state(app_state.clone());

    Router::new()
        .route("/admin/login", post(auth::handle_login))
        .nest("/api", api_router)
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
