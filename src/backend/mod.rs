// Managed backend collaborator: vehicle listings, orders and user accounts
//
// The storefront never talks to a global client. A `Backend` trait object is
// built once in main and handed to every service that needs it.

use async_trait::async_trait;

use crate::admin::VehicleRecord;
use crate::models::{FilterState, NewOrder, NewUser, Order, OrderStatus, Role, UserAccount, Vehicle};

mod in_memory;
mod rest;

pub use in_memory::InMemoryBackend;
pub use rest::{RestBackend, VEHICLES_TABLE};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend not configured: {0}")]
    NotConfigured(String),
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

// Ordering requested from the backend for vehicle listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VehicleOrdering {
    #[default]
    FeaturedThenNewest,
    Newest,
}

// Server-side predicate set for a listing query. Free-text search is not
// pushed down; it runs in the catalog view-model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleQuery {
    pub featured_only: bool,
    pub filters: FilterState,
    pub ordering: VehicleOrdering,
    pub limit: Option<usize>,
}

impl VehicleQuery {
    // Full catalog snapshot: featured first, then newest first
    pub fn catalog() -> Self {
        VehicleQuery::default()
    }

    pub fn inventory() -> Self {
        VehicleQuery { ordering: VehicleOrdering::Newest, ..Default::default() }
    }

    // Home page strips
    pub fn featured(limit: usize) -> Self {
        VehicleQuery { featured_only: true, limit: Some(limit), ..Default::default() }
    }

    pub fn latest(limit: usize) -> Self {
        VehicleQuery { ordering: VehicleOrdering::Newest, limit: Some(limit), ..Default::default() }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    // Vehicles ('cars' collection)
    async fn list_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>, BackendError>;
    async fn fetch_vehicle(&self, id: &str) -> Result<Option<Vehicle>, BackendError>;
    async fn list_brands(&self) -> Result<Vec<String>, BackendError>;
    async fn create_vehicle(&self, record: &VehicleRecord) -> Result<Vehicle, BackendError>;
    async fn update_vehicle(&self, id: &str, record: &VehicleRecord) -> Result<(), BackendError>;
    async fn delete_vehicle(&self, id: &str) -> Result<(), BackendError>;

    // Orders
    async fn list_orders(&self, status: Option<OrderStatus>, limit: Option<usize>) -> Result<Vec<Order>, BackendError>;
    async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError>;
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError>;

    // User accounts
    async fn list_users(&self) -> Result<Vec<UserAccount>, BackendError>;
    async fn create_user(&self, user: &NewUser) -> Result<UserAccount, BackendError>;
    async fn set_user_role(&self, id: &str, role: Role) -> Result<(), BackendError>;
    async fn delete_user(&self, id: &str) -> Result<(), BackendError>;
}

// Sort the way listing queries promise: featured first, newest first
pub(crate) fn sort_vehicles(vehicles: &mut [Vehicle], ordering: VehicleOrdering) {
    match ordering {
        VehicleOrdering::FeaturedThenNewest => vehicles.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then_with(|| b.created_at.cmp(&a.created_at))
        }),
        VehicleOrdering::Newest => vehicles.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

// Distinct brands in alphabetical order
pub(crate) fn distinct_brands<'a>(brands: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut brands: Vec<String> = brands.map(str::to_string).collect();
    brands.sort();
    brands.dedup();
    brands
}
