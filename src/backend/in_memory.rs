//! In-memory backend for tests and local development without a managed backend

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{distinct_brands, sort_vehicles, Backend, BackendError, VehicleQuery};
use crate::admin::VehicleRecord;
use crate::models::{NewOrder, NewUser, Order, OrderStatus, Role, UserAccount, Vehicle};

#[derive(Default)]
struct Tables {
    vehicles: Vec<Vehicle>,
    orders: Vec<Order>,
    users: Vec<UserAccount>,
}

/// Backend kept entirely in process memory.
///
/// `fail_next` makes the next N vehicle listings fail, which is how the
/// catalog retry path is exercised in tests.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<AtomicU32>,
    list_calls: Arc<AtomicU32>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_vehicles(vehicles: Vec<Vehicle>) -> Self {
        let backend = Self::new();
        if let Ok(mut tables) = backend.tables.write() {
            tables.vehicles = vehicles;
        }
        backend
    }

    #[cfg(test)]
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    // Number of list_vehicles calls served or failed so far
    #[cfg(test)]
    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn orders(&self) -> Vec<Order> {
        self.tables.read().map(|t| t.orders.clone()).unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, BackendError> {
        self.tables
            .read()
            .map_err(|e| BackendError::Decode(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, BackendError> {
        self.tables
            .write()
            .map_err(|e| BackendError::Decode(format!("Failed to acquire write lock: {}", e)))
    }
}

fn not_found(what: &str, id: &str) -> BackendError {
    BackendError::Status { status: 404, body: format!("{} '{}' not found", what, id) }
}

fn apply_record(vehicle: &mut Vehicle, record: &VehicleRecord) {
    vehicle.brand = record.brand.clone();
    vehicle.model = record.model.clone();
    vehicle.year = record.year;
    vehicle.price = record.price;
    vehicle.mileage = Some(record.mileage);
    vehicle.engine = record.engine.clone();
    vehicle.transmission = Some(record.transmission.clone());
    vehicle.fuel_type = Some(record.fuel_type.clone());
    vehicle.interior_color = record.interior_color.clone();
    vehicle.exterior_color = record.exterior_color.clone();
    vehicle.description = record.description.clone();
    vehicle.features = record.features.clone();
    vehicle.images = record.images.clone();
    vehicle.is_featured = record.is_featured;
    vehicle.is_sold = record.is_sold;
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn list_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failures.store(pending_failures - 1, Ordering::SeqCst);
            return Err(BackendError::Status { status: 503, body: "injected failure".into() });
        }

        let tables = self.read()?;
        // Search is not a backend predicate
        let filters = crate::models::FilterState { search: None, ..query.filters.clone() };
        let mut vehicles: Vec<Vehicle> = tables
            .vehicles
            .iter()
            .filter(|v| !query.featured_only || v.is_featured)
            .filter(|v| filters.matches(v))
            .cloned()
            .collect();
        sort_vehicles(&mut vehicles, query.ordering);
        if let Some(limit) = query.limit {
            vehicles.truncate(limit);
        }
        Ok(vehicles)
    }

    async fn fetch_vehicle(&self, id: &str) -> Result<Option<Vehicle>, BackendError> {
        Ok(self.read()?.vehicles.iter().find(|v| v.id == id).cloned())
    }

    async fn list_brands(&self) -> Result<Vec<String>, BackendError> {
        let tables = self.read()?;
        Ok(distinct_brands(tables.vehicles.iter().map(|v| v.brand.as_str())))
    }

    async fn create_vehicle(&self, record: &VehicleRecord) -> Result<Vehicle, BackendError> {
        let now = Utc::now();
        let mut vehicle = Vehicle {
            id: Uuid::new_v4().to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        apply_record(&mut vehicle, record);
        self.write()?.vehicles.push(vehicle.clone());
        Ok(vehicle)
    }

    async fn update_vehicle(&self, id: &str, record: &VehicleRecord) -> Result<(), BackendError> {
        let mut tables = self.write()?;
        let vehicle = tables
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| not_found("vehicle", id))?;
        apply_record(vehicle, record);
        vehicle.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_vehicle(&self, id: &str) -> Result<(), BackendError> {
        self.write()?.vehicles.retain(|v| v.id != id);
        Ok(())
    }

    async fn list_orders(&self, status: Option<OrderStatus>, limit: Option<usize>) -> Result<Vec<Order>, BackendError> {
        let tables = self.read()?;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        let now = Utc::now();
        let created = Order {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            customer_phone: order.customer_phone.clone(),
            customer_address: None,
            items: order.items.clone(),
            total_amount: order.total_amount,
            status: order.status,
            notes: order.notes.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.write()?.orders.push(created.clone());
        Ok(created)
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError> {
        let mut tables = self.write()?;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| not_found("order", id))?;
        order.status = status;
        order.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, BackendError> {
        Ok(self.read()?.users.clone())
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserAccount, BackendError> {
        let mut tables = self.write()?;
        if tables.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(BackendError::Status { status: 422, body: "email already registered".into() });
        }
        let account = UserAccount {
            id: Uuid::new_v4().to_string(),
            email: user.email.clone(),
            role: user.role,
            full_name: user.full_name.clone(),
            phone: user.phone.clone(),
            created_at: Some(Utc::now()),
        };
        tables.users.push(account.clone());
        Ok(account)
    }

    async fn set_user_role(&self, id: &str, role: Role) -> Result<(), BackendError> {
        let mut tables = self.write()?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| not_found("user", id))?;
        user.role = role;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
        self.write()?.users.retain(|u| u.id != id);
        Ok(())
    }
}
