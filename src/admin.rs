// Back office: inventory, orders, user accounts and the dashboard

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backend::{Backend, BackendError, VehicleQuery};
use crate::models::{
    format_millions, max_vehicle_year, year_in_range, FilterState, NewUser, Order, OrderStatus, Role, UserAccount, Vehicle,
    MIN_VEHICLE_YEAR,
};
use crate::realtime::{ChangeFeed, ChangeKind, VehicleChange};

const RECENT_ORDERS: usize = 5;
const DEFAULT_TRANSMISSION: &str = "Automatic";
const DEFAULT_FUEL_TYPE: &str = "Petrol";

// --- Inventory drafts ---

// Features arrive either as "Heated seats, Panoramic roof" or as a list
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureInput {
    Csv(String),
    List(Vec<String>),
}

impl Default for FeatureInput {
    fn default() -> Self {
        FeatureInput::List(Vec::new())
    }
}

impl FeatureInput {
    fn into_list(self) -> Vec<String> {
        let raw = match self {
            FeatureInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
            FeatureInput::List(list) => list,
        };
        raw.into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

// Inventory form as submitted by an administrator
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VehicleDraft {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    pub year: Option<i32>,
    pub price: Option<i64>,
    pub mileage: Option<i64>,
    pub engine: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub interior_color: Option<String>,
    pub exterior_color: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub features: FeatureInput,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_sold: bool,
}

// Validated row written to the backend
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VehicleRecord {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage: i64,
    pub engine: Option<String>,
    pub transmission: String,
    pub fuel_type: String,
    pub interior_color: Option<String>,
    pub exterior_color: Option<String>,
    pub description: Option<String>,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub is_featured: bool,
    pub is_sold: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Please enter car brand")]
    MissingBrand,
    #[error("Please enter car model")]
    MissingModel,
    #[error("Please enter a valid year between {min} and {max}")]
    InvalidYear { min: i32, max: i32 },
    #[error("Please enter valid price")]
    InvalidPrice,
    #[error("Image URL must start with http:// or https://: {0}")]
    InvalidImageUrl(String),
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl VehicleDraft {
    pub fn validate(self) -> Result<VehicleRecord, DraftError> {
        let brand = self.brand.trim().to_string();
        if brand.is_empty() {
            return Err(DraftError::MissingBrand);
        }
        let model = self.model.trim().to_string();
        if model.is_empty() {
            return Err(DraftError::MissingModel);
        }
        let year = self
            .year
            .filter(|y| year_in_range(*y))
            .ok_or(DraftError::InvalidYear { min: MIN_VEHICLE_YEAR, max: max_vehicle_year() })?;
        let price = self.price.filter(|p| *p > 0).ok_or(DraftError::InvalidPrice)?;

        let mut images: Vec<String> = Vec::with_capacity(self.images.len());
        for url in self.images {
            let url = url.trim().to_string();
            if url.is_empty() {
                continue;
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DraftError::InvalidImageUrl(url));
            }
            if !images.contains(&url) {
                images.push(url);
            }
        }

        Ok(VehicleRecord {
            brand,
            model,
            year,
            price,
            mileage: self.mileage.unwrap_or(0).max(0),
            engine: non_blank(self.engine),
            transmission: non_blank(self.transmission).unwrap_or_else(|| DEFAULT_TRANSMISSION.to_string()),
            fuel_type: non_blank(self.fuel_type).unwrap_or_else(|| DEFAULT_FUEL_TYPE.to_string()),
            interior_color: non_blank(self.interior_color),
            exterior_color: non_blank(self.exterior_color),
            description: non_blank(self.description),
            features: self.features.into_list(),
            images,
            is_featured: self.is_featured,
            is_sold: self.is_sold,
        })
    }
}

// --- Dashboard ---

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total_cars: usize,
    pub available_cars: usize,
    pub featured_cars: usize,
    pub total_orders: usize,
    pub pending_orders: usize,
    pub total_revenue: i64,
}

impl DashboardStats {
    pub fn compute(vehicles: &[Vehicle], orders: &[Order]) -> Self {
        DashboardStats {
            total_cars: vehicles.len(),
            available_cars: vehicles.iter().filter(|v| !v.is_sold).count(),
            featured_cars: vehicles.iter().filter(|v| v.is_featured).count(),
            total_orders: orders.len(),
            pending_orders: orders.iter().filter(|o| o.status == OrderStatus::Pending).count(),
            total_revenue: orders.iter().map(|o| o.total_amount).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub revenue_label: String, // "₦45.0M"
    pub recent_orders: Vec<Order>,
}

// --- Back office operations ---

#[derive(Clone)]
pub struct BackOffice {
    backend: Arc<dyn Backend>,
    feed: ChangeFeed,
}

impl BackOffice {
    pub fn new(backend: Arc<dyn Backend>, feed: ChangeFeed) -> Self {
        BackOffice { backend, feed }
    }

    // Structured filters go to the backend; free-text search is applied here
    pub async fn inventory(&self, filters: &FilterState) -> Result<Vec<Vehicle>, BackendError> {
        let query = VehicleQuery { filters: filters.clone(), ..VehicleQuery::inventory() };
        let mut vehicles = self.backend.list_vehicles(&query).await?;
        if filters.search.is_some() {
            vehicles.retain(|v| filters.matches(v));
        }
        Ok(vehicles)
    }

    pub async fn create_vehicle(&self, record: VehicleRecord) -> Result<Vehicle, BackendError> {
        tracing::info!("Creating vehicle {} {}", record.brand, record.model);
        let created = self.backend.create_vehicle(&record).await?;
        self.feed.publish(VehicleChange {
            kind: ChangeKind::Insert,
            table: None,
            vehicle_id: Some(created.id.clone()),
        });
        Ok(created)
    }

    pub async fn update_vehicle(&self, id: &str, record: VehicleRecord) -> Result<(), BackendError> {
        tracing::info!("Updating vehicle {}", id);
        self.backend.update_vehicle(id, &record).await?;
        self.feed.publish(VehicleChange { kind: ChangeKind::Update, table: None, vehicle_id: Some(id.to_string()) });
        Ok(())
    }

    pub async fn delete_vehicle(&self, id: &str) -> Result<(), BackendError> {
        tracing::info!("Deleting vehicle {}", id);
        self.backend.delete_vehicle(id).await?;
        self.feed.publish(VehicleChange { kind: ChangeKind::Delete, table: None, vehicle_id: Some(id.to_string()) });
        Ok(())
    }

    pub async fn orders(&self, status: Option<OrderStatus>, limit: Option<usize>) -> Result<Vec<Order>, BackendError> {
        self.backend.list_orders(status, limit).await
    }

    pub async fn set_order_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError> {
        tracing::info!("Setting order {} status to {}", id, status);
        self.backend.update_order_status(id, status).await
    }

    pub async fn users(&self) -> Result<Vec<UserAccount>, BackendError> {
        self.backend.list_users().await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<UserAccount, BackendError> {
        self.backend.create_user(user).await
    }

    pub async fn set_user_role(&self, id: &str, role: Role) -> Result<(), BackendError> {
        self.backend.set_user_role(id, role).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
        self.backend.delete_user(id).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, BackendError> {
        let inventory_query = VehicleQuery::inventory();
        let (vehicles, orders) = futures::future::try_join(
            self.backend.list_vehicles(&inventory_query),
            self.backend.list_orders(None, None),
        )
        .await?;
        let stats = DashboardStats::compute(&vehicles, &orders);
        // list_orders is newest first
        let recent_orders = orders.into_iter().take(RECENT_ORDERS).collect();
        Ok(Dashboard { revenue_label: format_millions(stats.total_revenue), stats, recent_orders })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::models::{NewOrder, OrderItem};

    fn draft() -> VehicleDraft {
        VehicleDraft {
            brand: " Range Rover ".into(),
            model: "Autobiography".into(),
            year: Some(2023),
            price: Some(120_000_000),
            features: FeatureInput::Csv("Massage seats, , Meridian audio ".into()),
            images: vec![
                "https://cdn.example.com/rr.jpg".into(),
                "https://cdn.example.com/rr.jpg".into(),
                " ".into(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn draft_is_trimmed_and_defaulted() {
        let record = draft().validate().unwrap();
        assert_eq!(record.brand, "Range Rover");
        assert_eq!(record.features, vec!["Massage seats", "Meridian audio"]);
        assert_eq!(record.images, vec!["https://cdn.example.com/rr.jpg"]);
        assert_eq!(record.transmission, "Automatic");
        assert_eq!(record.fuel_type, "Petrol");
        assert_eq!(record.mileage, 0);
        assert_eq!(record.engine, None);
    }

    #[test]
    fn draft_rejects_bad_fields() {
        assert_eq!(VehicleDraft { brand: "".into(), ..draft() }.validate(), Err(DraftError::MissingBrand));
        assert_eq!(VehicleDraft { model: "  ".into(), ..draft() }.validate(), Err(DraftError::MissingModel));
        assert!(matches!(VehicleDraft { year: Some(1899), ..draft() }.validate(), Err(DraftError::InvalidYear { .. })));
        assert!(matches!(
            VehicleDraft { year: Some(max_vehicle_year() + 1), ..draft() }.validate(),
            Err(DraftError::InvalidYear { .. })
        ));
        assert_eq!(VehicleDraft { price: Some(0), ..draft() }.validate(), Err(DraftError::InvalidPrice));
        assert_eq!(
            VehicleDraft { images: vec!["ftp://x/y.jpg".into()], ..draft() }.validate(),
            Err(DraftError::InvalidImageUrl("ftp://x/y.jpg".into()))
        );
    }

    #[test]
    fn features_accept_list_or_csv_json() {
        let from_csv: VehicleDraft = serde_json::from_str(r#"{"brand":"A","model":"B","features":"x, y"}"#).unwrap();
        let from_list: VehicleDraft = serde_json::from_str(r#"{"brand":"A","model":"B","features":["x","y"]}"#).unwrap();
        assert_eq!(from_csv.features.into_list(), from_list.features.into_list());
    }

    #[tokio::test]
    async fn inventory_mutations_publish_changes() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let office = BackOffice::new(Arc::new(InMemoryBackend::new()), feed);

        let created = office.create_vehicle(draft().validate().unwrap()).await.unwrap();
        office.delete_vehicle(&created.id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Insert);
        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.kind, ChangeKind::Delete);
        assert_eq!(deleted.vehicle_id, Some(created.id));
        assert!(office.inventory(&FilterState::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dashboard_aggregates_inventory_and_orders() {
        let backend = InMemoryBackend::with_vehicles(vec![
            Vehicle { id: "a".into(), is_featured: true, ..Default::default() },
            Vehicle { id: "b".into(), is_sold: true, ..Default::default() },
        ]);
        for (amount, status) in [(10, OrderStatus::Pending), (32, OrderStatus::Completed)] {
            backend
                .create_order(&NewOrder {
                    customer_name: "Ada".into(),
                    customer_email: "ada@example.com".into(),
                    customer_phone: "1".into(),
                    items: vec![OrderItem { vehicle_id: "a".into(), title: "A".into(), price: amount, quantity: 1 }],
                    total_amount: amount,
                    status,
                    notes: None,
                })
                .await
                .unwrap();
        }
        let office = BackOffice::new(Arc::new(backend), ChangeFeed::default());

        let dashboard = office.dashboard().await.unwrap();
        assert_eq!(
            dashboard.stats,
            DashboardStats {
                total_cars: 2,
                available_cars: 1,
                featured_cars: 1,
                total_orders: 2,
                pending_orders: 1,
                total_revenue: 42,
            }
        );
        assert_eq!(dashboard.recent_orders.len(), 2);
    }

    #[tokio::test]
    async fn order_status_updates_are_persisted() {
        let backend = InMemoryBackend::new();
        let order = backend
            .create_order(&NewOrder {
                customer_name: "Ada".into(),
                customer_email: "ada@example.com".into(),
                customer_phone: "1".into(),
                items: Vec::new(),
                total_amount: 5,
                status: OrderStatus::Pending,
                notes: None,
            })
            .await
            .unwrap();
        let office = BackOffice::new(Arc::new(backend), ChangeFeed::default());

        office.set_order_status(&order.id, OrderStatus::Processing).await.unwrap();
        let processing = office.orders(Some(OrderStatus::Processing), None).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert!(office.orders(Some(OrderStatus::Pending), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inventory_applies_filters_and_search() {
        let backend = InMemoryBackend::with_vehicles(vec![
            Vehicle { id: "x5".into(), brand: "BMW".into(), model: "X5".into(), ..Default::default() },
            Vehicle { id: "x7".into(), brand: "BMW".into(), model: "X7".into(), ..Default::default() },
            Vehicle { id: "gle".into(), brand: "Mercedes-Benz".into(), model: "GLE".into(), ..Default::default() },
        ]);
        let office = BackOffice::new(Arc::new(backend), ChangeFeed::default());

        let bmw = FilterState { brand: Some("BMW".into()), ..Default::default() };
        assert_eq!(office.inventory(&bmw).await.unwrap().len(), 2);

        let x7 = FilterState { search: Some("x7".into()), ..bmw };
        let found = office.inventory(&x7).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "x7");
    }

    #[tokio::test]
    async fn order_listing_honours_limit() {
        let backend = InMemoryBackend::new();
        for total_amount in [1, 2, 3] {
            backend
                .create_order(&NewOrder {
                    customer_name: "Ada".into(),
                    customer_email: "ada@example.com".into(),
                    customer_phone: "1".into(),
                    items: Vec::new(),
                    total_amount,
                    status: OrderStatus::Pending,
                    notes: None,
                })
                .await
                .unwrap();
        }
        let office = BackOffice::new(Arc::new(backend), ChangeFeed::default());
        assert_eq!(office.orders(None, Some(2)).await.unwrap().len(), 2);
        assert_eq!(office.orders(None, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn user_roles_can_be_changed() {
        let office = BackOffice::new(Arc::new(InMemoryBackend::new()), ChangeFeed::default());
        let user = office
            .create_user(&NewUser {
                email: "staff@example.com".into(),
                password: "hunter22".into(),
                full_name: None,
                phone: None,
                role: Role::User,
            })
            .await
            .unwrap();
        office.set_user_role(&user.id, Role::Admin).await.unwrap();
        assert_eq!(office.users().await.unwrap()[0].role, Role::Admin);
        office.delete_user(&user.id).await.unwrap();
        assert!(office.users().await.unwrap().is_empty());
    }
}
