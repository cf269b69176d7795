// Data structures shared across the catalog, checkout and back office

use chrono::{DateTime, Datelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_VEHICLE_YEAR: i32 = 1900;

// --- Vehicle ---

// A catalog listing as stored by the managed backend ('cars' table)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Vehicle {
    pub id: String,
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub price: i64, // Smallest currency unit
    #[serde(default)]
    pub mileage: Option<i64>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub interior_color: Option<String>,
    #[serde(default)]
    pub exterior_color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub features: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_featured: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_sold: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    // "Mercedes-Benz S-Class (2024)"
    pub fn title(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.year)
    }

    // Image URLs fit for display; bad entries are skipped, never the vehicle
    pub fn display_images(&self, placeholder: &str) -> Vec<String> {
        let images: Vec<String> = self
            .images
            .iter()
            .filter(|img| img.starts_with("http") || img.starts_with('/'))
            .cloned()
            .collect();
        if images.is_empty() {
            vec![placeholder.to_string()]
        } else {
            images
        }
    }
}

// Latest acceptable model year: next calendar year
pub fn max_vehicle_year() -> i32 {
    Utc::now().year() + 1
}

pub fn year_in_range(year: i32) -> bool {
    (MIN_VEHICLE_YEAR..=max_vehicle_year()).contains(&year)
}

// Backend rows sometimes carry nulls or mixed arrays; keep only the strings
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

// Form fields left empty arrive as `min_price=`; treat them as absent
pub fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + TryFrom<i64>,
    <T as FromStr>::Err: fmt::Display,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => {
            T::try_from(n).map(Some).map_err(|_| de::Error::custom(format!("number out of range: {}", n)))
        }
        Some(NumberOrText::Text(text)) => match text.trim() {
            "" => Ok(None),
            trimmed => trimmed.parse().map(Some).map_err(de::Error::custom),
        },
    }
}

// --- Catalog filters ---

// User-chosen narrowing constraints; every field absent means "no constraint"
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_price: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub max_price: Option<i64>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub year: Option<i32>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Brand,
    MinPrice,
    MaxPrice,
    Transmission,
    FuelType,
    Year,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Amount(i64),
    Year(i32),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter {key:?} does not accept {value:?}")]
    TypeMismatch { key: FilterKey, value: FilterValue },
}

impl FilterState {
    // Replace one constraint; `None` (or blank text) removes it
    pub fn set(&mut self, key: FilterKey, value: Option<FilterValue>) -> Result<(), FilterError> {
        let value = match value {
            Some(FilterValue::Text(text)) if text.trim().is_empty() => None,
            other => other,
        };

        match (key, value) {
            (FilterKey::Brand, None) => self.brand = None,
            (FilterKey::Brand, Some(FilterValue::Text(v))) => self.brand = Some(v),
            (FilterKey::MinPrice, None) => self.min_price = None,
            (FilterKey::MinPrice, Some(FilterValue::Amount(v))) => self.min_price = Some(v),
            (FilterKey::MaxPrice, None) => self.max_price = None,
            (FilterKey::MaxPrice, Some(FilterValue::Amount(v))) => self.max_price = Some(v),
            (FilterKey::Transmission, None) => self.transmission = None,
            (FilterKey::Transmission, Some(FilterValue::Text(v))) => self.transmission = Some(v),
            (FilterKey::FuelType, None) => self.fuel_type = None,
            (FilterKey::FuelType, Some(FilterValue::Text(v))) => self.fuel_type = Some(v),
            (FilterKey::Year, None) => self.year = None,
            (FilterKey::Year, Some(FilterValue::Year(v))) => self.year = Some(v),
            (FilterKey::Search, None) => self.search = None,
            (FilterKey::Search, Some(FilterValue::Text(v))) => self.search = Some(v),
            (key, Some(value)) => return Err(FilterError::TypeMismatch { key, value }),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterState::default()
    }

    // Blank text fields from query strings mean "no constraint"
    pub fn normalized(mut self) -> Self {
        for field in [&mut self.brand, &mut self.transmission, &mut self.fuel_type, &mut self.search] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    // True iff the vehicle satisfies every present constraint
    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        if let Some(brand) = &self.brand {
            if &vehicle.brand != brand {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if vehicle.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if vehicle.price > max {
                return false;
            }
        }
        if let Some(transmission) = &self.transmission {
            if vehicle.transmission.as_ref() != Some(transmission) {
                return false;
            }
        }
        if let Some(fuel_type) = &self.fuel_type {
            if vehicle.fuel_type.as_ref() != Some(fuel_type) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if vehicle.year != year {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let term = search.to_lowercase();
            let hit = vehicle.brand.to_lowercase().contains(&term)
                || vehicle.model.to_lowercase().contains(&term)
                || vehicle.year.to_string().contains(&term);
            if !hit {
                return false;
            }
        }
        true
    }
}

// --- Checkout contact ---

// Buyer contact details; every field is required
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl CustomerContact {
    // Trimmed copy, or the list of blank fields
    pub fn validated(&self) -> Result<CustomerContact, Vec<&'static str>> {
        let contact = CustomerContact {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        };
        let missing: Vec<&'static str> = [
            ("name", contact.name.is_empty()),
            ("email", contact.email.is_empty()),
            ("phone", contact.phone.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, blank)| blank.then_some(field))
        .collect();

        if missing.is_empty() { Ok(contact) } else { Err(missing) }
    }
}

// --- Orders ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown order status '{}'", s))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    pub vehicle_id: String,
    pub title: String,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_amount: i64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// Order as submitted to the backend (id and timestamps are assigned there)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub items: Vec<OrderItem>,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub notes: Option<String>,
}

// --- Users ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Role,
}

// --- Money formatting ---

// 22500000 -> "22,500,000"
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_naira(amount: i64) -> String {
    format!("₦{}", format_amount(amount))
}

// Compact headline price: 45000000 -> "₦45.0M"
pub fn format_millions(amount: i64) -> String {
    format!("₦{:.1}M", amount as f64 / 1_000_000.0)
}

/// Deposit quoted for reservations: half the price in the smallest currency
/// unit. An odd price rounds up by one unit so the deposit is never short.
pub fn deposit_amount(price: i64) -> i64 {
    price / 2 + price % 2
}
