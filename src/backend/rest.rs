// REST client for the managed backend (PostgREST tables + auth admin API)

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;

use super::{distinct_brands, Backend, BackendError, VehicleOrdering, VehicleQuery};
use crate::admin::VehicleRecord;
use crate::config::Settings;
use crate::models::{NewOrder, NewUser, Order, OrderStatus, Role, UserAccount, Vehicle};

pub const VEHICLES_TABLE: &str = "cars";
const ORDERS_TABLE: &str = "orders";
const ROLES_TABLE: &str = "user_roles";
const PROFILES_TABLE: &str = "profiles";

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
}

// --- Response structures ---

#[derive(Deserialize, Debug)]
struct AuthUser {
    id: String,
    email: Option<String>,
    created_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
struct AuthUserList {
    users: Vec<AuthUser>,
}

#[derive(Deserialize, Debug)]
struct RoleRow {
    user_id: String,
    role: Role,
}

#[derive(Deserialize, Debug)]
struct ProfileRow {
    id: String,
    full_name: Option<String>,
    phone: Option<String>,
}

#[derive(Deserialize, Debug)]
struct BrandRow {
    brand: String,
}

impl RestBackend {
    // Builds a client carrying the service key on every request
    pub fn new(settings: &Settings) -> Result<Self, BackendError> {
        let base_url = settings
            .backend_url
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("backend_url".into()))?
            .trim_end_matches('/')
            .to_string();
        let api_key = settings
            .backend_api_key
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("backend_api_key".into()))?;

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(api_key)
            .map_err(|e| BackendError::NotConfigured(format!("invalid backend_api_key: {}", e)))?;
        let bearer_value = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| BackendError::NotConfigured(format!("invalid backend_api_key: {}", e)))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer_value);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(RestBackend { client, base_url })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_admin_url(&self, path: &str) -> String {
        format!("{}/auth/v1/admin/{}", self.base_url, path)
    }

    // Sends the request and turns non-2xx answers into BackendError::Status
    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| "[Failed to read response body]".to_string());
        tracing::debug!(status = %status, response_body = %body, "Backend error details");
        Err(BackendError::Status { status: status.as_u16(), body })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

// Translate a listing query into PostgREST query pairs
fn vehicle_query_params(query: &VehicleQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    let order = match query.ordering {
        VehicleOrdering::FeaturedThenNewest => "is_featured.desc,created_at.desc",
        VehicleOrdering::Newest => "created_at.desc",
    };
    params.push(("order".to_string(), order.to_string()));

    let filters = &query.filters;
    if query.featured_only {
        params.push(("is_featured".to_string(), "eq.true".to_string()));
    }
    if let Some(brand) = &filters.brand {
        params.push(("brand".to_string(), format!("eq.{}", brand)));
    }
    if let Some(min) = filters.min_price {
        params.push(("price".to_string(), format!("gte.{}", min)));
    }
    if let Some(max) = filters.max_price {
        params.push(("price".to_string(), format!("lte.{}", max)));
    }
    if let Some(transmission) = &filters.transmission {
        params.push(("transmission".to_string(), format!("eq.{}", transmission)));
    }
    if let Some(fuel_type) = &filters.fuel_type {
        params.push(("fuel_type".to_string(), format!("eq.{}", fuel_type)));
    }
    if let Some(year) = filters.year {
        params.push(("year".to_string(), format!("eq.{}", year)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

// Merge auth users with their role rows and profiles; missing role means 'user'
fn merge_accounts(users: Vec<AuthUser>, roles: Vec<RoleRow>, profiles: Vec<ProfileRow>) -> Vec<UserAccount> {
    let roles: HashMap<String, Role> = roles.into_iter().map(|r| (r.user_id, r.role)).collect();
    let mut profiles: HashMap<String, ProfileRow> = profiles.into_iter().map(|p| (p.id.clone(), p)).collect();

    users
        .into_iter()
        .map(|user| {
            let profile = profiles.remove(&user.id);
            UserAccount {
                role: roles.get(&user.id).copied().unwrap_or_default(),
                email: user.email.unwrap_or_default(),
                full_name: profile.as_ref().and_then(|p| p.full_name.clone()),
                phone: profile.and_then(|p| p.phone),
                created_at: user.created_at,
                id: user.id,
            }
        })
        .collect()
}

#[async_trait]
impl Backend for RestBackend {
    async fn list_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>, BackendError> {
        let params = vehicle_query_params(query);
        tracing::debug!(?params, "Listing vehicles");
        self.send_json(self.client.get(self.table_url(VEHICLES_TABLE)).query(&params)).await
    }

    async fn fetch_vehicle(&self, id: &str) -> Result<Option<Vehicle>, BackendError> {
        let rows: Vec<Vehicle> = self
            .send_json(
                self.client
                    .get(self.table_url(VEHICLES_TABLE))
                    .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_brands(&self) -> Result<Vec<String>, BackendError> {
        let rows: Vec<BrandRow> = self
            .send_json(
                self.client
                    .get(self.table_url(VEHICLES_TABLE))
                    .query(&[("select", "brand"), ("order", "brand.asc")]),
            )
            .await?;
        Ok(distinct_brands(rows.iter().map(|r| r.brand.as_str())))
    }

    async fn create_vehicle(&self, record: &VehicleRecord) -> Result<Vehicle, BackendError> {
        let rows: Vec<Vehicle> = self
            .send_json(
                self.client
                    .post(self.table_url(VEHICLES_TABLE))
                    .header("Prefer", "return=representation")
                    .json(record),
            )
            .await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".into()))?;
        tracing::info!("Created vehicle with ID: {}", created.id);
        Ok(created)
    }

    async fn update_vehicle(&self, id: &str, record: &VehicleRecord) -> Result<(), BackendError> {
        let mut body = serde_json::to_value(record).map_err(|e| BackendError::Decode(e.to_string()))?;
        body["updated_at"] = json!(Utc::now());
        self.send(
            self.client
                .patch(self.table_url(VEHICLES_TABLE))
                .query(&[("id", format!("eq.{}", id))])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_vehicle(&self, id: &str) -> Result<(), BackendError> {
        self.send(
            self.client
                .delete(self.table_url(VEHICLES_TABLE))
                .query(&[("id", format!("eq.{}", id))]),
        )
        .await?;
        Ok(())
    }

    async fn list_orders(&self, status: Option<OrderStatus>, limit: Option<usize>) -> Result<Vec<Order>, BackendError> {
        let mut params = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        if let Some(status) = status {
            params.push(("status".to_string(), format!("eq.{}", status)));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        self.send_json(self.client.get(self.table_url(ORDERS_TABLE)).query(&params)).await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        let rows: Vec<Order> = self
            .send_json(
                self.client
                    .post(self.table_url(ORDERS_TABLE))
                    .header("Prefer", "return=representation")
                    .json(order),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".into()))
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError> {
        self.send(
            self.client
                .patch(self.table_url(ORDERS_TABLE))
                .query(&[("id", format!("eq.{}", id))])
                .json(&json!({ "status": status, "updated_at": Utc::now() })),
        )
        .await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserAccount>, BackendError> {
        let users: AuthUserList = self.send_json(self.client.get(self.auth_admin_url("users"))).await?;
        let roles: Vec<RoleRow> = self
            .send_json(self.client.get(self.table_url(ROLES_TABLE)).query(&[("select", "user_id,role")]))
            .await?;
        let profiles: Vec<ProfileRow> = self
            .send_json(self.client.get(self.table_url(PROFILES_TABLE)).query(&[("select", "id,full_name,phone")]))
            .await?;
        Ok(merge_accounts(users.users, roles, profiles))
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserAccount, BackendError> {
        let created: AuthUser = self
            .send_json(self.client.post(self.auth_admin_url("users")).json(&json!({
                "email": user.email,
                "password": user.password,
                "email_confirm": true,
            })))
            .await?;

        self.send(
            self.client
                .post(self.table_url(ROLES_TABLE))
                .json(&json!({ "user_id": created.id, "role": user.role })),
        )
        .await?;

        if user.full_name.is_some() || user.phone.is_some() {
            self.send(self.client.post(self.table_url(PROFILES_TABLE)).json(&json!({
                "id": created.id,
                "full_name": user.full_name,
                "phone": user.phone,
                "email": user.email,
            })))
            .await?;
        }

        tracing::info!("Created user account with ID: {}", created.id);
        Ok(UserAccount {
            email: created.email.unwrap_or_else(|| user.email.clone()),
            role: user.role,
            full_name: user.full_name.clone(),
            phone: user.phone.clone(),
            created_at: created.created_at,
            id: created.id,
        })
    }

    async fn set_user_role(&self, id: &str, role: Role) -> Result<(), BackendError> {
        // Role rows are replaced, not patched
        self.send(
            self.client
                .delete(self.table_url(ROLES_TABLE))
                .query(&[("user_id", format!("eq.{}", id))]),
        )
        .await?;
        self.send(
            self.client
                .post(self.table_url(ROLES_TABLE))
                .json(&json!({ "user_id": id, "role": role })),
        )
        .await?;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
        self.send(self.client.delete(self.auth_admin_url(&format!("users/{}", id)))).await?;
        Ok(())
    }
}
