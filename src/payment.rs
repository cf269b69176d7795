// Payment gateway boundary: widget configuration out, callback payloads in

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Settings;
use crate::models::CustomerContact;

const REFERENCE_PREFIX: &str = "PM";
const REFERENCE_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// What is being paid for and by whom, before it reaches the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub customer: CustomerContact,
    pub reference: String, // Idempotency reference, unique per attempt
    pub order_id: Option<String>,
}

// "PM-<unix millis>-<9 base36 chars>"
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", REFERENCE_PREFIX, Utc::now().timestamp_millis(), suffix)
}

// --- Widget configuration ---

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GatewayCustomer {
    pub email: String,
    pub phone_number: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Customizations {
    pub title: String,
    pub description: String,
    pub logo: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentMeta {
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

// Configuration handed to the client-side checkout widget
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentConfig {
    pub public_key: String,
    pub tx_ref: String,
    pub amount: i64,
    pub currency: String,
    pub payment_options: String,
    pub customer: GatewayCustomer,
    pub customizations: Customizations,
    pub meta: PaymentMeta,
}

impl PaymentConfig {
    pub fn new(intent: &PaymentIntent, public_key: &str, settings: &Settings) -> Self {
        PaymentConfig {
            public_key: public_key.to_string(),
            tx_ref: intent.reference.clone(),
            amount: intent.amount,
            currency: intent.currency.clone(),
            payment_options: settings.payment_options.clone(),
            customer: GatewayCustomer {
                email: intent.customer.email.clone(),
                phone_number: intent.customer.phone.clone(),
                name: intent.customer.name.clone(),
            },
            customizations: Customizations {
                title: settings.store_title.clone(),
                description: settings.store_description.clone(),
                logo: settings.store_logo.clone(),
            },
            meta: PaymentMeta { order_id: intent.order_id.clone() },
        }
    }
}

// --- Callback payloads ---

/// Terminal result reported by the gateway for one attempt.
///
/// `Success` here only means the gateway said so; the checkout view-model
/// still checks that both identifiers are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success { transaction_id: String, reference: String },
    Failed { message: String },
    Cancelled,
    Unknown { status: String },
}

// Raw callback as posted by the widget; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<Value>, // Number or string depending on the widget version
    #[serde(default)]
    pub tx_ref: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GatewayResponse {
    // Close the callback into a PaymentOutcome; a missing payload is a cancellation
    pub fn into_outcome(response: Option<GatewayResponse>) -> PaymentOutcome {
        let Some(response) = response else {
            return PaymentOutcome::Cancelled;
        };
        let status = response.status.clone().unwrap_or_default();
        tracing::info!(status = %status, tx_ref = ?response.tx_ref, amount = ?response.amount, currency = ?response.currency, "Handling gateway response");

        match status.as_str() {
            "successful" | "success" => PaymentOutcome::Success {
                transaction_id: response.transaction_id.as_ref().and_then(id_to_string).unwrap_or_default(),
                reference: response.tx_ref.unwrap_or_default(),
            },
            "failed" => PaymentOutcome::Failed {
                message: response.message.unwrap_or_else(|| "Payment failed".to_string()),
            },
            "cancelled" => PaymentOutcome::Cancelled,
            _ => PaymentOutcome::Unknown { status },
        }
    }
}

// --- Verification ---

/// Optional post-success check against the gateway or our own backend.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, transaction_id: &str, reference: &str) -> anyhow::Result<bool>;
}

// Asks the gateway's transaction API whether a reported success really happened
pub struct GatewayVerifier {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Option<VerifiedTransaction>,
}

#[derive(Debug, Deserialize)]
struct VerifiedTransaction {
    #[serde(default)]
    status: String,
    #[serde(default)]
    tx_ref: String,
}

impl GatewayVerifier {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let secret_key = settings
            .payment_secret_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("payment_secret_key is required when verify_payments is on"))?;
        Ok(GatewayVerifier {
            client: reqwest::Client::new(),
            api_url: settings.payment_api_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }
}

// Confirmed only when the gateway and the transaction both say so and the reference is ours
fn confirms(envelope: &VerifyEnvelope, reference: &str) -> bool {
    envelope.status == "success"
        && envelope
            .data
            .as_ref()
            .is_some_and(|tx| tx.status == "successful" && tx.tx_ref == reference)
}

#[async_trait]
impl PaymentVerifier for GatewayVerifier {
    async fn verify(&self, transaction_id: &str, reference: &str) -> anyhow::Result<bool> {
        let url = format!("{}/transactions/{}/verify", self.api_url, urlencoding::encode(transaction_id));
        tracing::info!("Verifying transaction {} with the gateway", transaction_id);

        let response = self.client.get(&url).bearer_auth(&self.secret_key).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Gateway verification request rejected: {}", body);
            return Ok(false);
        }

        let envelope: VerifyEnvelope = response.json().await?;
        let confirmed = confirms(&envelope, reference);
        if !confirmed {
            tracing::warn!(transaction_id, reference, ?envelope, "Gateway did not confirm the transaction");
        }
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn parse(value: Value) -> PaymentOutcome {
        GatewayResponse::into_outcome(Some(serde_json::from_value(value).unwrap()))
    }

    #[test]
    fn references_have_expected_shape_and_are_unique() {
        let refs: HashSet<String> = (0..200).map(|_| generate_reference()).collect();
        assert_eq!(refs.len(), 200);
        let sample = refs.iter().next().unwrap();
        let parts: Vec<&str> = sample.split('-').collect();
        assert_eq!(parts[0], "PM");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn successful_with_numeric_transaction_id() {
        let outcome = parse(json!({ "status": "successful", "transaction_id": 4821937, "tx_ref": "PM-1-abc" }));
        assert_eq!(
            outcome,
            PaymentOutcome::Success { transaction_id: "4821937".into(), reference: "PM-1-abc".into() }
        );
    }

    #[test]
    fn failed_without_message_gets_default() {
        assert_eq!(parse(json!({ "status": "failed" })), PaymentOutcome::Failed { message: "Payment failed".into() });
    }

    #[test]
    fn unknown_status_is_kept_for_reporting() {
        assert_eq!(
            parse(json!({ "status": "pending_review" })),
            PaymentOutcome::Unknown { status: "pending_review".into() }
        );
    }

    #[test]
    fn outcome_tag_does_not_clash_with_unknown_status() {
        let unknown = PaymentOutcome::Unknown { status: "on_hold".into() };
        let value = serde_json::to_value(&unknown).unwrap();
        assert_eq!(value, json!({ "outcome": "unknown", "status": "on_hold" }));
        assert_eq!(serde_json::from_value::<PaymentOutcome>(value).unwrap(), unknown);
    }

    #[test]
    fn missing_payload_is_cancellation() {
        assert_eq!(GatewayResponse::into_outcome(None), PaymentOutcome::Cancelled);
        assert_eq!(parse(json!({ "status": "cancelled" })), PaymentOutcome::Cancelled);
    }

    #[test]
    fn config_carries_intent_and_store_branding() {
        let settings = Settings::for_tests();
        let intent = PaymentIntent {
            amount: 45_000_000,
            currency: "NGN".into(),
            customer: CustomerContact { name: "Ada".into(), email: "ada@example.com".into(), phone: "+2348000000000".into() },
            reference: "PM-1-xyz".into(),
            order_id: Some("car_merc".into()),
        };
        let config = PaymentConfig::new(&intent, "FLWPUBK_TEST-abc", &settings);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["tx_ref"], "PM-1-xyz");
        assert_eq!(value["customer"]["phone_number"], "+2348000000000");
        assert_eq!(value["customizations"]["title"], "Prosperous Motors");
        assert_eq!(value["meta"]["orderId"], "car_merc");
        assert_eq!(value["payment_options"], "card,mobilemoney,ussd,bank_transfer");
    }

    #[test]
    fn verification_needs_matching_reference() {
        let envelope: VerifyEnvelope = serde_json::from_value(json!({
            "status": "success",
            "data": { "id": 4821937, "status": "successful", "tx_ref": "PM-1-abc", "amount": 45000000 }
        }))
        .unwrap();
        assert!(confirms(&envelope, "PM-1-abc"));
        assert!(!confirms(&envelope, "PM-2-def"));

        let pending: VerifyEnvelope =
            serde_json::from_value(json!({ "status": "success", "data": { "status": "pending", "tx_ref": "PM-1-abc" } }))
                .unwrap();
        assert!(!confirms(&pending, "PM-1-abc"));

        let error: VerifyEnvelope = serde_json::from_value(json!({ "status": "error", "message": "No transaction" })).unwrap();
        assert!(!confirms(&error, "PM-1-abc"));
    }

    #[test]
    fn verifier_requires_secret_key() {
        assert!(GatewayVerifier::new(&Settings::for_tests()).is_err());
        let settings = Settings { payment_secret_key: Some("FLWSECK_TEST-x".into()), ..Settings::for_tests() };
        assert!(GatewayVerifier::new(&settings).is_ok());
    }
}
