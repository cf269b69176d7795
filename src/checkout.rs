// Checkout: one purchase attempt from intent selection to a terminal payment outcome

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::Settings;
use crate::messaging::{Messenger, OutboundMessage};
use crate::models::{
    deposit_amount, format_naira, CustomerContact, NewOrder, OrderItem, OrderStatus, Vehicle,
};
use crate::payment::{
    generate_reference, GatewayResponse, PaymentConfig, PaymentIntent, PaymentOutcome, PaymentVerifier,
};

const MALFORMED_SUCCESS: &str = "malformed success response";
const IDLE_ATTEMPT_TTL: Duration = Duration::from_secs(60 * 60);
// A widget that never reports back counts as closed after this long
const PENDING_ATTEMPT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),
    #[error("payment unavailable: {0}")]
    Configuration(String),
    #[error("external failure: {0}")]
    ExternalFailure(anyhow::Error),
    #[error("cannot {operation} while {state}")]
    InvalidTransition { operation: &'static str, state: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutAction {
    Reserve,
    Deposit,
    Inspect,
    Enquiry,
    Pay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    IntentSelected { action: CheckoutAction },
    FormInput,
    PaymentPending { intent: PaymentIntent },
    Succeeded { transaction_id: String, reference: String },
    Failed { message: String },
    Cancelled,
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Idle => "idle",
            CheckoutState::IntentSelected { .. } => "intent selected",
            CheckoutState::FormInput => "awaiting payment form",
            CheckoutState::PaymentPending { .. } => "payment pending",
            CheckoutState::Succeeded { .. } => "succeeded",
            CheckoutState::Failed { .. } => "failed",
            CheckoutState::Cancelled => "cancelled",
        }
    }
}

// User-facing notification produced by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Notification {
    Success(String),
    Info(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentOutcome {
    // Reserve / deposit / inspect / enquiry: handed to the messenger, nothing further
    MessageSent { message: OutboundMessage },
    AwaitingPaymentForm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub intent: PaymentIntent,
    pub transaction_id: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    // Nothing was pending: duplicate or late callback
    Ignored,
    Succeeded(PaymentReceipt),
    Failed { message: String },
    Cancelled,
}

// Pre-formatted chat text for the non-payment intents
pub fn intent_message(action: CheckoutAction, vehicle: &Vehicle) -> Option<String> {
    let name = format!("{} {} ({})", vehicle.brand, vehicle.model, vehicle.year);
    match action {
        CheckoutAction::Reserve => Some(format!(
            "Hi, I'd like to reserve the {} priced at {}.",
            name,
            format_naira(vehicle.price)
        )),
        CheckoutAction::Deposit => Some(format!(
            "I'm interested in making a 50% deposit ({}) for the {}.",
            format_naira(deposit_amount(vehicle.price)),
            name
        )),
        CheckoutAction::Inspect => Some(format!("I'd like to schedule an inspection for the {}.", name)),
        CheckoutAction::Enquiry => Some(format!("Hi, I have general enquiries about the {}.", name)),
        CheckoutAction::Pay => None,
    }
}

// --- View-model ---

pub struct CheckoutViewModel {
    vehicle: Vehicle,
    settings: Arc<Settings>,
    messenger: Arc<dyn Messenger>,
    state: CheckoutState,
    notifications: Vec<Notification>,
}

impl CheckoutViewModel {
    pub fn new(vehicle: Vehicle, settings: Arc<Settings>, messenger: Arc<dyn Messenger>) -> Self {
        CheckoutViewModel { vehicle, settings, messenger, state: CheckoutState::Idle, notifications: Vec::new() }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, CheckoutState::PaymentPending { .. })
    }

    // False when the gateway key is missing: the pay control is shown disabled
    pub fn payment_available(&self) -> bool {
        self.settings.payment_public_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn invalid(&self, operation: &'static str) -> CheckoutError {
        CheckoutError::InvalidTransition { operation, state: self.state.name() }
    }

    pub fn select_intent(&mut self, action: CheckoutAction) -> Result<IntentOutcome, CheckoutError> {
        if self.is_pending() {
            return Err(self.invalid("select an intent"));
        }
        self.state = CheckoutState::IntentSelected { action };
        tracing::info!(vehicle_id = %self.vehicle.id, ?action, "Checkout intent selected");

        match intent_message(action, &self.vehicle) {
            Some(text) => {
                let message = OutboundMessage { destination: self.settings.whatsapp_number.clone(), text };
                self.messenger.send(&message);
                self.state = CheckoutState::Idle;
                Ok(IntentOutcome::MessageSent { message })
            }
            None => {
                if self.vehicle.is_sold {
                    self.state = CheckoutState::Idle;
                    return Err(CheckoutError::Validation("This vehicle has already been sold".into()));
                }
                self.state = CheckoutState::FormInput;
                Ok(IntentOutcome::AwaitingPaymentForm)
            }
        }
    }

    /// Validate the buyer's contact details and open a payment attempt.
    ///
    /// Nothing is built for the gateway unless every local check passes.
    pub fn submit_payment_form(&mut self, customer: &CustomerContact) -> Result<PaymentConfig, CheckoutError> {
        if self.state != CheckoutState::FormInput {
            return Err(self.invalid("submit the payment form"));
        }

        let customer = customer.validated().map_err(|missing| {
            CheckoutError::Validation(format!("Missing required contact fields: {}", missing.join(", ")))
        })?;
        if self.vehicle.price <= 0 {
            return Err(CheckoutError::Validation("Amount must be greater than 0".into()));
        }
        let public_key = self
            .settings
            .payment_public_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CheckoutError::Configuration("payment gateway public key is not configured".into()))?;

        let intent = PaymentIntent {
            amount: self.vehicle.price,
            currency: self.settings.currency.clone(),
            customer,
            reference: generate_reference(),
            order_id: Some(format!("car_{}_{}", self.vehicle.id, chrono::Utc::now().timestamp_millis())),
        };
        tracing::info!(amount = intent.amount, currency = %intent.currency, reference = %intent.reference, "Creating payment intent");

        let config = PaymentConfig::new(&intent, &public_key, &self.settings);
        self.state = CheckoutState::PaymentPending { intent };
        Ok(config)
    }

    /// Translate the gateway's verdict into a terminal state.
    ///
    /// Only an attempt in `PaymentPending` is reconciled; anything else
    /// (duplicate callback, late callback after close) is ignored.
    pub fn reconcile(&mut self, outcome: PaymentOutcome) -> Reconciled {
        let intent = match &self.state {
            CheckoutState::PaymentPending { intent } => intent.clone(),
            other => {
                tracing::debug!(state = other.name(), "Ignoring payment outcome outside of a pending attempt");
                return Reconciled::Ignored;
            }
        };

        match outcome {
            PaymentOutcome::Success { transaction_id, reference }
                if !transaction_id.trim().is_empty() && !reference.trim().is_empty() =>
            {
                if reference != intent.reference {
                    tracing::warn!(expected = %intent.reference, got = %reference, "Gateway reference differs from intent");
                }
                tracing::info!("Payment successful, transaction ID: {}", transaction_id);
                self.notifications
                    .push(Notification::Success(format!("Payment successful! Transaction ID: {}", transaction_id)));
                self.state = CheckoutState::Succeeded { transaction_id: transaction_id.clone(), reference: reference.clone() };
                Reconciled::Succeeded(PaymentReceipt { intent, transaction_id, reference })
            }
            PaymentOutcome::Success { .. } => {
                tracing::warn!("Success reported without transaction id or reference");
                self.fail(MALFORMED_SUCCESS.to_string())
            }
            PaymentOutcome::Failed { message } => self.fail(message),
            PaymentOutcome::Unknown { status } => {
                tracing::warn!("Unknown payment status: {}", status);
                self.fail(format!("Unknown payment status: {}", status))
            }
            PaymentOutcome::Cancelled => {
                tracing::info!("Payment cancelled by user");
                self.notifications.push(Notification::Info("Payment cancelled".into()));
                self.state = CheckoutState::Cancelled;
                Reconciled::Cancelled
            }
        }
    }

    fn fail(&mut self, message: String) -> Reconciled {
        tracing::error!("Payment failed: {}", message);
        self.notifications.push(Notification::Error(message.clone()));
        self.state = CheckoutState::Failed { message: message.clone() };
        Reconciled::Failed { message }
    }

    // The payment modal was closed before an outcome arrived
    pub fn close_modal(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        tracing::info!("Payment modal closed before an outcome arrived");
        self.notifications.push(Notification::Info("Payment cancelled".into()));
        self.state = CheckoutState::Idle;
        true
    }

    // Retry after a non-success outcome; a paid attempt stays paid
    pub fn reset(&mut self) -> Result<(), CheckoutError> {
        if self.is_pending() || matches!(self.state, CheckoutState::Succeeded { .. }) {
            return Err(self.invalid("reset"));
        }
        self.state = CheckoutState::Idle;
        Ok(())
    }
}

// --- Attempt registry ---

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub attempt_id: Option<Uuid>,
    #[serde(flatten)]
    pub state: CheckoutState,
    pub notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

struct Attempt {
    vm: Arc<Mutex<CheckoutViewModel>>,
    touched: Instant,
}

/// Holds in-flight attempts for the HTTP layer.
///
/// Each attempt has its own lock, so duplicate gateway callbacks for the same
/// attempt are processed one after another and the second one is a no-op.
pub struct CheckoutService {
    backend: Arc<dyn Backend>,
    messenger: Arc<dyn Messenger>,
    verifier: Option<Arc<dyn PaymentVerifier>>,
    settings: Arc<Settings>,
    attempts: Mutex<HashMap<Uuid, Attempt>>,
}

impl CheckoutService {
    pub fn new(
        backend: Arc<dyn Backend>,
        messenger: Arc<dyn Messenger>,
        verifier: Option<Arc<dyn PaymentVerifier>>,
        settings: Arc<Settings>,
    ) -> Self {
        CheckoutService { backend, messenger, verifier, settings, attempts: Mutex::new(HashMap::new()) }
    }

    async fn attempt(&self, id: Uuid) -> Option<Arc<Mutex<CheckoutViewModel>>> {
        let mut attempts = self.attempts.lock().await;
        attempts.get_mut(&id).map(|attempt| {
            attempt.touched = Instant::now();
            attempt.vm.clone()
        })
    }

    async fn prune(&self) {
        self.prune_at(Instant::now()).await
    }

    // Drop attempts nobody has touched for a while. Pending ones get a longer
    // grace period; one that is locked right now is in use and stays.
    async fn prune_at(&self, now: Instant) {
        let mut attempts = self.attempts.lock().await;
        let before = attempts.len();
        attempts.retain(|id, attempt| {
            let Ok(vm) = attempt.vm.try_lock() else {
                return true;
            };
            let idle = now.saturating_duration_since(attempt.touched);
            if !vm.is_pending() {
                return idle < IDLE_ATTEMPT_TTL;
            }
            if idle < PENDING_ATTEMPT_TTL {
                return true;
            }
            tracing::info!(attempt_id = %id, "Abandoned payment attempt closed after {:?}", idle);
            false
        });
        if attempts.len() != before {
            tracing::debug!("Pruned {} stale checkout attempts", before - attempts.len());
        }
    }

    pub async fn start(&self, vehicle_id: &str, action: CheckoutAction) -> Result<CheckoutView, CheckoutError> {
        self.prune().await;

        let vehicle = self
            .backend
            .fetch_vehicle(vehicle_id)
            .await
            .map_err(|e| CheckoutError::ExternalFailure(anyhow::Error::new(e)))?
            .ok_or_else(|| CheckoutError::Validation(format!("Vehicle '{}' not found", vehicle_id)))?;

        let mut vm = CheckoutViewModel::new(vehicle, self.settings.clone(), self.messenger.clone());
        let outcome = vm.select_intent(action)?;
        let notifications = vm.take_notifications();

        match outcome {
            IntentOutcome::MessageSent { message } => Ok(CheckoutView {
                attempt_id: None,
                state: vm.state().clone(),
                notifications,
                chat_link: Some(message.chat_link()),
                order_id: None,
            }),
            IntentOutcome::AwaitingPaymentForm => {
                if !vm.payment_available() {
                    return Err(CheckoutError::Configuration("payment gateway public key is not configured".into()));
                }
                let id = Uuid::new_v4();
                let state = vm.state().clone();
                self.attempts
                    .lock()
                    .await
                    .insert(id, Attempt { vm: Arc::new(Mutex::new(vm)), touched: Instant::now() });
                tracing::info!(attempt_id = %id, "Checkout attempt opened");
                Ok(CheckoutView { attempt_id: Some(id), state, notifications, chat_link: None, order_id: None })
            }
        }
    }

    pub async fn submit(&self, id: Uuid, customer: &CustomerContact) -> Result<Option<PaymentConfig>, CheckoutError> {
        let Some(vm) = self.attempt(id).await else {
            return Ok(None);
        };
        let mut vm = vm.lock().await;
        vm.submit_payment_form(customer).map(Some)
    }

    /// Handle a gateway callback for one attempt.
    ///
    /// With verification switched on, a reported success is checked first and
    /// downgraded to a failure when the check does not confirm it.
    pub async fn callback(&self, id: Uuid, response: Option<GatewayResponse>) -> Option<CheckoutView> {
        let vm = self.attempt(id).await?;
        let mut vm = vm.lock().await;

        let mut outcome = GatewayResponse::into_outcome(response);
        let verification = match (&self.verifier, &outcome) {
            (Some(verifier), PaymentOutcome::Success { transaction_id, reference }) if vm.is_pending() => {
                Some(verifier.verify(transaction_id, reference).await)
            }
            _ => None,
        };
        match verification {
            Some(Ok(false)) => {
                outcome = PaymentOutcome::Failed { message: "Payment could not be verified".into() };
            }
            Some(Err(e)) => {
                tracing::error!("Payment verification error: {:?}", e);
                outcome = PaymentOutcome::Failed { message: "Payment verification failed".into() };
            }
            _ => {}
        }

        let mut order_id = None;
        if let Reconciled::Succeeded(receipt) = vm.reconcile(outcome) {
            order_id = self.record_order(vm.vehicle(), &receipt).await;
        }

        Some(CheckoutView {
            attempt_id: Some(id),
            state: vm.state().clone(),
            notifications: vm.take_notifications(),
            chat_link: None,
            order_id,
        })
    }

    pub async fn close(&self, id: Uuid) -> Option<CheckoutView> {
        let vm = self.attempt(id).await?;
        let mut vm = vm.lock().await;
        vm.close_modal();
        Some(CheckoutView {
            attempt_id: Some(id),
            state: vm.state().clone(),
            notifications: vm.take_notifications(),
            chat_link: None,
            order_id: None,
        })
    }

    pub async fn reset(&self, id: Uuid) -> Result<Option<CheckoutView>, CheckoutError> {
        let Some(vm) = self.attempt(id).await else {
            return Ok(None);
        };
        let mut vm = vm.lock().await;
        vm.reset()?;
        // Back to the form so the buyer can retry straight away
        vm.select_intent(CheckoutAction::Pay)?;
        Ok(Some(CheckoutView {
            attempt_id: Some(id),
            state: vm.state().clone(),
            notifications: vm.take_notifications(),
            chat_link: None,
            order_id: None,
        }))
    }

    // Success side effect. A failure here is logged; the payment already stands.
    async fn record_order(&self, vehicle: &Vehicle, receipt: &PaymentReceipt) -> Option<String> {
        let order = NewOrder {
            customer_name: receipt.intent.customer.name.clone(),
            customer_email: receipt.intent.customer.email.clone(),
            customer_phone: receipt.intent.customer.phone.clone(),
            items: vec![OrderItem {
                vehicle_id: vehicle.id.clone(),
                title: vehicle.title(),
                price: vehicle.price,
                quantity: 1,
            }],
            total_amount: receipt.intent.amount,
            status: OrderStatus::Confirmed,
            notes: Some(format!(
                "Paid online. Transaction {} / reference {}",
                receipt.transaction_id, receipt.reference
            )),
        };
        match self.backend.create_order(&order).await {
            Ok(created) => {
                tracing::info!(order_id = %created.id, "Recorded order for paid vehicle {}", vehicle.id);
                Some(created.id)
            }
            Err(e) => {
                tracing::error!("Failed to record order after successful payment: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::messaging::testing::RecordingMessenger;

    fn s_class() -> Vehicle {
        Vehicle {
            id: "merc".into(),
            brand: "Mercedes-Benz".into(),
            model: "S-Class".into(),
            year: 2024,
            price: 45_000_000,
            is_featured: true,
            ..Default::default()
        }
    }

    fn contact() -> CustomerContact {
        CustomerContact { name: "Ada Obi".into(), email: "ada@example.com".into(), phone: "+2348000000000".into() }
    }

    fn view_model(vehicle: Vehicle) -> (CheckoutViewModel, Arc<RecordingMessenger>) {
        let messenger = Arc::new(RecordingMessenger::default());
        let vm = CheckoutViewModel::new(vehicle, Arc::new(Settings::for_tests()), messenger.clone());
        (vm, messenger)
    }

    fn pending_vm() -> (CheckoutViewModel, String) {
        let (mut vm, _) = view_model(s_class());
        vm.select_intent(CheckoutAction::Pay).unwrap();
        let config = vm.submit_payment_form(&contact()).unwrap();
        (vm, config.tx_ref)
    }

    #[test]
    fn deposit_message_states_half_the_price() {
        let (mut vm, messenger) = view_model(s_class());
        let outcome = vm.select_intent(CheckoutAction::Deposit).unwrap();

        let IntentOutcome::MessageSent { message } = outcome else {
            panic!("deposit should hand off a message");
        };
        assert!(message.text.contains("₦22,500,000"), "{}", message.text);
        assert!(message.text.contains("Mercedes-Benz S-Class (2024)"));
        assert_eq!(message.destination, "2348012345678");
        assert_eq!(messenger.sent.lock().unwrap().len(), 1);
        assert_eq!(vm.state(), &CheckoutState::Idle);
    }

    #[test]
    fn reserve_and_inspect_are_terminal_hand_offs() {
        let (mut vm, messenger) = view_model(s_class());
        vm.select_intent(CheckoutAction::Reserve).unwrap();
        vm.select_intent(CheckoutAction::Inspect).unwrap();
        let sent = messenger.sent.lock().unwrap();
        assert!(sent[0].text.contains("reserve") && sent[0].text.contains("₦45,000,000"));
        assert!(sent[1].text.contains("inspection"));
        assert_eq!(vm.state(), &CheckoutState::Idle);
    }

    #[test]
    fn pay_moves_to_form_input() {
        let (mut vm, messenger) = view_model(s_class());
        assert_eq!(vm.select_intent(CheckoutAction::Pay).unwrap(), IntentOutcome::AwaitingPaymentForm);
        assert_eq!(vm.state(), &CheckoutState::FormInput);
        assert!(messenger.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn sold_vehicle_cannot_be_paid_for() {
        let (mut vm, _) = view_model(Vehicle { is_sold: true, ..s_class() });
        assert!(matches!(vm.select_intent(CheckoutAction::Pay), Err(CheckoutError::Validation(_))));
        assert_eq!(vm.state(), &CheckoutState::Idle);
    }

    #[test]
    fn any_blank_contact_field_blocks_the_intent() {
        let blanks = [
            CustomerContact { name: " ".into(), ..contact() },
            CustomerContact { email: "".into(), ..contact() },
            CustomerContact { phone: "".into(), ..contact() },
        ];
        for customer in blanks {
            let (mut vm, _) = view_model(s_class());
            vm.select_intent(CheckoutAction::Pay).unwrap();
            let err = vm.submit_payment_form(&customer).unwrap_err();
            assert!(matches!(err, CheckoutError::Validation(_)));
            assert_eq!(vm.state(), &CheckoutState::FormInput);
        }
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let (mut vm, _) = view_model(Vehicle { price: 0, ..s_class() });
        vm.select_intent(CheckoutAction::Pay).unwrap();
        assert!(matches!(vm.submit_payment_form(&contact()), Err(CheckoutError::Validation(_))));
        assert!(!vm.is_pending());
    }

    #[test]
    fn missing_gateway_key_is_a_configuration_error() {
        let settings = Settings { payment_public_key: None, ..Settings::for_tests() };
        let mut vm = CheckoutViewModel::new(s_class(), Arc::new(settings), Arc::new(RecordingMessenger::default()));
        assert!(!vm.payment_available());
        vm.select_intent(CheckoutAction::Pay).unwrap();
        assert!(matches!(vm.submit_payment_form(&contact()), Err(CheckoutError::Configuration(_))));
    }

    #[test]
    fn each_attempt_gets_a_fresh_reference() {
        let (vm_a, ref_a) = pending_vm();
        let (_, ref_b) = pending_vm();
        assert_ne!(ref_a, ref_b);
        let CheckoutState::PaymentPending { intent } = vm_a.state() else {
            panic!("expected pending");
        };
        assert_eq!(intent.amount, 45_000_000);
        assert_eq!(intent.reference, ref_a);
    }

    #[test]
    fn duplicate_success_fires_side_effect_once() {
        let (mut vm, reference) = pending_vm();
        let outcome = PaymentOutcome::Success { transaction_id: "48219".into(), reference };

        let first = vm.reconcile(outcome.clone());
        let second = vm.reconcile(outcome);
        assert!(matches!(first, Reconciled::Succeeded(_)));
        assert_eq!(second, Reconciled::Ignored);

        let notifications = vm.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(&notifications[0], Notification::Success(m) if m.contains("48219")));
    }

    #[test]
    fn success_without_transaction_id_is_a_failure() {
        let (mut vm, _) = pending_vm();
        let result = vm.reconcile(PaymentOutcome::Success { transaction_id: "".into(), reference: "TX1".into() });
        assert_eq!(result, Reconciled::Failed { message: "malformed success response".into() });
        assert_eq!(vm.state(), &CheckoutState::Failed { message: "malformed success response".into() });
    }

    #[test]
    fn unknown_status_is_echoed_in_failure() {
        let (mut vm, _) = pending_vm();
        vm.reconcile(PaymentOutcome::Unknown { status: "on_hold".into() });
        assert_eq!(vm.state(), &CheckoutState::Failed { message: "Unknown payment status: on_hold".into() });
        assert_eq!(vm.take_notifications(), vec![Notification::Error("Unknown payment status: on_hold".into())]);
    }

    #[test]
    fn cancellation_is_informational() {
        let (mut vm, _) = pending_vm();
        assert_eq!(vm.reconcile(PaymentOutcome::Cancelled), Reconciled::Cancelled);
        assert_eq!(vm.take_notifications(), vec![Notification::Info("Payment cancelled".into())]);
    }

    #[test]
    fn closing_the_modal_returns_to_idle_and_late_callbacks_are_ignored() {
        let (mut vm, reference) = pending_vm();
        assert!(vm.close_modal());
        assert_eq!(vm.state(), &CheckoutState::Idle);
        assert!(!vm.close_modal());

        let late = vm.reconcile(PaymentOutcome::Success { transaction_id: "1".into(), reference });
        assert_eq!(late, Reconciled::Ignored);
        assert_eq!(vm.take_notifications().len(), 1);
    }

    #[test]
    fn reconcile_outside_pending_is_a_no_op() {
        let (mut vm, _) = view_model(s_class());
        assert_eq!(vm.reconcile(PaymentOutcome::Cancelled), Reconciled::Ignored);
        assert_eq!(vm.state(), &CheckoutState::Idle);
    }

    #[test]
    fn failed_attempt_can_be_retried() {
        let (mut vm, _) = pending_vm();
        vm.reconcile(PaymentOutcome::Failed { message: "Insufficient funds".into() });
        assert!(vm.reset().is_ok());
        vm.select_intent(CheckoutAction::Pay).unwrap();
        assert!(vm.submit_payment_form(&contact()).is_ok());
        assert!(vm.is_pending());
    }

    #[test]
    fn pending_attempt_cannot_be_reset() {
        let (mut vm, _) = pending_vm();
        assert!(matches!(vm.reset(), Err(CheckoutError::InvalidTransition { .. })));
    }

    #[test]
    fn paid_attempt_cannot_be_reset() {
        let (mut vm, tx_ref) = pending_vm();
        vm.reconcile(PaymentOutcome::Success { transaction_id: "991".into(), reference: tx_ref });
        assert!(matches!(vm.state(), CheckoutState::Succeeded { .. }));
        assert!(matches!(vm.reset(), Err(CheckoutError::InvalidTransition { operation: "reset", .. })));
        assert!(matches!(vm.state(), CheckoutState::Succeeded { .. }));
    }

    // --- Service ---

    fn service(backend: InMemoryBackend) -> CheckoutService {
        CheckoutService::new(
            Arc::new(backend),
            Arc::new(RecordingMessenger::default()),
            None,
            Arc::new(Settings::for_tests()),
        )
    }

    fn gateway_success(tx_ref: &str) -> Option<GatewayResponse> {
        Some(GatewayResponse {
            status: Some("successful".into()),
            transaction_id: Some(serde_json::json!(991)),
            tx_ref: Some(tx_ref.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn duplicate_callbacks_record_a_single_order() {
        let backend = InMemoryBackend::with_vehicles(vec![s_class()]);
        let service = service(backend.clone());

        let started = service.start("merc", CheckoutAction::Pay).await.unwrap();
        let id = started.attempt_id.unwrap();
        let config = service.submit(id, &contact()).await.unwrap().unwrap();

        let first = service.callback(id, gateway_success(&config.tx_ref)).await.unwrap();
        let second = service.callback(id, gateway_success(&config.tx_ref)).await.unwrap();

        assert!(matches!(first.state, CheckoutState::Succeeded { .. }));
        assert!(first.order_id.is_some());
        assert!(second.notifications.is_empty());
        assert!(second.order_id.is_none());

        let orders = backend.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].total_amount, 45_000_000);
        assert_eq!(orders[0].status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn paid_attempt_cannot_be_paid_again() {
        let backend = InMemoryBackend::with_vehicles(vec![s_class()]);
        let service = service(backend.clone());

        let id = service.start("merc", CheckoutAction::Pay).await.unwrap().attempt_id.unwrap();
        let config = service.submit(id, &contact()).await.unwrap().unwrap();
        service.callback(id, gateway_success(&config.tx_ref)).await.unwrap();

        assert!(matches!(service.reset(id).await, Err(CheckoutError::InvalidTransition { .. })));
        assert!(service.submit(id, &contact()).await.is_err());
        assert_eq!(backend.orders().len(), 1);
    }

    #[tokio::test]
    async fn abandoned_payments_are_eventually_pruned() {
        let service = service(InMemoryBackend::with_vehicles(vec![s_class()]));
        for _ in 0..3 {
            let id = service.start("merc", CheckoutAction::Pay).await.unwrap().attempt_id.unwrap();
            service.submit(id, &contact()).await.unwrap().unwrap();
        }
        // Left on the contact form
        service.start("merc", CheckoutAction::Pay).await.unwrap();
        assert_eq!(service.attempts.lock().await.len(), 4);

        service.prune_at(Instant::now() + Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(service.attempts.lock().await.len(), 3);

        service.prune_at(Instant::now() + Duration::from_secs(30 * 24 * 60 * 60)).await;
        assert!(service.attempts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn message_intents_do_not_open_attempts() {
        let service = service(InMemoryBackend::with_vehicles(vec![s_class()]));
        let view = service.start("merc", CheckoutAction::Deposit).await.unwrap();
        assert!(view.attempt_id.is_none());
        assert!(view.chat_link.unwrap().starts_with("https://wa.me/2348012345678?text="));
    }

    #[tokio::test]
    async fn unknown_vehicle_is_a_validation_error() {
        let service = service(InMemoryBackend::new());
        assert!(matches!(service.start("ghost", CheckoutAction::Pay).await, Err(CheckoutError::Validation(_))));
    }

    struct RejectAll;

    #[async_trait::async_trait]
    impl PaymentVerifier for RejectAll {
        async fn verify(&self, _: &str, _: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn failed_verification_downgrades_success() {
        let backend = InMemoryBackend::with_vehicles(vec![s_class()]);
        let service = CheckoutService::new(
            Arc::new(backend.clone()),
            Arc::new(RecordingMessenger::default()),
            Some(Arc::new(RejectAll)),
            Arc::new(Settings::for_tests()),
        );
        let id = service.start("merc", CheckoutAction::Pay).await.unwrap().attempt_id.unwrap();
        let config = service.submit(id, &contact()).await.unwrap().unwrap();

        let view = service.callback(id, gateway_success(&config.tx_ref)).await.unwrap();
        assert_eq!(view.state, CheckoutState::Failed { message: "Payment could not be verified".into() });
        assert!(backend.orders().is_empty());
    }
}
