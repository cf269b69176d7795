//! Change notifications for the vehicle collection.
//!
//! Subscribers are not told *what* changed in a way they are expected to
//! patch; every notification means "refetch the full list".

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
}

/// Broadcast fan-out of vehicle changes. Publishing never blocks and never
/// fails; with no subscribers the change is simply dropped.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<VehicleChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        ChangeFeed { sender }
    }

    pub fn publish(&self, change: VehicleChange) {
        tracing::debug!(kind = ?change.kind, vehicle_id = ?change.vehicle_id, "Publishing vehicle change");
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VehicleChange> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_changes() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        feed.publish(VehicleChange { kind: ChangeKind::Delete, table: None, vehicle_id: Some("v1".into()) });
        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.vehicle_id.as_deref(), Some("v1"));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        ChangeFeed::default().publish(VehicleChange { kind: ChangeKind::Insert, table: None, vehicle_id: None });
    }

    #[test]
    fn webhook_payload_shape_parses() {
        let change: VehicleChange =
            serde_json::from_str(r#"{"type":"UPDATE","table":"cars","vehicle_id":"abc"}"#).unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.table.as_deref(), Some("cars"));
    }
}
