// Outbound messaging hand-off (chat links for reserve / deposit / inspect)

use serde::Serialize;

const WHATSAPP_BASE_URL: &str = "https://wa.me";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub destination: String, // Phone number in international format, digits only
    pub text: String,
}

impl OutboundMessage {
    // Click-to-chat link carrying the pre-filled text
    pub fn chat_link(&self) -> String {
        format!("{}/{}?text={}", WHATSAPP_BASE_URL, self.destination, urlencoding::encode(&self.text))
    }
}

/// Fire-and-forget messaging collaborator. Nothing flows back.
pub trait Messenger: Send + Sync {
    fn send(&self, message: &OutboundMessage);
}

// Hands messages to the customer's chat app through a click-to-chat link
pub struct ChatLinkMessenger;

impl Messenger for ChatLinkMessenger {
    fn send(&self, message: &OutboundMessage) {
        tracing::info!(destination = %message.destination, link = %message.chat_link(), "Handing off chat message");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    // Records every message for assertions
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<OutboundMessage>>,
    }

    impl Messenger for RecordingMessenger {
        fn send(&self, message: &OutboundMessage) {
            self.sent.lock().unwrap().push(message.clone());
        }
    }
}
