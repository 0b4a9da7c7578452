//! Order Model

use serde::{Deserialize, Serialize};

/// Order status as reported by the commerce backend
///
/// Only [`OrderStatus::Processing`] is actionable (notify + print).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    /// Any status this build does not know about
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Whether this status triggers notification and printing
    pub fn is_actionable(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }
}

/// Order line (product row on the receipt)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderLine {
    pub name: String,
    pub quantity: i32,
    /// Line total, formatted by the backend
    pub total: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Monetary and content fields (opaque to the polling engine)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderContent {
    #[serde(default)]
    pub currency: String,
    /// Order total, formatted by the backend
    #[serde(default)]
    pub total: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_note: Option<String>,
    #[serde(default)]
    pub shipping_method: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    /// Human-facing order number
    pub number: String,
    pub status: OrderStatus,
    /// Creation time (Unix millis)
    pub created_at: i64,
    /// Receipt has been printed (authoritative value lives in the local store)
    #[serde(default)]
    pub printed: bool,
    /// User has been notified about this order
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub content: OrderContent,
}

impl Order {
    /// Create a bare order (content left empty)
    pub fn new(
        id: impl Into<String>,
        number: impl Into<String>,
        status: OrderStatus,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            number: number.into(),
            status,
            created_at,
            printed: false,
            notified: false,
            content: OrderContent::default(),
        }
    }

    /// Take the printed/notified flags from the authoritative local record
    ///
    /// Flags only ever move from `false` to `true`.
    pub fn merge_local_flags(&mut self, local: &Order) {
        self.printed |= local.printed;
        self.notified |= local.notified;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_actionable() {
        assert!(OrderStatus::Processing.is_actionable());
        assert!(!OrderStatus::Pending.is_actionable());
        assert!(!OrderStatus::Completed.is_actionable());
    }

    #[test]
    fn test_unknown_status_deserializes_as_other() {
        let status: OrderStatus = serde_json::from_str("\"checkout-draft\"").unwrap();
        assert_eq!(status, OrderStatus::Other);
        let status: OrderStatus = serde_json::from_str("\"on-hold\"").unwrap();
        assert_eq!(status, OrderStatus::OnHold);
    }

    #[test]
    fn test_merge_local_flags_never_clears() {
        let mut remote = Order::new("1", "1001", OrderStatus::Processing, 0);
        let mut local = remote.clone();
        local.printed = true;

        remote.merge_local_flags(&local);
        assert!(remote.printed);
        assert!(!remote.notified);

        remote.merge_local_flags(&Order::new("1", "1001", OrderStatus::Processing, 0));
        assert!(remote.printed);
    }
}
