//! The handful of webhook payload fields the handlers act on.
//!
//! Everything else in the payloads is ignored.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Lemon Squeezy event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct LemonSqueezyEvent {
    pub meta: LemonSqueezyMeta,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LemonSqueezyMeta {
    pub event_name: String,
}

/// `data` of an `order_created` event.
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    pub id: ProviderId,
    pub attributes: OrderAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderAttributes {
    pub user_email: String,
    pub customer_id: ProviderId,
    /// Order total in the smallest currency unit
    pub total: u64,
}

/// Ids that providers send either as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProviderId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Number(n) => write!(f, "{}", n),
            ProviderId::Text(s) => f.write_str(s),
        }
    }
}

impl LemonSqueezyEvent {
    pub const ORDER_CREATED: &'static str = "order_created";

    /// The order, if this is an `order_created` event.
    pub fn order_created(&self) -> serde_json::Result<Option<Order>> {
        if self.meta.event_name != Self::ORDER_CREATED {
            return Ok(None);
        }
        Order::deserialize(&self.data).map(Some)
    }
}

/// Clerk event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// `data` of a `user.created` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ClerkEmail>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEmail {
    pub email_address: String,
}

impl ClerkEvent {
    pub const USER_CREATED: &'static str = "user.created";

    /// The user, if this is a `user.created` event.
    pub fn user_created(&self) -> serde_json::Result<Option<ClerkUser>> {
        if self.event_type != Self::USER_CREATED {
            return Ok(None);
        }
        ClerkUser::deserialize(&self.data).map(Some)
    }
}

impl ClerkUser {
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
    }

    /// `"first last"` with missing parts dropped.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_created_extraction() {
        let event: LemonSqueezyEvent = serde_json::from_value(json!({
            "meta": {"event_name": "order_created", "custom_data": null},
            "data": {
                "id": "1234",
                "type": "orders",
                "attributes": {"user_email": "a@example.com", "customer_id": 987, "total": 999}
            }
        }))
        .unwrap();

        let order = event.order_created().unwrap().unwrap();
        assert_eq!(order.id.to_string(), "1234");
        assert_eq!(order.attributes.customer_id.to_string(), "987");
        assert_eq!(order.attributes.user_email, "a@example.com");
        assert_eq!(order.attributes.total, 999);
    }

    #[test]
    fn test_other_lemon_squeezy_events_are_ignored() {
        let event: LemonSqueezyEvent = serde_json::from_value(json!({
            "meta": {"event_name": "subscription_updated"},
            "data": {"unexpected": true}
        }))
        .unwrap();
        assert!(event.order_created().unwrap().is_none());
    }

    #[test]
    fn test_malformed_order_is_an_error() {
        let event: LemonSqueezyEvent = serde_json::from_value(json!({
            "meta": {"event_name": "order_created"},
            "data": {"id": "1"}
        }))
        .unwrap();
        assert!(event.order_created().is_err());
    }

    #[test]
    fn test_clerk_user_created() {
        let event: ClerkEvent = serde_json::from_value(json!({
            "type": "user.created",
            "data": {
                "id": "user_1",
                "email_addresses": [{"email_address": "first@example.com"}, {"email_address": "second@example.com"}],
                "first_name": "Ada",
                "last_name": null
            }
        }))
        .unwrap();

        let user = event.user_created().unwrap().unwrap();
        assert_eq!(user.id, "user_1");
        assert_eq!(user.primary_email(), Some("first@example.com"));
        assert_eq!(user.display_name(), "Ada");
    }

    #[test]
    fn test_clerk_other_events_are_ignored() {
        let event: ClerkEvent =
            serde_json::from_value(json!({"type": "session.created", "data": {}})).unwrap();
        assert!(event.user_created().unwrap().is_none());
    }
}
