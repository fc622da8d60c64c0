//! Messages as seen by a consumer.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::HandlerError;

/// A message delivered to a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Broker-assigned tag, unique per delivery attempt.
    pub delivery_tag: u64,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// JSON body.
    pub payload: serde_json::Value,
    /// When the publisher emitted the message.
    pub emitted_at: DateTime<Utc>,
    /// True if this message was handed out before and not acknowledged.
    pub redelivered: bool,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

impl Delivery {
    /// Deserializes the payload, mapping failures to [`HandlerError::Malformed`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            HandlerError::Malformed(format!("payload on '{}': {e}", self.routing_key))
        })
    }

    /// Returns the copy handed out when this delivery is requeued.
    pub(crate) fn redelivery(mut self, delivery_tag: u64) -> Self {
        self.delivery_tag = delivery_tag;
        self.redelivered = true;
        self.attempt += 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Body {
        id: u64,
    }

    fn delivery(payload: serde_json::Value) -> Delivery {
        Delivery {
            delivery_tag: 1,
            routing_key: "order.created".to_string(),
            payload,
            emitted_at: Utc::now(),
            redelivered: false,
            attempt: 1,
        }
    }

    #[test]
    fn decode_reads_payload() {
        let d = delivery(serde_json::json!({ "id": 5 }));
        assert_eq!(d.decode::<Body>().unwrap(), Body { id: 5 });
    }

    #[test]
    fn decode_failure_is_malformed() {
        let d = delivery(serde_json::json!("nope"));
        let err = d.decode::<Body>().unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("order.created"));
    }

    #[test]
    fn redelivery_bumps_attempt_and_flags() {
        let d = delivery(serde_json::json!({})).redelivery(9);
        assert_eq!(d.delivery_tag, 9);
        assert_eq!(d.attempt, 2);
        assert!(d.redelivered);
    }
}
