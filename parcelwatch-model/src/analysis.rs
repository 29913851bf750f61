use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::order::OrderStatus;

/// Classification the analyzer assigns to a relevant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    OrderConfirmation,
    ShipmentConfirmation,
    ShipmentUpdate,
    DeliveryConfirmation,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::OrderConfirmation => "order_confirmation",
            EmailType::ShipmentConfirmation => "shipment_confirmation",
            EmailType::ShipmentUpdate => "shipment_update",
            EmailType::DeliveryConfirmation => "delivery_confirmation",
        }
    }
}

impl std::str::FromStr for EmailType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_confirmation" => Ok(EmailType::OrderConfirmation),
            "shipment_confirmation" => Ok(EmailType::ShipmentConfirmation),
            "shipment_update" => Ok(EmailType::ShipmentUpdate),
            "delivery_confirmation" => Ok(EmailType::DeliveryConfirmation),
            other => Err(ModelError::InvalidEmailType(other.to_string())),
        }
    }
}

fn default_quantity() -> i32 {
    1
}

/// A line item extracted from the message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Structured output the analyzer returns for one captured message.
///
/// This mirrors the JSON contract the LLM is instructed to emit; serde
/// rejects anything that does not conform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub is_relevant: bool,
    #[serde(default)]
    pub email_type: Option<EmailType>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub vendor_domain: Option<String>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// `YYYY-MM-DD`, as emitted by the model.
    #[serde(default)]
    pub order_date: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<AnalyzedItem>>,
}

impl EmailAnalysis {
    /// A message only counts as relevant when the model extracted at least
    /// one of the two identifiers we can anchor an order on.
    pub fn is_actionable(&self) -> bool {
        self.is_relevant && (self.order_number.is_some() || self.tracking_number.is_some())
    }

    pub fn order_date_parsed(&self) -> Option<NaiveDate> {
        parse_iso_date(self.order_date.as_deref())
    }

    pub fn estimated_delivery_parsed(&self) -> Option<NaiveDate> {
        parse_iso_date(self.estimated_delivery.as_deref())
    }
}

/// Parse a `YYYY-MM-DD` string, returning `None` on any failure.
pub fn parse_iso_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_requires_an_identifier() {
        let mut analysis = EmailAnalysis {
            is_relevant: true,
            ..Default::default()
        };
        assert!(!analysis.is_actionable());

        analysis.order_number = Some("ORD-1".into());
        assert!(analysis.is_actionable());

        analysis.order_number = None;
        analysis.tracking_number = Some("1Z999".into());
        assert!(analysis.is_actionable());

        analysis.is_relevant = false;
        assert!(!analysis.is_actionable());
    }

    #[test]
    fn deserializes_the_llm_contract() {
        let json = r#"{
            "is_relevant": true,
            "email_type": "order_confirmation",
            "order_number": "ORD-500",
            "tracking_number": null,
            "carrier": null,
            "vendor_name": "Amazon",
            "vendor_domain": "amazon.com",
            "status": "ordered",
            "order_date": "2026-07-01",
            "estimated_delivery": null,
            "total_amount": 59.99,
            "currency": "EUR",
            "items": [{"name": "Keyboard", "quantity": 1, "price": 59.99}]
        }"#;
        let analysis: EmailAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.status, Some(OrderStatus::Ordered));
        assert_eq!(
            analysis.order_date_parsed(),
            NaiveDate::from_ymd_opt(2026, 7, 1)
        );
        assert_eq!(analysis.items.as_ref().unwrap()[0].quantity, 1);
    }

    #[test]
    fn rejects_unknown_status_values() {
        let json = r#"{"is_relevant": true, "status": "teleported"}"#;
        assert!(serde_json::from_str::<EmailAnalysis>(json).is_err());
    }

    #[test]
    fn malformed_dates_parse_to_none() {
        assert_eq!(parse_iso_date(Some("07/01/2026")), None);
        assert_eq!(parse_iso_date(Some("")), None);
        assert_eq!(parse_iso_date(None), None);
    }
}
