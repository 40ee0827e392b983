use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::event::{Amount, ModuleName};
use super::team::TeamMember;

/// Body of `POST /events/{id}/register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegistrationRequest {
    pub team_name: String,
    pub members: Vec<TeamMember>,
    pub modules: Vec<ModuleName>,
}

impl RegistrationRequest {
    /// Same team, members and module set. Selection order does not matter.
    pub fn same_registration(&self, other: &Self) -> bool {
        fn modules(r: &RegistrationRequest) -> BTreeSet<&ModuleName> {
            r.modules.iter().collect()
        }
        self.team_name == other.team_name
            && self.members == other.members
            && modules(self) == modules(other)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegistrationConfirmation {
    #[serde(default)]
    pub message: String,
}

/// Successful answer of `POST /events/{id}/discount/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DiscountQuote {
    #[serde(deserialize_with = "amount_from_number_or_string")]
    pub amount: Amount,
    #[serde(default)]
    pub message: Option<String>,
}

// Discount codes are stored with string amounts on the server side, so the
// validate endpoint may answer `{"amount": "300"}` as well as `{"amount": 300}`.
fn amount_from_number_or_string<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(Amount),
        Text(String),
    }

    match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => Ok(n),
        RawAmount::Text(s) => s
            .trim()
            .parse::<Amount>()
            .map_err(|_| serde::de::Error::custom(format!("invalid discount amount: {:?}", s))),
    }
}

/// Answer of `POST /events/{id}/payment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PaymentConfirmation {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub receipt_url: String,
    #[serde(default)]
    pub transaction_id: String,
}

/// How a payment-status lookup identifies the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Email,
    TeamName,
}

impl IdentifierKind {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            IdentifierKind::Email => "email",
            IdentifierKind::TeamName => "team_name",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Pending,
    Submitted,
    Verified,
    Rejected,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentState::Pending => write!(f, "Pending"),
            PaymentState::Submitted => write!(f, "Submitted"),
            PaymentState::Verified => write!(f, "Verified"),
            PaymentState::Rejected => write!(f, "Rejected"),
            PaymentState::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Answer of `GET /events/{id}/payment-status/{identifier}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PaymentStatus {
    pub team_name: Option<String>,
    #[serde(default)]
    pub payment_status: PaymentState,
    pub transaction_id: Option<String>,
    pub receipt_url: Option<String>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub submitted_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub modules: Vec<ModuleName>,
}

impl PaymentStatus {
    pub fn submitted_display(&self) -> String {
        match self.submitted_at {
            Some(at) => at.format("%b %d, %Y %H:%M UTC").to_string(),
            None => "not submitted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_registration_ignores_module_order() {
        let request = RegistrationRequest {
            team_name: "Falcons".to_string(),
            members: vec![TeamMember::new("Ayesha", "ayesha@uni.edu")],
            modules: vec!["Recon".into(), "Exploit".into()],
        };
        let reordered = RegistrationRequest {
            modules: vec!["Exploit".into(), "Recon".into()],
            ..request.clone()
        };
        assert!(request.same_registration(&reordered));

        let fewer = RegistrationRequest {
            modules: vec!["Recon".into()],
            ..request.clone()
        };
        assert!(!request.same_registration(&fewer));

        let renamed = RegistrationRequest {
            team_name: "Rivals".to_string(),
            ..request.clone()
        };
        assert!(!request.same_registration(&renamed));
    }

    #[test]
    fn test_payment_status_parsing() {
        let json = r#"{
            "team_name": "Falcons",
            "payment_status": "submitted",
            "transaction_id": "TXN-991",
            "receipt_url": "https://res.cloudinary.com/demo/receipt.png",
            "submitted_at": "2025-03-01T09:30:00.000000",
            "modules": ["Recon"]
        }"#;
        let status: PaymentStatus = serde_json::from_str(json).expect("status should parse");
        assert_eq!(status.payment_status, PaymentState::Submitted);
        assert_eq!(status.modules, vec![ModuleName::from("Recon")]);
        assert_eq!(status.submitted_display(), "Mar 01, 2025 09:30 UTC");
    }

    #[test]
    fn test_unknown_payment_state_is_kept() {
        let json = r#"{"team_name": "Falcons", "payment_status": "refunded", "transaction_id": null,
                       "receipt_url": null, "submitted_at": null, "modules": []}"#;
        let status: PaymentStatus = serde_json::from_str(json).expect("status should parse");
        assert_eq!(status.payment_status, PaymentState::Other("refunded".to_string()));
        assert_eq!(status.payment_status.to_string(), "refunded");
        assert_eq!(status.submitted_display(), "not submitted");
    }

    #[test]
    fn test_discount_quote_without_message() {
        let quote: DiscountQuote = serde_json::from_str(r#"{"amount": 300}"#).expect("quote should parse");
        assert_eq!(quote.amount, 300);
        assert!(quote.message.is_none());
    }

    #[test]
    fn test_discount_quote_with_string_amount() {
        let quote: DiscountQuote =
            serde_json::from_str(r#"{"amount": "250", "message": "Discount code 'X' applied!"}"#)
                .expect("quote should parse");
        assert_eq!(quote.amount, 250);
        assert!(serde_json::from_str::<DiscountQuote>(r#"{"amount": "lots"}"#).is_err());
        assert!(serde_json::from_str::<DiscountQuote>(r#"{"amount": -5}"#).is_err());
    }
}
