//! WebSocket protocol message types.
//!
//! Defines the JSON message format for client-server communication.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MSG_BAD_REQUEST: &str = "Bad Subscription Request";
pub const MSG_ALREADY_SUBSCRIBED: &str = "Already Subscribed";
pub const MSG_NOT_SUBSCRIBED: &str = "Not Subscribed";
pub const MSG_SUBSCRIBE_FAILED: &str = "Subscription Failed";

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Gas price speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "fast")]
    Fast,
    #[serde(rename = "fastest")]
    Fastest,
    #[serde(rename = "safeLow")]
    SafeLow,
    #[serde(rename = "average")]
    Average,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Fastest => "fastest",
            Tier::SafeLow => "safeLow",
            Tier::Average => "average",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied between a published price and the client threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
        }
    }

    /// Evaluate `value <op> threshold`.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
            Operator::Eq => value == threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Subscription,
    Unsubscription,
}

/// Message sent from client to server.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub field: Tier,
    pub operator: Operator,
    pub threshold: f64,
}

impl Command {
    /// Parse and validate a command from a JSON frame.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let command: Command = serde_json::from_slice(data)
            .map_err(|e| GatewayError::MalformedCommand(e.to_string()))?;
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(GatewayError::MalformedCommand(format!(
                "threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn criteria(&self) -> Criteria {
        Criteria {
            tier: self.field,
            operator: self.operator,
            threshold: self.threshold,
        }
    }
}

/// A client's notification condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub tier: Tier,
    pub operator: Operator,
    pub threshold: f64,
}

impl Criteria {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey(self.to_string())
    }

    pub fn is_satisfied_by(&self, update: &PriceUpdate) -> bool {
        self.operator.holds(update.price(self.tier), self.threshold)
    }
}

impl fmt::Display for Criteria {
    // f64 Display prints the shortest round-trip form, so `30`, `30.0`
    // and `3e1` all render as `30`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tier, self.operator, self.threshold)
    }
}

/// Canonical identifier of a [`Criteria`], unique per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Confirmation sent for every command outcome.
/// `code = 1` is success, `code = 0` is rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub code: u8,
    pub message: String,
}

impl Confirmation {
    fn success(message: String) -> Self {
        Self { code: 1, message }
    }

    fn rejection(message: &str) -> Self {
        Self {
            code: 0,
            message: message.to_string(),
        }
    }

    pub fn subscribed(key: &SubscriptionKey) -> Self {
        Self::success(format!("Subscribed to `{}`", key))
    }

    pub fn unsubscribed(key: &SubscriptionKey) -> Self {
        Self::success(format!("Unsubscribed from `{}`", key))
    }

    pub fn bad_request() -> Self {
        Self::rejection(MSG_BAD_REQUEST)
    }

    pub fn already_subscribed() -> Self {
        Self::rejection(MSG_ALREADY_SUBSCRIBED)
    }

    pub fn not_subscribed() -> Self {
        Self::rejection(MSG_NOT_SUBSCRIBED)
    }

    pub fn subscribe_failed() -> Self {
        Self::rejection(MSG_SUBSCRIBE_FAILED)
    }

    pub fn is_success(&self) -> bool {
        self.code == 1
    }
}

/// Price update published on the broker channel.
///
/// Only used to validate payloads and evaluate criteria; clients always
/// receive the original payload text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub fast: f64,
    pub fastest: f64,
    pub safe_low: f64,
    pub average: f64,
}

impl PriceUpdate {
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    pub fn price(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Fast => self.fast,
            Tier::Fastest => self.fastest,
            Tier::SafeLow => self.safe_low,
            Tier::Average => self.average,
        }
    }
}
