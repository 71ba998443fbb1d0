//! Execution DTO: the JSON record returned by the Execution Gateway.
//!
//! The core never assumes exhaustive knowledge of the schema. Unknown fields are
//! kept as-is so renderers can use them; only the handful of fields the core
//! depends on get typed accessors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::ExecutionId;
use super::state::ExecutionStatus;

/// A snapshot of one execution as returned by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionDto(Map<String, Value>);

impl ExecutionDto {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build from an arbitrary JSON value. Only objects are valid DTOs.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Set a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn execution_id(&self) -> Option<ExecutionId> {
        self.str_field("executionId").map(ExecutionId::from)
    }

    /// Raw status string, even if it is outside the known vocabulary.
    pub fn status_str(&self) -> Option<&str> {
        self.str_field("status")
    }

    pub fn status(&self) -> Option<ExecutionStatus> {
        self.status_str().and_then(|s| s.parse().ok())
    }

    pub fn tool_key(&self) -> Option<&str> {
        self.tool_field("key")
    }

    pub fn tool_version(&self) -> Option<&str> {
        self.tool_field("version")
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.str_field("resourceId")
    }

    pub fn approve_amount(&self) -> Option<f64> {
        self.get("approveAmount").and_then(Value::as_f64)
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.timestamp("createdAt")
    }

    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        self.timestamp("updatedAt")
    }

    pub fn started_at(&self) -> Option<NaiveDateTime> {
        self.timestamp("startedAt")
    }

    pub fn completed_at(&self) -> Option<NaiveDateTime> {
        self.timestamp("completedAt")
    }

    /// Parsed `progressReport`.
    ///
    /// The platform sends the report as a JSON-encoded string; objects are
    /// accepted too. Anything else (or unparseable text) yields `None`.
    pub fn progress_report(&self) -> Option<Value> {
        match self.get("progressReport")? {
            Value::String(raw) => serde_json::from_str(raw).ok(),
            Value::Null => None,
            other => Some(other.clone()),
        }
    }

    /// `progressReport` as text, without parsing.
    pub fn progress_report_raw(&self) -> Option<String> {
        match self.get("progressReport")? {
            Value::Null => None,
            Value::String(raw) => Some(raw.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Quoted price: `quotationResult.successfulQuotations[0].priceTotal`.
    pub fn estimated_cost(&self) -> Option<f64> {
        self.get("quotationResult")?
            .get("successfulQuotations")?
            .get(0)?
            .get("priceTotal")?
            .as_f64()
    }

    pub fn user_inputs(&self) -> Option<&Value> {
        self.non_null("userInputs")
    }

    pub fn user_outputs(&self) -> Option<&Value> {
        self.non_null("userOutputs")
    }

    /// `billingTransaction` and `quotationResult` combined into one object.
    /// `None` when neither is present.
    pub fn billing(&self) -> Option<Value> {
        let transaction = self.non_null("billingTransaction");
        let quotation = self.non_null("quotationResult");
        if transaction.is_none() && quotation.is_none() {
            return None;
        }
        let mut billing = Map::new();
        billing.insert(
            "billingTransaction".to_string(),
            transaction.cloned().unwrap_or(Value::Null),
        );
        billing.insert(
            "quotationResult".to_string(),
            quotation.cloned().unwrap_or(Value::Null),
        );
        Some(Value::Object(billing))
    }

    /// Number of ligands submitted (docking batches carry a `smiles_list`).
    pub fn ligand_count(&self) -> Option<usize> {
        self.get("userInputs")?
            .get("smiles_list")?
            .as_array()
            .map(Vec::len)
    }

    fn non_null(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| !value.is_null())
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn tool_field(&self, key: &str) -> Option<&str> {
        self.get("tool")?.as_object()?.get(key)?.as_str()
    }

    fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        self.str_field(key).and_then(parse_timestamp)
    }
}

impl From<Map<String, Value>> for ExecutionDto {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Parse an ISO-8601 timestamp into a timezone-naive UTC instant, truncated to
/// microseconds. Returns `None` for anything unparseable.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    Some(parsed.trunc_subsecs(6))
}
