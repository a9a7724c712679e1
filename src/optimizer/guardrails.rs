use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::strategies::ParamSpec;

/// Static limits a proposed change must satisfy to be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Guardrails {
    pub max_risk_trade_usd: f64,
    pub protected_fields: Vec<String>,
    pub max_atr_mult: f64,
    pub min_atr_mult: f64,
    pub global_max_trades_day: u32,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_risk_trade_usd: 200.0,
            protected_fields: Vec::new(),
            max_atr_mult: 5.0,
            min_atr_mult: 0.5,
            global_max_trades_day: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardrailViolation {
    #[error("parameter {0} is protected")]
    ProtectedField(String),
    #[error("{param} = {value} outside ATR-multiplier bounds [{min}, {max}]")]
    AtrMultOutOfBounds { param: String, value: f64, min: f64, max: f64 },
    #[error("{param} = {value} outside declared range [{min}, {max}]")]
    OutOfDeclaredRange { param: String, value: f64, min: f64, max: f64 },
    #[error("unknown parameter {0}")]
    UnknownParam(String),
}

fn is_atr_multiplier(name: &str) -> bool {
    name.to_ascii_lowercase().contains("atrmult")
        || name.to_ascii_lowercase().contains("atr_mult")
}

impl Guardrails {
    /// Validates a parameter-override proposal against the declared specs.
    pub fn validate_param_change(
        &self,
        declared: &BTreeMap<String, ParamSpec>,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<(), GuardrailViolation> {
        for (name, value) in overrides {
            if self.protected_fields.iter().any(|p| p == name) {
                return Err(GuardrailViolation::ProtectedField(name.clone()));
            }

            if is_atr_multiplier(name) && (*value < self.min_atr_mult || *value > self.max_atr_mult)
            {
                return Err(GuardrailViolation::AtrMultOutOfBounds {
                    param: name.clone(),
                    value: *value,
                    min: self.min_atr_mult,
                    max: self.max_atr_mult,
                });
            }

            let spec = declared
                .get(name)
                .ok_or_else(|| GuardrailViolation::UnknownParam(name.clone()))?;
            if *value < spec.min || *value > spec.max {
                return Err(GuardrailViolation::OutOfDeclaredRange {
                    param: name.clone(),
                    value: *value,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
        Ok(())
    }
}
