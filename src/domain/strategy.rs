//! Strategies: named, reusable sets of protocol functions a generator can
//! broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Address, StrategyId};
use crate::error::ValidationError;

/// Parameter whitelist applied when a broadcast carries no strategy.
pub const DEFAULT_MODIFIABLE_PARAMS: &[&str] = &["amount", "value"];

const MIN_FUNCTIONS: usize = 2;
const MAX_FUNCTIONS: usize = 3;

/// One protocol function within a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFunction {
    pub name: String,
    /// Parameters a broadcast of this function must supply.
    pub required_params: Vec<String>,
    /// Subset of parameters a consumer may edit before accepting.
    pub modifiable_params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub generator: Address,
    /// Globally unique, case-insensitive.
    pub name: String,
    pub protocol: String,
    pub functions: Vec<StrategyFunction>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    /// Create a strategy, validating the 2-3 function rule.
    pub fn try_new(
        generator: Address,
        name: impl Into<String>,
        protocol: impl Into<String>,
        functions: Vec<StrategyFunction>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !(MIN_FUNCTIONS..=MAX_FUNCTIONS).contains(&functions.len()) {
            return Err(ValidationError::InvalidFunctionCount {
                count: functions.len(),
            });
        }
        Ok(Self {
            id: StrategyId::new(),
            generator,
            name: name.into(),
            protocol: protocol.into(),
            functions,
            is_active: true,
            created_at: now,
        })
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Result<&StrategyFunction, ValidationError> {
        self.functions.iter().find(|f| f.name == name).ok_or_else(|| {
            ValidationError::UnknownFunction {
                name: name.to_string(),
                strategy: self.name.clone(),
            }
        })
    }
}
