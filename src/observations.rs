//! Observation and prior-information definitions.
//!
//! Observations carry an observed value, a weight and a group. Prior information
//! equations are linear combinations of numeric-space parameters treated as extra
//! observation rows. Rows belonging to a group whose name starts with `regul`
//! form the regularization part of the objective function.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SvdOptError};
use crate::parameters::{Observations, ParameterInfo, Parameters};

/// Whether a group name marks regularization rows.
pub fn is_regularization_group(group: &str) -> bool {
    group.to_ascii_lowercase().starts_with("regul")
}

fn default_weight() -> f64 {
    1.0
}

/// Definition of one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Observed value
    pub value: f64,

    /// Weight. Default: 1.0
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Observation group
    #[serde(default)]
    pub group: String,
}

impl ObservationRecord {
    pub fn new(value: f64, weight: f64, group: &str) -> Self {
        Self {
            value,
            weight,
            group: group.to_string(),
        }
    }

    pub fn is_regularization(&self) -> bool {
        is_regularization_group(&self.group)
    }
}

/// Ordered table of observation definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationInfo {
    records: BTreeMap<String, ObservationRecord>,
}

impl ObservationInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, record: ObservationRecord) {
        self.records.insert(name.to_string(), record);
    }

    pub fn with(mut self, name: &str, record: ObservationRecord) -> Self {
        self.add(name, record);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ObservationRecord> {
        self.records.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ObservationRecord)> {
        self.records.iter()
    }

    /// Observed values as an observation set.
    pub fn observed_values(&self) -> Observations {
        self.records
            .iter()
            .map(|(name, rec)| (name.clone(), rec.value))
            .collect()
    }
}

/// A prior information equation: `sum(coefficient * numeric(parameter)) = value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorInfoRecord {
    /// `(parameter name, coefficient)` terms
    pub terms: Vec<(String, f64)>,

    /// Right-hand side
    pub value: f64,

    /// Weight. Default: 1.0
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Group; `regul*` groups are regularization equations
    #[serde(default)]
    pub group: String,
}

impl PriorInfoRecord {
    pub fn new(terms: &[(&str, f64)], value: f64, weight: f64, group: &str) -> Self {
        Self {
            terms: terms.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
            value,
            weight,
            group: group.to_string(),
        }
    }

    /// Simulated value of the equation for a numeric-space parameter set.
    pub fn simulated(&self, numeric_pars: &Parameters) -> Result<f64> {
        self.terms.iter().try_fold(0.0, |acc, (name, coef)| {
            numeric_pars.value(name).map(|v| acc + coef * v)
        })
    }

    pub fn is_regularization(&self) -> bool {
        is_regularization_group(&self.group)
    }
}

/// Ordered table of prior information equations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorInformation {
    records: BTreeMap<String, PriorInfoRecord>,
}

impl PriorInformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, record: PriorInfoRecord) {
        self.records.insert(name.to_string(), record);
    }

    pub fn with(mut self, name: &str, record: PriorInfoRecord) -> Self {
        self.add(name, record);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PriorInfoRecord> {
        self.records.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PriorInfoRecord)> {
        self.records.iter()
    }

    /// Prior information may only cite adjustable parameters.
    pub fn validate(&self, par_info: &ParameterInfo) -> Result<()> {
        for (name, rec) in &self.records {
            for (par, _) in &rec.terms {
                match par_info.get(par) {
                    None => {
                        return Err(SvdOptError::Configuration(format!(
                            "prior information {} cites unknown parameter {}",
                            name, par
                        )))
                    }
                    Some(p) if !p.is_active() => {
                        return Err(SvdOptError::Configuration(format!(
                            "prior information {} cites fixed parameter {}",
                            name, par
                        )))
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
