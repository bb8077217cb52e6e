//! Parameter definitions.
//!
//! A [`ParameterRecord`] carries everything the solver knows about one control
//! parameter apart from its current value: its initial value, hard bounds, the
//! kind of change limit applied to it, how it is transformed into numeric space,
//! the scale/offset that maps it to model space and its derivative increment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SvdOptError};
use crate::parameters::bounds::Bounds;
use crate::parameters::named::Parameters;

/// How the change of a parameter in a single iteration is limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLimit {
    /// Limited by `rel_par_max` relative to the current value
    Relative,
    /// Limited by `fac_par_max` as a multiplicative factor of the current value
    #[default]
    Factor,
}

/// How a control parameter maps into numeric (estimation) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Estimated as is
    #[default]
    None,
    /// Estimated as `log10(value)`
    Log,
    /// Not estimated; held at its initial value
    Fixed,
}

fn default_scale() -> f64 {
    1.0
}

fn default_derinc() -> f64 {
    0.01
}

fn default_derinc_floor() -> f64 {
    1e-7
}

/// Definition of a single control parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Initial (starting) value in control space
    pub init_value: f64,

    /// Hard bounds in control space
    #[serde(default)]
    pub bounds: Bounds,

    /// Change-limit kind. Default: Factor
    #[serde(default)]
    pub change_limit: ChangeLimit,

    /// Transform into numeric space. Default: None
    #[serde(default)]
    pub transform: TransformKind,

    /// Model value = control value * scale + offset. Default: 1.0
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Model value = control value * scale + offset. Default: 0.0
    #[serde(default)]
    pub offset: f64,

    /// Relative derivative increment in numeric space. Default: 0.01
    #[serde(default = "default_derinc")]
    pub derinc: f64,

    /// Absolute lower limit on the derivative increment. Default: 1e-7
    #[serde(default = "default_derinc_floor")]
    pub derinc_floor: f64,

    /// Parameter group name
    #[serde(default)]
    pub group: String,
}

impl ParameterRecord {
    /// A record with the given initial value and bounds and defaults for everything else.
    pub fn new(init_value: f64, lower: f64, upper: f64) -> Result<Self> {
        Ok(Self {
            init_value,
            bounds: Bounds::new(lower, upper)?,
            change_limit: ChangeLimit::default(),
            transform: TransformKind::default(),
            scale: default_scale(),
            offset: 0.0,
            derinc: default_derinc(),
            derinc_floor: default_derinc_floor(),
            group: String::new(),
        })
    }

    pub fn with_change_limit(mut self, change_limit: ChangeLimit) -> Self {
        self.change_limit = change_limit;
        self
    }

    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_scale_offset(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_derinc(mut self, derinc: f64) -> Self {
        self.derinc = derinc;
        self
    }

    /// Whether the parameter takes part in estimation.
    pub fn is_active(&self) -> bool {
        self.transform != TransformKind::Fixed
    }

    pub fn lower(&self) -> f64 {
        self.bounds.min
    }

    pub fn upper(&self) -> f64 {
        self.bounds.max
    }
}

/// Ordered table of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterInfo {
    records: BTreeMap<String, ParameterRecord>,
}

impl ParameterInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. Names must be unique.
    pub fn add(&mut self, name: &str, record: ParameterRecord) -> Result<()> {
        if self.records.contains_key(name) {
            return Err(SvdOptError::Configuration(format!(
                "parameter {} is defined twice",
                name
            )));
        }
        self.records.insert(name.to_string(), record);
        Ok(())
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, name: &str, record: ParameterRecord) -> Result<Self> {
        self.add(name, record)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterRecord> {
        self.records.get(name)
    }

    /// Record for `name`, or `ParameterNotFound`.
    pub fn record(&self, name: &str) -> Result<&ParameterRecord> {
        self.records
            .get(name)
            .ok_or_else(|| SvdOptError::ParameterNotFound(name.to_string()))
    }

    /// Whether `name` is defined and not fixed.
    pub fn is_active(&self, name: &str) -> bool {
        self.records.get(name).map_or(false, |r| r.is_active())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterRecord)> {
        self.records.iter()
    }

    /// Initial values of every parameter, in control space.
    pub fn initial_values(&self) -> Parameters {
        self.records
            .iter()
            .map(|(name, rec)| (name.clone(), rec.init_value))
            .collect()
    }

    /// Check the definitions for internal consistency.
    pub fn validate(&self) -> Result<()> {
        for (name, rec) in &self.records {
            if rec.transform == TransformKind::Log && !(rec.bounds.min > 0.0) {
                return Err(SvdOptError::Configuration(format!(
                    "log-transformed parameter {} must have a positive lower bound, got {}",
                    name, rec.bounds.min
                )));
            }
            if rec.scale == 0.0 || !rec.scale.is_finite() {
                return Err(SvdOptError::Configuration(format!(
                    "parameter {} has an invalid scale {}",
                    name, rec.scale
                )));
            }
            if !(rec.derinc > 0.0) {
                return Err(SvdOptError::Configuration(format!(
                    "parameter {} has a non-positive derivative increment {}",
                    name, rec.derinc
                )));
            }
            if rec.is_active() && !rec.bounds.is_within_bounds(rec.init_value) {
                return Err(SvdOptError::Configuration(format!(
                    "initial value {} of parameter {} lies outside [{}, {}]",
                    rec.init_value, name, rec.bounds.min, rec.bounds.max
                )));
            }
        }
        Ok(())
    }
}
