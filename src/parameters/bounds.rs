//! Hard parameter bounds.
//!
//! Every control parameter carries a closed interval `[min, max]`. The
//! constraint engine clips upgrades to it and freezes parameters that sit on a
//! bound while their upgrade keeps pushing outwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: lower bound {min} exceeds upper bound {max}")]
    InvalidBounds { min: f64, max: f64 },
}

/// Serialized form; a missing or `null` side is unbounded.
#[derive(Serialize, Deserialize)]
struct RawBounds {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// Closed interval a control parameter must stay in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct Bounds {
    /// Lower bound; `-inf` when unbounded below
    pub min: f64,

    /// Upper bound; `+inf` when unbounded above
    pub max: f64,
}

impl TryFrom<RawBounds> for Bounds {
    type Error = BoundsError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Bounds::new(raw.min.unwrap_or(f64::NEG_INFINITY), raw.max.unwrap_or(f64::INFINITY))
    }
}

impl From<Bounds> for RawBounds {
    fn from(b: Bounds) -> Self {
        RawBounds {
            min: b.min.is_finite().then_some(b.min),
            max: b.max.is_finite().then_some(b.max),
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl Bounds {
    /// Bounds `[min, max]`; fails when `min > max` or either side is NaN.
    ///
    /// # Examples
    ///
    /// ```
    /// use svdopt_rs::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert!(bounds.is_within_bounds(10.0));
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// `(-inf, +inf)`
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether `value` lies in the closed interval.
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether a parameter sitting at `value` and moving by `delta` heads out of bounds.
    ///
    /// A parameter is considered to be at a bound when it lies on or past it, or
    /// within `tolerance` of it relative to `|value|`. Zero and negative values are
    /// handled the same way. Only movement in the direction of the violated bound
    /// counts: a parameter at its upper bound moving down is heading back in.
    ///
    /// # Examples
    ///
    /// ```
    /// use svdopt_rs::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(1.0, 10.0).unwrap();
    /// assert!(bounds.heading_out(10.0, 0.5, 1e-5));
    /// assert!(!bounds.heading_out(10.0, -0.5, 1e-5));
    /// assert!(!bounds.heading_out(5.0, 0.5, 1e-5));
    /// ```
    pub fn heading_out(&self, value: f64, delta: f64, tolerance: f64) -> bool {
        let slack = tolerance * value.abs().max(f64::MIN_POSITIVE);
        (delta > 0.0 && value >= self.max - slack) || (delta < 0.0 && value <= self.min + slack)
    }
}
