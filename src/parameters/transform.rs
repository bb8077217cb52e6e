//! Parameter coordinate spaces and the transforms between them.
//!
//! Four spaces are used:
//!
//! - **model**: the values handed to the simulation model;
//! - **control**: the values the user defines (`model = control * scale + offset`);
//! - **active-control**: control space without fixed parameters;
//! - **numeric**: active-control space after per-parameter transforms (e.g. `log10`),
//!   the space the Jacobian and upgrade vectors live in.
//!
//! The solver only depends on the [`ParameterTransform`] trait. [`TransformSeq`] is
//! the default implementation, built from a [`ParameterInfo`] table.

use crate::error::Result;
use crate::parameters::info::{ParameterInfo, TransformKind};
use crate::parameters::named::Parameters;

/// Bidirectional maps between the parameter coordinate spaces.
///
/// Implementations must be pure and invertible on their domain: a set mapped
/// control → numeric → control comes back unchanged (up to rounding) and keeps
/// every name.
pub trait ParameterTransform {
    /// Control → model space.
    fn ctl_to_model(&self, ctl: &Parameters) -> Parameters;

    /// Model → control space.
    fn model_to_ctl(&self, model: &Parameters) -> Parameters;

    /// Control → active-control space (drops inactive parameters).
    fn ctl_to_active_ctl(&self, ctl: &Parameters) -> Parameters;

    /// Active-control → control space (re-inserts inactive parameters).
    fn active_ctl_to_ctl(&self, active_ctl: &Parameters) -> Parameters;

    /// Active-control → numeric space.
    fn active_ctl_to_numeric(&self, active_ctl: &Parameters) -> Parameters;

    /// Numeric → active-control space.
    fn numeric_to_active_ctl(&self, numeric: &Parameters) -> Parameters;

    /// Control → numeric space.
    fn ctl_to_numeric(&self, ctl: &Parameters) -> Parameters {
        self.active_ctl_to_numeric(&self.ctl_to_active_ctl(ctl))
    }

    /// Numeric → control space.
    fn numeric_to_ctl(&self, numeric: &Parameters) -> Parameters {
        self.active_ctl_to_ctl(&self.numeric_to_active_ctl(numeric))
    }

    /// Active-control → model space.
    fn active_ctl_to_model(&self, active_ctl: &Parameters) -> Parameters {
        self.ctl_to_model(&self.active_ctl_to_ctl(active_ctl))
    }

    /// Map a numeric-space delta taken at `base_numeric` to the matching active-control delta.
    fn del_numeric_to_del_active_ctl(
        &self,
        del_numeric: &Parameters,
        base_numeric: &Parameters,
    ) -> Parameters {
        let base = base_numeric.subset(del_numeric.names().iter());
        let mut moved = base.clone();
        moved.add_shared(del_numeric);
        let moved_ctl = self.numeric_to_active_ctl(&moved);
        let base_ctl = self.numeric_to_active_ctl(&base);
        &moved_ctl - &base_ctl
    }
}

/// Default transform chain: scale/offset, fixed-parameter removal and `log10`.
#[derive(Debug, Clone)]
pub struct TransformSeq {
    info: ParameterInfo,
    fixed: Parameters,
}

impl TransformSeq {
    /// Build the chain from validated parameter definitions.
    pub fn new(info: &ParameterInfo) -> Result<Self> {
        info.validate()?;
        let fixed = info
            .iter()
            .filter(|(_, rec)| !rec.is_active())
            .map(|(name, rec)| (name.clone(), rec.init_value))
            .collect();
        Ok(Self {
            info: info.clone(),
            fixed,
        })
    }

    /// Values at which inactive parameters are held.
    pub fn fixed_values(&self) -> &Parameters {
        &self.fixed
    }

    fn kind(&self, name: &str) -> TransformKind {
        self.info
            .get(name)
            .map_or(TransformKind::None, |rec| rec.transform)
    }
}

impl ParameterTransform for TransformSeq {
    fn ctl_to_model(&self, ctl: &Parameters) -> Parameters {
        ctl.iter()
            .map(|(name, v)| match self.info.get(name) {
                Some(rec) => (name.clone(), v * rec.scale + rec.offset),
                None => (name.clone(), *v),
            })
            .collect()
    }

    fn model_to_ctl(&self, model: &Parameters) -> Parameters {
        model
            .iter()
            .map(|(name, v)| match self.info.get(name) {
                Some(rec) => (name.clone(), (v - rec.offset) / rec.scale),
                None => (name.clone(), *v),
            })
            .collect()
    }

    fn ctl_to_active_ctl(&self, ctl: &Parameters) -> Parameters {
        let mut active = ctl.clone();
        active.erase(&self.fixed);
        active
    }

    fn active_ctl_to_ctl(&self, active_ctl: &Parameters) -> Parameters {
        let mut ctl = active_ctl.clone();
        for (name, v) in &self.fixed {
            if !ctl.contains(name) {
                ctl.insert(name.clone(), *v);
            }
        }
        ctl
    }

    fn active_ctl_to_numeric(&self, active_ctl: &Parameters) -> Parameters {
        active_ctl
            .iter()
            .map(|(name, v)| match self.kind(name) {
                TransformKind::Log => (name.clone(), v.log10()),
                _ => (name.clone(), *v),
            })
            .collect()
    }

    fn numeric_to_active_ctl(&self, numeric: &Parameters) -> Parameters {
        numeric
            .iter()
            .map(|(name, v)| match self.kind(name) {
                TransformKind::Log => (name.clone(), 10f64.powf(*v)),
                _ => (name.clone(), *v),
            })
            .collect()
    }
}
