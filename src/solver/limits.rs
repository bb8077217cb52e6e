//! Constraint engine: change limits, bounds and parameter freezing.
//!
//! A raw upgrade can move a parameter further than its change limit allows or
//! across one of its bounds. The engine clips such moves, scales the whole step
//! so that its direction is preserved and freezes parameters that would still
//! cross a bound. Freezing is iterated with the upgrade computation until no new
//! parameter needs freezing.

use log::debug;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SvdOptError};
use crate::parameters::{ChangeLimit, ParameterInfo, ParameterTransform, Parameters};
use crate::solver::config::{MarquardtMatrix, SolverConfig};
use crate::solver::upgrade::{UpgradeContext, UpgradeStrategy, UpgradeVector};

/// Relative slack used when testing whether a value has reached a limit.
const AT_LIMIT_EPS: f64 = 1e-12;

/// Why a parameter's proposed change was clipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitType {
    #[default]
    None,
    Relative,
    Factor,
    UpperBound,
    LowerBound,
}

impl LimitType {
    pub fn is_bound(&self) -> bool {
        matches!(self, LimitType::UpperBound | LimitType::LowerBound)
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LimitType::None => "none",
            LimitType::Relative => "relative",
            LimitType::Factor => "factor",
            LimitType::UpperBound => "upper bound",
            LimitType::LowerBound => "lower bound",
        };
        f.write_str(s)
    }
}

/// Result of [`ConstraintEngine::check_limits`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitCheck {
    /// Binding limit per checked parameter (`None` when unconstrained)
    pub types: BTreeMap<String, LimitType>,
    /// Clipped values of the limited parameters
    pub limited: Parameters,
}

/// Result of [`ConstraintEngine::check_bounds`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundCheck {
    /// Parameters to freeze, at their current value
    pub to_freeze: Parameters,
    /// Parameters whose upgrade heads out of bounds while the gradient heads back in
    pub mismatches: usize,
}

/// A constrained upgrade ready to be submitted as a trial.
#[derive(Debug, Clone)]
pub struct ConstrainedUpgrade {
    /// Candidate active-control parameters (frozen values imposed)
    pub candidate: Parameters,
    /// Every parameter held fixed for this candidate
    pub frozen: Parameters,
    /// Euclidean distance between base and candidate in active-control space
    pub magnitude: f64,
    /// The last unconstrained upgrade computed
    pub upgrade: UpgradeVector,
    /// Number of upgrade computations performed
    pub passes: usize,
}

fn ge(a: f64, b: f64) -> bool {
    a >= b - AT_LIMIT_EPS * b.abs()
}

fn le(a: f64, b: f64) -> bool {
    a <= b + AT_LIMIT_EPS * b.abs()
}

/// Applies change limits and bounds to upgrades.
pub struct ConstraintEngine<'a> {
    par_info: &'a ParameterInfo,
    transform: &'a dyn ParameterTransform,
    rel_par_max: f64,
    fac_par_max: f64,
    fac_orig: f64,
    out_of_bound_tol: f64,
}

impl<'a> ConstraintEngine<'a> {
    pub fn new(
        par_info: &'a ParameterInfo,
        transform: &'a dyn ParameterTransform,
        config: &SolverConfig,
    ) -> Self {
        Self {
            par_info,
            transform,
            rel_par_max: config.rel_par_max,
            fac_par_max: config.fac_par_max,
            fac_orig: config.fac_orig,
            out_of_bound_tol: config.out_of_bound_tol,
        }
    }

    /// Clip every active parameter of `upgrade` to its most restrictive limit.
    ///
    /// The change limit is measured against `init`, or against `fac_orig` times the
    /// parameter's initial value when `init` is closer to zero than that. Bounds win
    /// over change limits. A value sitting exactly on a limit is reported as limited,
    /// so checking an already-clipped set reproduces it.
    pub fn check_limits(&self, init: &Parameters, upgrade: &Parameters) -> Result<LimitCheck> {
        let mut check = LimitCheck::default();

        for (name, &p_up) in upgrade {
            let rec = self.par_info.record(name)?;
            if !rec.is_active() {
                continue;
            }
            let p_init = init.value(name)?;

            let mut orig = rec.init_value;
            if orig == 0.0 {
                orig = rec.upper() / 4.0;
            }
            if !orig.is_finite() {
                orig = 1.0;
            }
            let mut b = self.fac_orig * orig;
            if p_init.abs() >= b.abs() {
                b = p_init;
            }

            let mut limit: Option<(f64, LimitType)> = None;
            if b != 0.0 {
                match rec.change_limit {
                    ChangeLimit::Relative => {
                        let rel = ((p_up - p_init) / b).abs();
                        if ge(rel, self.rel_par_max) {
                            let value = p_init + (p_up - p_init).signum() * self.rel_par_max * b.abs();
                            limit = Some((value, LimitType::Relative));
                        }
                    }
                    ChangeLimit::Factor => {
                        let (lo, hi) = if b > 0.0 {
                            (b / self.fac_par_max, b * self.fac_par_max)
                        } else {
                            (b * self.fac_par_max, b / self.fac_par_max)
                        };
                        if le(p_up, lo) {
                            limit = Some((lo, LimitType::Factor));
                        } else if ge(p_up, hi) {
                            limit = Some((hi, LimitType::Factor));
                        }
                    }
                }
            }

            // a change limit measured from `fac_orig * orig` can land behind `p_init`;
            // it cannot shorten the step, so the bound test below decides instead
            if limit.map_or(false, |(v, _)| (v - p_init) * (p_up - p_init) <= 0.0) {
                limit = None;
            }

            let candidate = limit.map_or(p_up, |(v, _)| v);
            if ge(candidate, rec.upper()) {
                limit = Some((rec.upper(), LimitType::UpperBound));
            } else if le(candidate, rec.lower()) {
                limit = Some((rec.lower(), LimitType::LowerBound));
            }

            match limit {
                Some((value, kind)) => {
                    check.limited.insert(name.clone(), value);
                    check.types.insert(name.clone(), kind);
                }
                None => {
                    check.types.insert(name.clone(), LimitType::None);
                }
            }
        }
        Ok(check)
    }

    /// Find parameters sitting on a bound whose upgrade pushes them further out.
    ///
    /// When a gradient delta is supplied, a parameter is only frozen if the gradient
    /// also heads out; one whose gradient heads back in is counted as a mismatch.
    pub fn check_bounds(
        &self,
        base: &Parameters,
        upgrade_delta: &Parameters,
        gradient_delta: Option<&Parameters>,
    ) -> Result<BoundCheck> {
        let mut check = BoundCheck::default();
        for (name, &delta) in upgrade_delta {
            let rec = self.par_info.record(name)?;
            if !rec.is_active() {
                continue;
            }
            let value = base.value(name)?;
            let tol = self.out_of_bound_tol;
            if !rec.bounds.heading_out(value, delta, tol) {
                continue;
            }
            let gradient_in = gradient_delta
                .and_then(|g| g.get(name))
                .map_or(false, |g| !rec.bounds.heading_out(value, g, tol));
            if gradient_in {
                check.mismatches += 1;
            } else {
                check.to_freeze.insert(name.clone(), value);
            }
        }
        Ok(check)
    }

    /// Global step scale from the parameters clipped by a change limit.
    ///
    /// Returns the smallest `(limit - init) / (upgrade - init)` in numeric space and
    /// the parameter that set it. Only ratios in `(0, 1)` count, so the step is
    /// shortened but never reversed.
    pub fn compute_scale_factor(
        &self,
        init: &Parameters,
        upgrade: &Parameters,
        at_limit: &Parameters,
    ) -> Result<(f64, Option<String>)> {
        let init_num = self.transform.active_ctl_to_numeric(&init.subset(at_limit.names().iter()));
        let up_num = self.transform.active_ctl_to_numeric(&upgrade.subset(at_limit.names().iter()));
        let lim_num = self.transform.active_ctl_to_numeric(at_limit);

        let mut factor = 1.0;
        let mut limiting = None;
        for (name, &p_lim) in &lim_num {
            let p_init = init_num.value(name)?;
            let p_up = up_num.value(name)?;
            let f = (p_lim - p_init) / (p_up - p_init);
            if f.is_finite() && f > 0.0 && f < factor {
                factor = f;
                limiting = Some(name.clone());
            }
        }
        Ok((factor, limiting))
    }

    /// Limit `upgrade` in place and freeze parameters that end up on a bound.
    ///
    /// Previously frozen values are always re-imposed. Returns the newly frozen
    /// parameters at their bound values.
    pub fn limit_and_freeze(
        &self,
        init: &Parameters,
        upgrade: &mut Parameters,
        prev_frozen: &Parameters,
    ) -> Result<Parameters> {
        upgrade.erase(prev_frozen);

        let first = self.check_limits(init, upgrade)?;
        let mut at_limit = first.limited;
        at_limit.erase_names(first.types.iter().filter(|(_, t)| t.is_bound()).map(|(n, _)| n));

        let (factor, limiting) = self.compute_scale_factor(init, upgrade, &at_limit)?;
        if factor != 1.0 {
            debug!(
                "upgrade scaled by {:.6e} ({} at its change limit)",
                factor,
                limiting.as_deref().unwrap_or("-")
            );
            let init_num = self.transform.active_ctl_to_numeric(&init.subset(upgrade.names().iter()));
            let mut up_num = self.transform.active_ctl_to_numeric(upgrade);
            for (name, value) in up_num.iter_mut() {
                let p0 = init_num.value(name)?;
                *value = p0 + (*value - p0) * factor;
            }
            *upgrade = self.transform.numeric_to_active_ctl(&up_num);
        }

        let second = self.check_limits(init, upgrade)?;
        let mut newly_frozen = Parameters::new();
        for (name, kind) in &second.types {
            let rec = self.par_info.record(name)?;
            match kind {
                LimitType::UpperBound => newly_frozen.insert(name.clone(), rec.upper()),
                LimitType::LowerBound => newly_frozen.insert(name.clone(), rec.lower()),
                _ => {}
            }
        }

        upgrade.update(prev_frozen);
        upgrade.update(&newly_frozen);
        Ok(newly_frozen)
    }

    /// Compute an upgrade for `lambda` and constrain it.
    ///
    /// Parameters heading out of bounds are frozen and the upgrade recomputed until
    /// the frozen set stops growing. The first pass consults the gradient; once a
    /// mismatch between upgrade and gradient has been seen, later passes freeze on
    /// the upgrade alone. Change limits and bounds are applied to the final upgrade.
    pub fn constrained_upgrade(
        &self,
        strategy: &dyn UpgradeStrategy,
        ctx: &UpgradeContext<'_>,
        base_frozen: &Parameters,
        lambda: f64,
        marquardt: MarquardtMatrix,
        scale_upgrade: bool,
    ) -> Result<ConstrainedUpgrade> {
        let base = ctx.base_active_ctl;
        let mut frozen = base_frozen.clone();
        let max_passes = base.len() + 2;
        let mut use_gradient = true;
        let mut passes = 0;

        let mut upgrade = loop {
            if passes == max_passes {
                return Err(SvdOptError::InvalidState(format!(
                    "parameter freezing did not settle after {} passes",
                    passes
                )));
            }
            passes += 1;

            let upgrade = strategy.compute_upgrade(ctx, &frozen, lambda, marquardt, scale_upgrade)?;
            let gradient = use_gradient.then_some(&upgrade.gradient_active_ctl_delta);
            let check = self.check_bounds(base, &upgrade.active_ctl_delta, gradient)?;

            let before = frozen.len();
            frozen.update(&check.to_freeze);
            debug_assert!(frozen.len() >= before);

            if check.to_freeze.is_empty() && (check.mismatches == 0 || !use_gradient) {
                break upgrade;
            }
            if check.mismatches > 0 {
                use_gradient = false;
            }
        };

        let mut candidate = upgrade.upgrade_active_ctl.clone();
        let newly_frozen = self.limit_and_freeze(base, &mut candidate, &frozen)?;
        frozen.update(&newly_frozen);
        upgrade.upgrade_active_ctl = candidate.clone();

        Ok(ConstrainedUpgrade {
            magnitude: base.l2_distance(&candidate),
            candidate,
            frozen,
            upgrade,
            passes,
        })
    }
}
