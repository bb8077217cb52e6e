//! Upgrade vector computation.
//!
//! An upgrade is the damped least-squares step `Δp` (numeric space) solving
//! `J Δp ≈ r` in the weighted sense, where `r = observed - simulated`. Two
//! formulations are available behind the [`UpgradeStrategy`] trait:
//!
//! - [`NormalEquationUpgrade`] factorises the normal matrix `JᵗQJ`. With an
//!   identity Marquardt matrix the columns of `J` are first scaled by
//!   `S = diag((JᵗQJ)^-½)` so that lambda acts on equally sensitive parameters.
//! - [`SqrtWeightedUpgrade`] factorises `Q^½J` directly and adds the damping to
//!   its singular values.
//!
//! Both correct the residuals for parameters frozen away from their base value,
//! optionally rescale the step along its own direction and return the step in
//! numeric and active-control space together with the steepest-descent
//! direction `2JᵗQr`.

use ndarray::{Array1, Array2, Axis};

use crate::error::Result;
use crate::jacobian::Jacobian;
use crate::parameters::{ParameterTransform, Parameters};
use crate::solver::config::{MarquardtMatrix, MatInv};
use crate::utils::matrix_convert::scale_rows;
use crate::utils::svd::{SvdPackage, TruncatedSvd};

/// Everything an upgrade is computed from. Borrowed for the duration of one iteration.
pub struct UpgradeContext<'a> {
    pub jacobian: &'a Jacobian,
    /// Row names (observations, then prior information)
    pub rows: &'a [String],
    /// Square-root weights, in row order
    pub q_sqrt: &'a Array1<f64>,
    /// Residuals `observed - simulated`, in row order
    pub residuals: &'a Array1<f64>,
    /// Current active-control parameters
    pub base_active_ctl: &'a Parameters,
    pub transform: &'a dyn ParameterTransform,
    pub svd: &'a dyn SvdPackage,
}

/// One computed upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeVector {
    /// Step in numeric space, over the non-frozen parameters
    pub numeric_delta: Parameters,
    /// Step in active-control space, over the non-frozen parameters
    pub active_ctl_delta: Parameters,
    /// Steepest-descent direction in active-control space
    pub gradient_active_ctl_delta: Parameters,
    /// Candidate active-control parameters with frozen values imposed
    pub upgrade_active_ctl: Parameters,
    /// Retained singular values of the factorization
    pub sigma: Array1<f64>,
    /// Truncated singular values
    pub sigma_trunc: Array1<f64>,
    /// Scale applied along the step (1.0 unless upgrade scaling is enabled)
    pub beta: f64,
}

/// A formulation of the upgrade equations.
pub trait UpgradeStrategy {
    /// Formulation implemented by this strategy.
    fn mat_inv(&self) -> MatInv;

    /// Compute the upgrade for damping `lambda` with `frozen` (active-control
    /// values) held fixed.
    fn compute_upgrade(
        &self,
        ctx: &UpgradeContext<'_>,
        frozen: &Parameters,
        lambda: f64,
        marquardt: MarquardtMatrix,
        scale_upgrade: bool,
    ) -> Result<UpgradeVector>;
}

/// The strategy for a configured formulation.
pub fn strategy_for(mat_inv: MatInv) -> Box<dyn UpgradeStrategy> {
    match mat_inv {
        MatInv::JtQJ => Box::new(NormalEquationUpgrade),
        MatInv::Q12J => Box::new(SqrtWeightedUpgrade),
    }
}

/// Linear system shared by both formulations.
struct System {
    names: Vec<String>,
    base_numeric: Parameters,
    jac: Array2<f64>,
    /// Squared weights `Q`
    q: Array1<f64>,
    /// Residuals corrected for frozen parameters
    corrected: Array1<f64>,
}

impl System {
    /// `JᵗQJ`
    fn normal_matrix(&self) -> Array2<f64> {
        self.jac.t().dot(&scale_rows(&self.q, &self.jac))
    }
}

/// Assemble the system, or `None` when no parameter is free to move.
fn assemble(ctx: &UpgradeContext<'_>, frozen: &Parameters) -> Result<Option<System>> {
    let base_numeric = ctx.transform.active_ctl_to_numeric(ctx.base_active_ctl);
    let mut free = ctx.base_active_ctl.clone();
    free.erase(frozen);
    let names = ctx.transform.active_ctl_to_numeric(&free).names();
    if names.is_empty() {
        return Ok(None);
    }

    let jac = ctx.jacobian.matrix(ctx.rows, &names)?;
    let q = ctx.q_sqrt.mapv(|w| w * w);

    // r_c = r + J_f (p_base - p_frozen), over frozen parameters with usable derivatives
    let failed = ctx.jacobian.failed_parameter_names();
    let frozen_numeric = ctx.transform.active_ctl_to_numeric(
        &frozen.subset(ctx.base_active_ctl.names().iter()),
    );
    let frozen_names: Vec<String> = frozen_numeric
        .names()
        .into_iter()
        .filter(|n| !failed.contains(n) && ctx.jacobian.column(n).is_some())
        .collect();
    let mut corrected = ctx.residuals.clone();
    if !frozen_names.is_empty() {
        let jac_f = ctx.jacobian.matrix(ctx.rows, &frozen_names)?;
        let shift = &base_numeric.to_array(&frozen_names)? - &frozen_numeric.to_array(&frozen_names)?;
        corrected = corrected + jac_f.dot(&shift);
    }

    Ok(Some(System {
        names,
        base_numeric,
        jac,
        q,
        corrected,
    }))
}

/// `V Σ⁻¹ Uᵗ b` with the (already damped) singular values `sigma`.
fn back_solve(svd: &TruncatedSvd, sigma: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
    let projected = svd.u.t().dot(b) / sigma;
    svd.vt.t().dot(&projected)
}

/// Turn a numeric step into an [`UpgradeVector`].
fn finish(
    ctx: &UpgradeContext<'_>,
    frozen: &Parameters,
    sys: &System,
    mut step: Array1<f64>,
    spectrum: &TruncatedSvd,
    scale_upgrade: bool,
) -> Result<UpgradeVector> {
    let mut beta = 1.0;
    if scale_upgrade {
        let gamma = sys.jac.dot(&step);
        let q_gamma = &sys.q * &gamma;
        let denom = gamma.dot(&q_gamma);
        let b = sys.corrected.dot(&q_gamma) / denom;
        if denom != 0.0 && b.is_finite() {
            beta = b;
        }
        step *= beta;
    }

    let gradient = 2.0 * sys.jac.t().dot(&(&sys.q * ctx.residuals));

    let numeric_delta = Parameters::from_array(&sys.names, &step)?;
    let gradient_numeric = Parameters::from_array(&sys.names, &gradient)?;
    let active_ctl_delta = ctx
        .transform
        .del_numeric_to_del_active_ctl(&numeric_delta, &sys.base_numeric);
    let gradient_active_ctl_delta = ctx
        .transform
        .del_numeric_to_del_active_ctl(&gradient_numeric, &sys.base_numeric);

    let mut moved = sys.base_numeric.subset(sys.names.iter());
    moved.add_shared(&numeric_delta);
    let mut upgrade_active_ctl = ctx.base_active_ctl.clone();
    upgrade_active_ctl.update(&ctx.transform.numeric_to_active_ctl(&moved));
    upgrade_active_ctl.update(frozen);

    Ok(UpgradeVector {
        numeric_delta,
        active_ctl_delta,
        gradient_active_ctl_delta,
        upgrade_active_ctl,
        sigma: spectrum.sigma.clone(),
        sigma_trunc: spectrum.sigma_trunc.clone(),
        beta,
    })
}

/// Zero step: every active parameter is frozen.
fn zero_upgrade(ctx: &UpgradeContext<'_>, frozen: &Parameters) -> UpgradeVector {
    let mut upgrade_active_ctl = ctx.base_active_ctl.clone();
    upgrade_active_ctl.update(frozen);
    UpgradeVector {
        numeric_delta: Parameters::new(),
        active_ctl_delta: Parameters::new(),
        gradient_active_ctl_delta: Parameters::new(),
        upgrade_active_ctl,
        sigma: Array1::zeros(0),
        sigma_trunc: Array1::zeros(0),
        beta: 1.0,
    }
}

/// Normal-equation (`JᵗQJ`) formulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalEquationUpgrade;

impl NormalEquationUpgrade {
    /// Diagonal of `(JᵗQJ)^-½` from a full (untruncated) factorization.
    fn sensitivity_scaling(&self, jtqj: &Array2<f64>, svd: &dyn SvdPackage) -> Result<Array1<f64>> {
        let full = svd.factorize(jtqj, Some(0.0))?;
        let inv_sqrt = full.sigma.mapv(|s| 1.0 / s.sqrt());
        // diag(V Σ^-½ Uᵗ)_i = Σ_k V_ik Σ_k^-½ U_ik
        let v = full.vt.t();
        let weighted = &v * &inv_sqrt.view().insert_axis(Axis(0));
        let diag = (&weighted * &full.u).sum_axis(Axis(1));
        Ok(diag.mapv(|s| if s.is_finite() { s } else { 0.0 }))
    }
}

impl UpgradeStrategy for NormalEquationUpgrade {
    fn mat_inv(&self) -> MatInv {
        MatInv::JtQJ
    }

    fn compute_upgrade(
        &self,
        ctx: &UpgradeContext<'_>,
        frozen: &Parameters,
        lambda: f64,
        marquardt: MarquardtMatrix,
        scale_upgrade: bool,
    ) -> Result<UpgradeVector> {
        let Some(sys) = assemble(ctx, frozen)? else {
            return Ok(zero_upgrade(ctx, frozen));
        };
        let jtqj = sys.normal_matrix();

        let (step, svd) = match marquardt {
            MarquardtMatrix::Ident => {
                let s = self.sensitivity_scaling(&jtqj, ctx.svd)?;
                let js = &sys.jac * &s.view().insert_axis(Axis(0));
                let mut a = js.t().dot(&scale_rows(&sys.q, &js));
                for (i, si) in s.iter().enumerate() {
                    a[[i, i]] += lambda * si * si;
                }
                let svd = ctx.svd.factorize(&a, None)?;
                let rhs = js.t().dot(&(&sys.q * &sys.corrected));
                let step = &s * &back_solve(&svd, &svd.sigma, &rhs);
                (step, svd)
            }
            MarquardtMatrix::JtQJ => {
                let svd = ctx.svd.factorize(&jtqj, None)?;
                let damped = svd.sigma.mapv(|s| s + (lambda * s * s).sqrt());
                let rhs = sys.jac.t().dot(&(&sys.q * &sys.corrected));
                (back_solve(&svd, &damped, &rhs), svd)
            }
        };

        finish(ctx, frozen, &sys, step, &svd, scale_upgrade)
    }
}

/// Square-root-weighted (`Q^½J`) formulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqrtWeightedUpgrade;

impl UpgradeStrategy for SqrtWeightedUpgrade {
    fn mat_inv(&self) -> MatInv {
        MatInv::Q12J
    }

    fn compute_upgrade(
        &self,
        ctx: &UpgradeContext<'_>,
        frozen: &Parameters,
        lambda: f64,
        marquardt: MarquardtMatrix,
        scale_upgrade: bool,
    ) -> Result<UpgradeVector> {
        let Some(sys) = assemble(ctx, frozen)? else {
            return Ok(zero_upgrade(ctx, frozen));
        };
        let q12 = sys.q.mapv(f64::sqrt);
        let q12j = scale_rows(&q12, &sys.jac);
        let svd = ctx.svd.factorize(&q12j, None)?;
        let damped = match marquardt {
            MarquardtMatrix::Ident => svd.sigma.mapv(|s| s + lambda),
            MarquardtMatrix::JtQJ => svd.sigma.mapv(|s| s + lambda.sqrt() * s),
        };
        let step = back_solve(&svd, &damped, &(&q12 * &sys.corrected));
        finish(ctx, frozen, &sys, step, &svd, scale_upgrade)
    }
}
