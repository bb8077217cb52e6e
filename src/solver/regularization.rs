//! Dynamic Tikhonov regularization.
//!
//! With dynamic regularization enabled, the Tikhonov weight `mu` is retuned at
//! the start of every iteration so that the measurement objective *projected*
//! by a linearised, undamped upgrade hits a target:
//!
//! ```text
//! target = max(phimlim, fracphim * current_meas_phi)
//! ```
//!
//! The search works on the signed misfit `f(mu) = projected_meas(mu) - target`.
//! It first walks geometrically (by `wffac`, inside `[wfmin, wfmax]`) until
//! `f` changes sign, then narrows the bracket by golden-section search on
//! `|f|` in `log10(mu)` until `|f| / target <= wftol`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvdOptError};
use crate::objective::PhiComponents;
use crate::report::Reporter;

/// Persistent Tikhonov regularization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicRegularization {
    /// Enable the weight search. Default: false
    pub use_dynamic_reg: bool,

    /// Current Tikhonov weight `mu`. Default: 1.0
    pub weight: f64,

    /// Floor of the target measurement objective. Default: 1e-10
    pub phimlim: f64,

    /// Target fraction of the current measurement objective. Default: 0.1
    pub fracphim: f64,

    /// Smallest allowed weight. Default: 1e-10
    pub wfmin: f64,

    /// Largest allowed weight. Default: 1e10
    pub wfmax: f64,

    /// Geometric step of the bracketing walk. Default: 1.3
    pub wffac: f64,

    /// Relative tolerance on the target. Default: 1e-2
    pub wftol: f64,

    /// Maximum number of projections per search. Default: 20
    pub max_reg_iter: usize,
}

impl Default for DynamicRegularization {
    fn default() -> Self {
        Self {
            use_dynamic_reg: false,
            weight: 1.0,
            phimlim: 1e-10,
            fracphim: 0.1,
            wfmin: 1e-10,
            wfmax: 1e10,
            wffac: 1.3,
            wftol: 1e-2,
            max_reg_iter: 20,
        }
    }
}

impl DynamicRegularization {
    /// Dynamic regularization with the default search settings.
    pub fn dynamic() -> Self {
        Self {
            use_dynamic_reg: true,
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_target(mut self, phimlim: f64, fracphim: f64) -> Self {
        self.phimlim = phimlim;
        self.fracphim = fracphim;
        self
    }

    pub fn with_weight_bounds(mut self, wfmin: f64, wfmax: f64) -> Self {
        self.wfmin = wfmin;
        self.wfmax = wfmax;
        self
    }

    pub fn with_search(mut self, wffac: f64, wftol: f64, max_reg_iter: usize) -> Self {
        self.wffac = wffac;
        self.wftol = wftol;
        self.max_reg_iter = max_reg_iter;
        self
    }

    /// Target measurement objective for a current measurement objective.
    pub fn target(&self, current_meas: f64) -> f64 {
        self.phimlim.max(self.fracphim * current_meas)
    }

    /// `mu` clamped to `[wfmin, wfmax]`.
    pub fn clamp(&self, mu: f64) -> f64 {
        mu.clamp(self.wfmin, self.wfmax)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SvdOptError::Configuration(msg));
        if !(self.wfmin > 0.0 && self.wfmin <= self.wfmax && self.wfmax.is_finite()) {
            return bad(format!(
                "regularization weight bounds must satisfy 0 < wfmin <= wfmax < inf, got [{}, {}]",
                self.wfmin, self.wfmax
            ));
        }
        if !(self.weight >= 0.0 && self.weight.is_finite()) {
            return bad(format!("invalid regularization weight {}", self.weight));
        }
        if !(self.wffac > 1.0) {
            return bad(format!("wffac must be greater than 1, got {}", self.wffac));
        }
        if !(self.wftol > 0.0) {
            return bad(format!("wftol must be positive, got {}", self.wftol));
        }
        if !(self.phimlim > 0.0) || !(self.fracphim >= 0.0) {
            return bad(format!(
                "invalid regularization target (phimlim {}, fracphim {})",
                self.phimlim, self.fracphim
            ));
        }
        if self.max_reg_iter == 0 {
            return bad("max_reg_iter must be at least 1".to_string());
        }
        Ok(())
    }
}

/// One evaluated weight.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MuPoint {
    mu: f64,
    phi: PhiComponents,
    /// Projected measurement phi minus target
    misfit: f64,
}

/// Golden-section state in `log10(mu)`; `c < d` are the interior points.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    lo: f64,
    hi: f64,
    c: MuPoint,
    d: MuPoint,
}

/// Result of a weight search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSearchOutcome {
    /// Selected weight
    pub mu: f64,
    /// Projected objective at `mu`
    pub phi: PhiComponents,
    pub target: f64,
    /// Number of projections evaluated
    pub evaluations: usize,
    /// Whether `|projected - target| / target <= wftol` at `mu`
    pub converged: bool,
}

const GOLDEN: f64 = 0.618_033_988_749_894_9;

struct Search<'a, F> {
    reg: &'a DynamicRegularization,
    target: f64,
    project: F,
    reporter: &'a mut dyn Reporter,
    evaluations: usize,
    best: Option<MuPoint>,
}

impl<'a, F> Search<'a, F>
where
    F: FnMut(f64) -> Result<PhiComponents>,
{
    fn exhausted(&self) -> bool {
        self.evaluations >= self.reg.max_reg_iter
    }

    fn converged(&self, p: &MuPoint) -> bool {
        p.misfit.abs() / self.target <= self.reg.wftol
    }

    fn eval(&mut self, mu: f64) -> Result<MuPoint> {
        let phi = (self.project)(mu)?;
        self.evaluations += 1;
        let p = MuPoint {
            mu,
            phi,
            misfit: phi.meas - self.target,
        };
        self.reporter
            .regularization_step(self.evaluations, mu, phi.meas, self.target);
        if self
            .best
            .map_or(true, |b| p.misfit.abs() < b.misfit.abs())
        {
            self.best = Some(p);
        }
        Ok(p)
    }

    fn finish(&self, p: MuPoint) -> WeightSearchOutcome {
        WeightSearchOutcome {
            mu: p.mu,
            phi: p.phi,
            target: self.target,
            evaluations: self.evaluations,
            converged: self.converged(&p),
        }
    }

    fn finish_best(&self, fallback: MuPoint) -> WeightSearchOutcome {
        self.finish(self.best.unwrap_or(fallback))
    }

    fn interior(&mut self, lo: f64, hi: f64, upper: bool) -> Result<MuPoint> {
        let x = if upper {
            lo + GOLDEN * (hi - lo)
        } else {
            hi - GOLDEN * (hi - lo)
        };
        self.eval(10f64.powf(x))
    }

    /// Next bracket; one new projection.
    fn narrow(&mut self, b: Bracket) -> Result<Bracket> {
        if b.c.misfit.abs() <= b.d.misfit.abs() {
            let hi = b.d.mu.log10();
            let c = self.interior(b.lo, hi, false)?;
            Ok(Bracket {
                lo: b.lo,
                hi,
                c,
                d: b.c,
            })
        } else {
            let lo = b.c.mu.log10();
            let d = self.interior(lo, b.hi, true)?;
            Ok(Bracket {
                lo,
                hi: b.hi,
                c: b.d,
                d,
            })
        }
    }

    fn run(mut self) -> Result<WeightSearchOutcome> {
        let reg = self.reg;
        let p0 = self.eval(reg.clamp(reg.weight))?;
        if self.converged(&p0) || self.exhausted() {
            return Ok(self.finish_best(p0));
        }

        // Probe one step away to see which way the misfit moves with mu
        let up = reg.clamp(p0.mu * reg.wffac);
        let probe = if up > p0.mu {
            up
        } else {
            reg.clamp(p0.mu / reg.wffac)
        };
        if probe == p0.mu {
            return Ok(self.finish(p0));
        }
        let p1 = self.eval(probe)?;
        if self.converged(&p1) {
            return Ok(self.finish(p1));
        }

        let (mut lo, mut hi) = if p0.mu < p1.mu { (p0, p1) } else { (p1, p0) };
        if lo.misfit.signum() == hi.misfit.signum() {
            let slope = (hi.misfit - lo.misfit) / (hi.mu - lo.mu);
            let increase = if slope != 0.0 {
                // walk toward the zero of the misfit
                (lo.misfit > 0.0) != (slope > 0.0)
            } else {
                lo.misfit > 0.0
            };

            let mut last = if increase { hi } else { lo };
            loop {
                if self.exhausted() {
                    return Ok(self.finish_best(last));
                }
                let next_mu = if increase {
                    reg.clamp(last.mu * reg.wffac)
                } else {
                    reg.clamp(last.mu / reg.wffac)
                };
                if next_mu == last.mu {
                    // pinned at a bound without crossing the target
                    return Ok(self.finish(last));
                }
                let next = self.eval(next_mu)?;
                if self.converged(&next) {
                    return Ok(self.finish(next));
                }
                if next.misfit.signum() != last.misfit.signum() {
                    (lo, hi) = if increase { (last, next) } else { (next, last) };
                    break;
                }
                last = next;
            }
        }

        if self.exhausted() {
            return Ok(self.finish_best(lo));
        }
        let (x_lo, x_hi) = (lo.mu.log10(), hi.mu.log10());
        let c = self.interior(x_lo, x_hi, false)?;
        if self.converged(&c) || self.exhausted() {
            return Ok(self.finish_best(c));
        }
        let d = self.interior(x_lo, x_hi, true)?;
        let mut bracket = Bracket {
            lo: x_lo,
            hi: x_hi,
            c,
            d,
        };
        while !self.exhausted() {
            let best = self.best.unwrap_or(bracket.c);
            if self.converged(&best) {
                return Ok(self.finish(best));
            }
            bracket = self.narrow(bracket)?;
        }
        Ok(self.finish_best(bracket.c))
    }
}

/// Search for the Tikhonov weight whose projected measurement objective hits the target.
///
/// `project(mu)` must return the objective components projected by an undamped
/// upgrade computed with weight `mu`; it is called at most `max_reg_iter` times,
/// strictly sequentially. The caller commits the returned weight.
pub fn search_weight<F>(
    reg: &DynamicRegularization,
    current_meas: f64,
    project: F,
    reporter: &mut dyn Reporter,
) -> Result<WeightSearchOutcome>
where
    F: FnMut(f64) -> Result<PhiComponents>,
{
    reg.validate()?;
    Search {
        reg,
        target: reg.target(current_meas),
        project,
        reporter,
        evaluations: 0,
        best: None,
    }
    .run()
}
