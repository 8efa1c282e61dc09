//! Multi-stage time-integrator coefficient tables.
//!
//! All explicit schemes are expressed in the two-register form
//! `u0 = gam0*u0 + gam1*u1 + beta*dt*F(u0)` with the `u1` register
//! captured at the first stage. ImEx schemes additionally carry the
//! implicit diagonal `a_impl` and the lower-triangular coupling table
//! `a_twid` consumed by stiff-source operators.

/// Coefficient tables for one multi-stage time-integration scheme.
///
/// Operators receive the integrator through the stage context and index
/// `gam0`/`gam1`/`beta` by `stage - 1`. For ImEx schemes the implicit
/// sub-stage count exceeds the explicit stage count by two: the first two
/// implicit solves run inside the first explicit stage.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeIntegrator {
    /// Scheme name as given in the `<time>` block (`rk1`, `rk2`, `rk3`,
    /// `imex2`, `imex2+`).
    pub name: String,
    /// Number of explicit stages driven by the stage loop.
    pub nstages: usize,
    /// Number of explicit stages seen by ImEx operators (equals `nstages`).
    pub nexp_stages: usize,
    /// Number of implicit sub-stages (`0` for pure explicit schemes).
    pub nimp_stages: usize,
    /// Weight of the current register per stage.
    pub gam0: Vec<f64>,
    /// Weight of the stage-1 register per stage.
    pub gam1: Vec<f64>,
    /// Weight of `dt` times the flux divergence per stage.
    pub beta: Vec<f64>,
    /// Implicit diagonal coefficient (ImEx schemes only).
    pub a_impl: f64,
    /// Lower-triangular coupling weights for previously recorded stiff
    /// sources, indexed `[implicit_stage - 2][source_stage - 1]`.
    pub a_twid: Vec<Vec<f64>>,
}

impl TimeIntegrator {
    /// Look up a scheme by name. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rk1" => Some(Self {
                name: name.to_string(),
                nstages: 1,
                nexp_stages: 1,
                nimp_stages: 0,
                gam0: vec![0.0],
                gam1: vec![1.0],
                beta: vec![1.0],
                a_impl: 0.0,
                a_twid: Vec::new(),
            }),
            "rk2" => Some(Self {
                name: name.to_string(),
                nstages: 2,
                nexp_stages: 2,
                nimp_stages: 0,
                gam0: vec![0.0, 0.5],
                gam1: vec![1.0, 0.5],
                beta: vec![1.0, 0.5],
                a_impl: 0.0,
                a_twid: Vec::new(),
            }),
            "rk3" => Some(Self {
                name: name.to_string(),
                nstages: 3,
                nexp_stages: 3,
                nimp_stages: 0,
                gam0: vec![0.0, 0.75, 1.0 / 3.0],
                gam1: vec![1.0, 0.25, 2.0 / 3.0],
                beta: vec![1.0, 0.25, 2.0 / 3.0],
                a_impl: 0.0,
                a_twid: Vec::new(),
            }),
            // ImEx-SSP2: two explicit stages (Heun) plus four implicit
            // sub-stages, the first two of which run back-to-back before
            // explicit stage 1 so stage-1 fluxes see the relaxed state.
            // The coupling rows are expressed relative to the running
            // two-register state (hence "twiddle"): composed through the
            // stage loop they reproduce the stiffly accurate tableau with
            // abscissae (gamma, 1-gamma, 1), whose stability function is
            // (1 + (1-2*gamma)z) / (1 - gamma*z)^2 -- second order and
            // L-stable. "imex2+" shares the tableau but damps the first
            // two implicit solves to zero.
            "imex2" | "imex2+" => {
                let gamma = 1.0 - 1.0 / std::f64::consts::SQRT_2;
                Some(Self {
                    name: name.to_string(),
                    nstages: 2,
                    nexp_stages: 2,
                    nimp_stages: 4,
                    gam0: vec![0.0, 0.5],
                    gam1: vec![1.0, 0.5],
                    beta: vec![1.0, 0.5],
                    a_impl: gamma,
                    a_twid: vec![
                        vec![1.0 - 3.0 * gamma],
                        vec![1.0 - gamma, 0.0],
                        vec![0.5 * (1.0 - gamma), 0.0, 0.5 * gamma],
                    ],
                })
            }
            _ => None,
        }
    }

    /// Whether the scheme has implicit sub-stages.
    pub fn is_imex(&self) -> bool {
        self.nimp_stages > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_schemes_resolve() {
        for (name, nstages) in [("rk1", 1), ("rk2", 2), ("rk3", 3), ("imex2", 2)] {
            let integ = TimeIntegrator::from_name(name).unwrap();
            assert_eq!(integ.nstages, nstages);
            assert_eq!(integ.gam0.len(), nstages);
            assert_eq!(integ.gam1.len(), nstages);
            assert_eq!(integ.beta.len(), nstages);
        }
        assert!(TimeIntegrator::from_name("rk4").is_none());
    }

    #[test]
    fn rk_schemes_are_consistent() {
        // gam0 + gam1 must sum to 1 at every stage or the update is not
        // a convex combination of the two registers.
        for name in ["rk1", "rk2", "rk3", "imex2"] {
            let integ = TimeIntegrator::from_name(name).unwrap();
            for s in 0..integ.nstages {
                assert!((integ.gam0[s] + integ.gam1[s] - 1.0).abs() < 1e-14, "{name}");
            }
        }
    }

    #[test]
    fn imex_tables_shaped_for_substage_indexing() {
        let integ = TimeIntegrator::from_name("imex2").unwrap();
        assert!(integ.is_imex());
        assert_eq!(integ.nimp_stages, integ.nexp_stages + 2);
        // Row for implicit sub-stage `istage` has `istage - 1` entries.
        assert_eq!(integ.a_twid.len(), 3);
        for (row, coeffs) in integ.a_twid.iter().enumerate() {
            assert_eq!(coeffs.len(), row + 1);
        }
        assert!(integ.a_impl > 0.0 && integ.a_impl < 1.0);
    }
}
