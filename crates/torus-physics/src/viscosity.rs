//! Diffusive transport attached to a host fluid.
//!
//! Viscosity does not own a task chain of its own: it contributes a
//! single flux-correction operator and wires it between the host's flux
//! computation and conserved update with a late dependency edge.

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::{ParameterError, ParameterInput, PhysicsModule, TaskStatus};
use torus_mesh::{BlockField, FaceField, MeshBlockPack};
use torus_task::{AssemblyError, TaskCollections, TaskId, TaskPhase};

/// A fluid module that accepts diffusive flux corrections.
pub trait ViscousHost {
    /// Pack geometry plus the conserved density and its mass flux,
    /// borrowed together so the correction can read one while writing
    /// the other.
    fn flux_views(&mut self) -> (&MeshBlockPack, &BlockField, &mut FaceField);
}

/// Task ids contributed by one [`Viscosity`] instance.
#[derive(Clone, Copy, Debug)]
pub struct ViscosityTaskIds {
    /// Adds the diffusive correction to the host's fluxes.
    pub visc_flux: TaskId,
}

/// Diffusive flux correction for a host fluid's conserved density.
pub struct Viscosity {
    nu: f64,
    dx: f64,
    dtnew: f64,
}

impl Viscosity {
    /// Build from the host fluid's parameter block, which must carry a
    /// `viscosity` key (the kinematic coefficient).
    pub fn from_params(
        host_block: &str,
        pin: &ParameterInput,
        pack: &MeshBlockPack,
    ) -> Result<Self, ParameterError> {
        let nu = pin.get_real(host_block, "viscosity")?;
        // Parabolic stability bound in one dimension.
        let dtnew = 0.5 * pack.dx * pack.dx / nu;
        Ok(Self {
            nu,
            dx: pack.dx,
            dtnew,
        })
    }

    /// Diffusive coefficient.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    fn add_visc_flux(&mut self, host: &mut dyn ViscousHost) -> TaskStatus {
        let (pack, u, flux) = host.flux_views();
        let (is, ie) = (pack.is(), pack.ie());
        let nu_odx = self.nu / self.dx;
        for m in 0..pack.nmb {
            for i in is..=ie + 1 {
                let grad = u.block(m)[i] - u.block(m)[i - 1];
                flux.block_mut(m)[i] -= nu_odx * grad;
            }
        }
        TaskStatus::Complete
    }
}

impl PhysicsModule for Viscosity {
    fn name(&self) -> &str {
        "viscosity"
    }

    fn new_dt(&self) -> f64 {
        self.dtnew
    }
}

/// Wire the flux correction into an already-assembled host chain.
///
/// The new task depends on the host's flux computation; the host's
/// conserved update gains a late dependency on the new task so the
/// correction lands before the fluxes are consumed.
pub fn assemble_tasks<H: ViscousHost + 'static>(
    this: &Rc<RefCell<Viscosity>>,
    host: &Rc<RefCell<H>>,
    host_fluxes: TaskId,
    host_update: TaskId,
    tl: &mut TaskCollections,
) -> Result<ViscosityTaskIds, AssemblyError> {
    let visc_flux = tl.add_task(TaskPhase::Run, "visc_flux", &[host_fluxes], {
        let this = Rc::clone(this);
        let host = Rc::clone(host);
        Box::new(move |_ctx| this.borrow_mut().add_visc_flux(&mut *host.borrow_mut()))
    })?;
    tl.add_dependency(host_update, visc_flux)?;
    Ok(ViscosityTaskIds { visc_flux })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydro::{self, Hydro};

    fn pack() -> MeshBlockPack {
        MeshBlockPack {
            nmb: 2,
            nx: 8,
            ng: 2,
            dx: 1.0 / 16.0,
        }
    }

    #[test]
    fn missing_coefficient_is_an_error() {
        let pin = ParameterInput::new();
        assert!(Viscosity::from_params("hydro", &pin, &pack()).is_err());
    }

    #[test]
    fn timestep_estimate_is_parabolic() {
        let mut pin = ParameterInput::new();
        pin.set("hydro", "viscosity", "0.01");
        let visc = Viscosity::from_params("hydro", &pin, &pack()).unwrap();
        let dx = 1.0 / 16.0;
        assert!((visc.new_dt() - 0.5 * dx * dx / 0.01).abs() < 1e-15);
    }

    #[test]
    fn correction_lands_between_host_fluxes_and_update() {
        let mut pin = ParameterInput::new();
        pin.set("hydro", "viscosity", "0.01");
        let p = pack();
        let host = Rc::new(RefCell::new(Hydro::from_params("hydro", &pin, &p).unwrap()));
        let visc = Rc::new(RefCell::new(
            Viscosity::from_params("hydro", &pin, &p).unwrap(),
        ));

        let mut tl = TaskCollections::new();
        let host_ids = hydro::assemble_tasks(&host, &mut tl).unwrap();
        let ids = assemble_tasks(
            &visc,
            &host,
            host_ids.calc_fluxes,
            host_ids.rk_update,
            &mut tl,
        )
        .unwrap();
        tl.validate().unwrap();

        // The host's update now waits on the correction.
        let deps = tl
            .run
            .tasks()
            .iter()
            .find(|t| t.id() == host_ids.rk_update)
            .unwrap()
            .dep_ids()
            .to_vec();
        assert!(deps.contains(&ids.visc_flux));
    }

    #[test]
    fn diffusion_flattens_a_gradient() {
        let mut pin = ParameterInput::new();
        pin.set("hydro", "viscosity", "0.1");
        let p = pack();
        let host = Rc::new(RefCell::new(Hydro::from_params("hydro", &pin, &p).unwrap()));
        host.borrow_mut()
            .set_profile(|x| if x < 0.5 { 2.0 } else { 1.0 }, |_| 0.0);
        let visc = Rc::new(RefCell::new(
            Viscosity::from_params("hydro", &pin, &p).unwrap(),
        ));

        // Zero advective flux plus the diffusive correction: every face
        // flux must oppose the local gradient, and the jumps must drive
        // a nonzero flux.
        let mut h = host.borrow_mut();
        let mut v = visc.borrow_mut();
        v.add_visc_flux(&mut *h);
        let (pk, u, flux) = h.flux_views();
        let (is, ie) = (pk.is(), pk.ie());
        let mut saw_transport = false;
        for m in 0..pk.nmb {
            for i in is..=ie + 1 {
                let grad = u.block(m)[i] - u.block(m)[i - 1];
                assert!(flux.block(m)[i] * grad <= 1e-15);
                if flux.block(m)[i].abs() > 1e-12 {
                    saw_transport = true;
                }
            }
        }
        assert!(saw_transport);
    }
}
