//! Single-fluid hydrodynamics: 1-D linear advection of a conserved
//! density and momentum with donor-cell upwind fluxes.

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::{ParameterError, ParameterInput, PhysicsModule, TaskStatus};
use torus_mesh::{BlockField, FaceField, HaloExchange, MeshBlockPack};
use torus_task::{AssemblyError, StageContext, TaskCollections, TaskId, TaskPhase};

use crate::module_op;
use crate::viscosity::ViscousHost;

/// Density floor applied when recovering primitives.
const DFLOOR: f64 = 1.0e-30;

/// Task ids contributed by one [`Hydro`] instance, public so other
/// modules can wire themselves into the chain.
#[derive(Clone, Copy, Debug)]
pub struct HydroTaskIds {
    /// Arms the receive counts for the stage (start phase).
    pub init_recv: TaskId,
    /// Computes donor-cell upwind fluxes.
    pub calc_fluxes: TaskId,
    /// Posts shared-face flux messages.
    pub send_flux: TaskId,
    /// Polls shared-face flux messages, reconciling shared faces.
    pub recv_flux: TaskId,
    /// Two-register update of the conserved fields.
    pub rk_update: TaskId,
    /// Unsplit source-term hook.
    pub src_terms: TaskId,
    /// Posts ghost-cell messages for the conserved fields.
    pub send_u: TaskId,
    /// Polls ghost-cell messages for the conserved fields.
    pub recv_u: TaskId,
    /// Physical boundary conditions at non-periodic boundaries.
    pub phys_bcs: TaskId,
    /// Recovers primitive variables from the conserved fields.
    pub con_to_prim: TaskId,
    /// Refreshes the module's timestep estimate.
    pub new_dt: TaskId,
    /// Drains the exchanges so the next stage starts clean (end phase).
    pub clear_send: TaskId,
}

/// A single advected fluid over a mesh-block pack.
pub struct Hydro {
    name: String,
    pub(crate) pack: MeshBlockPack,
    vel: f64,
    dtnew: f64,
    /// Whether `rk_update` captures the stage-1 register itself. The
    /// two-fluid assembly performs the capture in its own leading task
    /// and clears this flag.
    pub(crate) capture_in_update: bool,
    pub(crate) u0_d: BlockField,
    pub(crate) u0_m: BlockField,
    pub(crate) u1_d: BlockField,
    pub(crate) u1_m: BlockField,
    w_d: BlockField,
    w_v: BlockField,
    flux_d: FaceField,
    flux_m: FaceField,
    fd_exch: HaloExchange,
    fm_exch: HaloExchange,
    ud_exch: HaloExchange,
    um_exch: HaloExchange,
}

impl Hydro {
    /// Build a fluid from its own parameter block.
    ///
    /// Keys: `velocity` (advection speed, default 1.0).
    pub fn from_params(
        block: &str,
        pin: &ParameterInput,
        pack: &MeshBlockPack,
    ) -> Result<Self, ParameterError> {
        let vel = pin.get_real_or(block, "velocity", 1.0)?;
        Ok(Self {
            name: block.to_string(),
            pack: pack.clone(),
            vel,
            // Construction-time estimate: the driver reduces dt once
            // before the first step runs the new_dt task.
            dtnew: Self::advective_dt(pack.dx, vel),
            capture_in_update: true,
            u0_d: BlockField::new(pack),
            u0_m: BlockField::new(pack),
            u1_d: BlockField::new(pack),
            u1_m: BlockField::new(pack),
            w_d: BlockField::new(pack),
            w_v: BlockField::new(pack),
            flux_d: FaceField::new(pack),
            flux_m: FaceField::new(pack),
            fd_exch: HaloExchange::new(),
            fm_exch: HaloExchange::new(),
            ud_exch: HaloExchange::new(),
            um_exch: HaloExchange::new(),
        })
    }

    /// Set the initial condition from physical profiles and prime the
    /// ghost cells.
    pub fn set_profile(&mut self, density: impl Fn(f64) -> f64, velocity: impl Fn(f64) -> f64) {
        let pack = self.pack.clone();
        self.u0_d.fill_interior(&pack, &density);
        self.u0_m.fill_interior(&pack, |x| density(x) * velocity(x));
        self.u0_d.prime_ghosts(&pack);
        self.u0_m.prime_ghosts(&pack);
        self.update_primitives();
    }

    /// Pack geometry.
    pub fn pack(&self) -> &MeshBlockPack {
        &self.pack
    }

    /// Conserved density.
    pub fn density(&self) -> &BlockField {
        &self.u0_d
    }

    /// Conserved momentum.
    pub fn momentum(&self) -> &BlockField {
        &self.u0_m
    }

    /// Latest timestep estimate.
    pub fn dtnew(&self) -> f64 {
        self.dtnew
    }

    fn update_primitives(&mut self) {
        for m in 0..self.pack.nmb {
            for i in 0..self.pack.ncells() {
                let d = self.u0_d.block(m)[i].max(DFLOOR);
                self.w_d.block_mut(m)[i] = d;
                self.w_v.block_mut(m)[i] = self.u0_m.block(m)[i] / d;
            }
        }
    }

    fn advective_dt(dx: f64, vel: f64) -> f64 {
        if vel != 0.0 {
            dx / vel.abs()
        } else {
            f64::MAX
        }
    }

    // ── Operators, in chain order ──

    pub(crate) fn init_recv(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let n = HaloExchange::ghost_count(&self.pack);
        self.fd_exch.post_receives(n);
        self.fm_exch.post_receives(n);
        self.ud_exch.post_receives(n);
        self.um_exch.post_receives(n);
        TaskStatus::Complete
    }

    pub(crate) fn calc_fluxes(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let (is, ie) = (self.pack.is(), self.pack.ie());
        let vel = self.vel;
        for m in 0..self.pack.nmb {
            for i in is..=ie + 1 {
                // Donor cell: take the upwind cell's state.
                let up = if vel >= 0.0 { i - 1 } else { i };
                self.flux_d.block_mut(m)[i] = vel * self.u0_d.block(m)[up];
                self.flux_m.block_mut(m)[i] = vel * self.u0_m.block(m)[up];
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn send_flux(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let ok = self
            .fd_exch
            .send_shared_faces(&self.pack, &self.flux_d)
            .and_then(|()| self.fm_exch.send_shared_faces(&self.pack, &self.flux_m));
        match ok {
            Ok(()) => TaskStatus::Complete,
            Err(_) => TaskStatus::Fail,
        }
    }

    pub(crate) fn recv_flux(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let d = self.fd_exch.recv_shared_faces(&self.pack, &mut self.flux_d);
        let m = self.fm_exch.recv_shared_faces(&self.pack, &mut self.flux_m);
        d.and(m)
    }

    pub(crate) fn rk_update(&mut self, ctx: &StageContext<'_>) -> TaskStatus {
        if ctx.stage == 1 && self.capture_in_update {
            self.u1_d.copy_from(&self.u0_d);
            self.u1_m.copy_from(&self.u0_m);
        }
        let s = ctx.stage - 1;
        let gam0 = ctx.integrator.gam0[s];
        let gam1 = ctx.integrator.gam1[s];
        let bdtodx = ctx.integrator.beta[s] * ctx.dt / self.pack.dx;
        let (is, ie) = (self.pack.is(), self.pack.ie());
        for m in 0..self.pack.nmb {
            for i in is..=ie {
                let divf_d = self.flux_d.block(m)[i + 1] - self.flux_d.block(m)[i];
                let divf_m = self.flux_m.block(m)[i + 1] - self.flux_m.block(m)[i];
                let d = self.u0_d.block(m)[i];
                let mom = self.u0_m.block(m)[i];
                self.u0_d.block_mut(m)[i] = gam0 * d + gam1 * self.u1_d.block(m)[i] - bdtodx * divf_d;
                self.u0_m.block_mut(m)[i] =
                    gam0 * mom + gam1 * self.u1_m.block(m)[i] - bdtodx * divf_m;
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn src_terms(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        // Unsplit source terms attach here; pure advection has none.
        TaskStatus::Complete
    }

    pub(crate) fn send_u(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let ok = self
            .ud_exch
            .send_ghosts(&self.pack, &self.u0_d)
            .and_then(|()| self.um_exch.send_ghosts(&self.pack, &self.u0_m));
        match ok {
            Ok(()) => TaskStatus::Complete,
            Err(_) => TaskStatus::Fail,
        }
    }

    pub(crate) fn recv_u(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let d = self.ud_exch.recv_ghosts(&self.pack, &mut self.u0_d);
        let m = self.um_exch.recv_ghosts(&self.pack, &mut self.u0_m);
        d.and(m)
    }

    pub(crate) fn phys_bcs(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        // Periodic topology: the exchange already filled every ghost.
        TaskStatus::Complete
    }

    pub(crate) fn con_to_prim(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.update_primitives();
        TaskStatus::Complete
    }

    pub(crate) fn new_dt(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.dtnew = Self::advective_dt(self.pack.dx, self.vel);
        TaskStatus::Complete
    }

    pub(crate) fn clear_send(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.fd_exch.clear();
        self.fm_exch.clear();
        self.ud_exch.clear();
        self.um_exch.clear();
        TaskStatus::Complete
    }
}

impl PhysicsModule for Hydro {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_dt(&self) -> f64 {
        self.dtnew
    }
}

impl ViscousHost for Hydro {
    fn flux_views(&mut self) -> (&MeshBlockPack, &BlockField, &mut FaceField) {
        (&self.pack, &self.u0_d, &mut self.flux_d)
    }
}

/// Add this fluid's standalone task chain to the collections.
pub fn assemble_tasks(
    this: &Rc<RefCell<Hydro>>,
    tl: &mut TaskCollections,
) -> Result<HydroTaskIds, AssemblyError> {
    let n = this.borrow().name.clone();
    let t = |suffix: &str| format!("{n}_{suffix}");

    let init_recv = tl.add_task(TaskPhase::Start, &t("init_recv"), &[], module_op(this, Hydro::init_recv))?;
    let calc_fluxes = tl.add_task(TaskPhase::Run, &t("fluxes"), &[], module_op(this, Hydro::calc_fluxes))?;
    let send_flux = tl.add_task(TaskPhase::Run, &t("send_flux"), &[calc_fluxes], module_op(this, Hydro::send_flux))?;
    let recv_flux = tl.add_task(TaskPhase::Run, &t("recv_flux"), &[send_flux], module_op(this, Hydro::recv_flux))?;
    let rk_update = tl.add_task(TaskPhase::Run, &t("rk_update"), &[recv_flux], module_op(this, Hydro::rk_update))?;
    let src_terms = tl.add_task(TaskPhase::Run, &t("src_terms"), &[rk_update], module_op(this, Hydro::src_terms))?;
    let send_u = tl.add_task(TaskPhase::Run, &t("send_u"), &[src_terms], module_op(this, Hydro::send_u))?;
    let recv_u = tl.add_task(TaskPhase::Run, &t("recv_u"), &[send_u], module_op(this, Hydro::recv_u))?;
    let phys_bcs = tl.add_task(TaskPhase::Run, &t("phys_bcs"), &[recv_u], module_op(this, Hydro::phys_bcs))?;
    let con_to_prim = tl.add_task(TaskPhase::Run, &t("con_to_prim"), &[phys_bcs], module_op(this, Hydro::con_to_prim))?;
    let new_dt = tl.add_task(TaskPhase::Run, &t("new_dt"), &[con_to_prim], module_op(this, Hydro::new_dt))?;
    let clear_send = tl.add_task(TaskPhase::End, &t("clear_send"), &[], module_op(this, Hydro::clear_send))?;

    Ok(HydroTaskIds {
        init_recv,
        calc_fluxes,
        send_flux,
        recv_flux,
        rk_update,
        src_terms,
        send_u,
        recv_u,
        phys_bcs,
        con_to_prim,
        new_dt,
        clear_send,
    })
}
