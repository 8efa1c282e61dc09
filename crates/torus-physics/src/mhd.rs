//! Magnetized fluid: the advection chain of [`Hydro`](crate::Hydro)
//! plus a constrained-transport leg evolving a face-centered field.

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::{ParameterError, ParameterInput, PhysicsModule, TaskStatus};
use torus_mesh::{BlockField, FaceField, HaloExchange, MeshBlockPack};
use torus_task::{AssemblyError, StageContext, TaskCollections, TaskId, TaskPhase};

use crate::module_op;
use crate::viscosity::ViscousHost;

const DFLOOR: f64 = 1.0e-30;

/// Task ids contributed by one [`Mhd`] instance.
#[derive(Clone, Copy, Debug)]
pub struct MhdTaskIds {
    /// Arms the receive counts for the stage (start phase).
    pub init_recv: TaskId,
    /// Computes donor-cell upwind fluxes.
    pub calc_fluxes: TaskId,
    /// Posts shared-face flux messages.
    pub send_flux: TaskId,
    /// Polls shared-face flux messages.
    pub recv_flux: TaskId,
    /// Two-register update of the conserved cell fields.
    pub rk_update: TaskId,
    /// Unsplit source-term hook.
    pub src_terms: TaskId,
    /// Posts ghost-cell messages for the conserved fields.
    pub send_u: TaskId,
    /// Polls ghost-cell messages for the conserved fields.
    pub recv_u: TaskId,
    /// Computes the corner electric field from the updated state.
    pub corner_e: TaskId,
    /// Posts ghost messages for the electric field.
    pub send_e: TaskId,
    /// Polls ghost messages for the electric field.
    pub recv_e: TaskId,
    /// Constrained-transport update of the face field.
    pub ct: TaskId,
    /// Posts shared-face messages for the face field.
    pub send_b: TaskId,
    /// Polls shared-face messages for the face field.
    pub recv_b: TaskId,
    /// Physical boundary conditions.
    pub phys_bcs: TaskId,
    /// Primitive recovery.
    pub con_to_prim: TaskId,
    /// Timestep estimate refresh.
    pub new_dt: TaskId,
    /// Exchange teardown (end phase).
    pub clear_send: TaskId,
}

/// A magnetized fluid over a mesh-block pack.
pub struct Mhd {
    name: String,
    pub(crate) pack: MeshBlockPack,
    vel: f64,
    dtnew: f64,
    /// See [`Hydro::capture_in_update`](crate::hydro::Hydro).
    pub(crate) capture_in_update: bool,
    pub(crate) u0_d: BlockField,
    pub(crate) u0_m: BlockField,
    pub(crate) u1_d: BlockField,
    pub(crate) u1_m: BlockField,
    pub(crate) b0: FaceField,
    pub(crate) b1: FaceField,
    w_d: BlockField,
    w_v: BlockField,
    e: BlockField,
    flux_d: FaceField,
    flux_m: FaceField,
    fd_exch: HaloExchange,
    fm_exch: HaloExchange,
    ud_exch: HaloExchange,
    um_exch: HaloExchange,
    e_exch: HaloExchange,
    b_exch: HaloExchange,
}

impl Mhd {
    /// Build a magnetized fluid from its own parameter block.
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
            b0: FaceField::new(pack),
            b1: FaceField::new(pack),
            w_d: BlockField::new(pack),
            w_v: BlockField::new(pack),
            e: BlockField::new(pack),
            flux_d: FaceField::new(pack),
            flux_m: FaceField::new(pack),
            fd_exch: HaloExchange::new(),
            fm_exch: HaloExchange::new(),
            ud_exch: HaloExchange::new(),
            um_exch: HaloExchange::new(),
            e_exch: HaloExchange::new(),
            b_exch: HaloExchange::new(),
        })
    }

    /// Set the initial condition and prime the ghost cells.
    pub fn set_profile(
        &mut self,
        density: impl Fn(f64) -> f64,
        velocity: impl Fn(f64) -> f64,
        bfield: impl Fn(f64) -> f64,
    ) {
        let pack = self.pack.clone();
        self.u0_d.fill_interior(&pack, &density);
        self.u0_m.fill_interior(&pack, |x| density(x) * velocity(x));
        self.u0_d.prime_ghosts(&pack);
        self.u0_m.prime_ghosts(&pack);
        for m in 0..pack.nmb {
            for i in 0..=pack.ncells() {
                // Face coordinate: left edge of cell i.
                let x = (m * pack.nx) as f64 * pack.dx + (i as f64 - pack.ng as f64) * pack.dx;
                self.b0.block_mut(m)[i] = bfield(x);
            }
        }
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

    /// Face-centered field.
    pub fn bfield(&self) -> &FaceField {
        &self.b0
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
        self.e_exch.post_receives(n);
        self.b_exch.post_receives(n);
        TaskStatus::Complete
    }

    pub(crate) fn calc_fluxes(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let (is, ie) = (self.pack.is(), self.pack.ie());
        let vel = self.vel;
        for m in 0..self.pack.nmb {
            for i in is..=ie + 1 {
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
            self.b1.copy_from(&self.b0);
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

    /// Cell-centered electric field from the updated state: in one
    /// dimension `E = -v * B` with `B` averaged to the cell center.
    pub(crate) fn corner_e(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let (is, ie) = (self.pack.is(), self.pack.ie());
        for m in 0..self.pack.nmb {
            for i in is..=ie {
                let bcc = 0.5 * (self.b0.block(m)[i] + self.b0.block(m)[i + 1]);
                self.e.block_mut(m)[i] = -self.vel * bcc;
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn send_e(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        match self.e_exch.send_ghosts(&self.pack, &self.e) {
            Ok(()) => TaskStatus::Complete,
            Err(_) => TaskStatus::Fail,
        }
    }

    pub(crate) fn recv_e(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.e_exch.recv_ghosts(&self.pack, &mut self.e)
    }

    /// Constrained-transport update of the face field from the curl of
    /// the electric field.
    pub(crate) fn ct(&mut self, ctx: &StageContext<'_>) -> TaskStatus {
        let s = ctx.stage - 1;
        let gam0 = ctx.integrator.gam0[s];
        let gam1 = ctx.integrator.gam1[s];
        let bdtodx = ctx.integrator.beta[s] * ctx.dt / self.pack.dx;
        let (is, ie) = (self.pack.is(), self.pack.ie());
        for m in 0..self.pack.nmb {
            for i in is..=ie + 1 {
                let curl = self.e.block(m)[i] - self.e.block(m)[i - 1];
                let b = self.b0.block(m)[i];
                self.b0.block_mut(m)[i] = gam0 * b + gam1 * self.b1.block(m)[i] - bdtodx * curl;
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn send_b(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        match self.b_exch.send_shared_faces(&self.pack, &self.b0) {
            Ok(()) => TaskStatus::Complete,
            Err(_) => TaskStatus::Fail,
        }
    }

    pub(crate) fn recv_b(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.b_exch.recv_shared_faces(&self.pack, &mut self.b0)
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
        self.e_exch.clear();
        self.b_exch.clear();
        TaskStatus::Complete
    }
}

impl PhysicsModule for Mhd {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_dt(&self) -> f64 {
        self.dtnew
    }
}

impl ViscousHost for Mhd {
    fn flux_views(&mut self) -> (&MeshBlockPack, &BlockField, &mut FaceField) {
        (&self.pack, &self.u0_d, &mut self.flux_d)
    }
}

/// Add this fluid's standalone task chain, including the CT leg, to the
/// collections.
pub fn assemble_tasks(
    this: &Rc<RefCell<Mhd>>,
    tl: &mut TaskCollections,
) -> Result<MhdTaskIds, AssemblyError> {
    let n = this.borrow().name.clone();
    let t = |suffix: &str| format!("{n}_{suffix}");

    let init_recv = tl.add_task(TaskPhase::Start, &t("init_recv"), &[], module_op(this, Mhd::init_recv))?;
    let calc_fluxes = tl.add_task(TaskPhase::Run, &t("fluxes"), &[], module_op(this, Mhd::calc_fluxes))?;
    let send_flux = tl.add_task(TaskPhase::Run, &t("send_flux"), &[calc_fluxes], module_op(this, Mhd::send_flux))?;
    let recv_flux = tl.add_task(TaskPhase::Run, &t("recv_flux"), &[send_flux], module_op(this, Mhd::recv_flux))?;
    let rk_update = tl.add_task(TaskPhase::Run, &t("rk_update"), &[recv_flux], module_op(this, Mhd::rk_update))?;
    let src_terms = tl.add_task(TaskPhase::Run, &t("src_terms"), &[rk_update], module_op(this, Mhd::src_terms))?;
    let send_u = tl.add_task(TaskPhase::Run, &t("send_u"), &[src_terms], module_op(this, Mhd::send_u))?;
    let recv_u = tl.add_task(TaskPhase::Run, &t("recv_u"), &[send_u], module_op(this, Mhd::recv_u))?;
    let corner_e = tl.add_task(TaskPhase::Run, &t("corner_e"), &[recv_u], module_op(this, Mhd::corner_e))?;
    let send_e = tl.add_task(TaskPhase::Run, &t("send_e"), &[corner_e], module_op(this, Mhd::send_e))?;
    let recv_e = tl.add_task(TaskPhase::Run, &t("recv_e"), &[send_e], module_op(this, Mhd::recv_e))?;
    let ct = tl.add_task(TaskPhase::Run, &t("ct"), &[recv_e], module_op(this, Mhd::ct))?;
    let send_b = tl.add_task(TaskPhase::Run, &t("send_b"), &[ct], module_op(this, Mhd::send_b))?;
    let recv_b = tl.add_task(TaskPhase::Run, &t("recv_b"), &[send_b], module_op(this, Mhd::recv_b))?;
    let phys_bcs = tl.add_task(TaskPhase::Run, &t("phys_bcs"), &[recv_b], module_op(this, Mhd::phys_bcs))?;
    let con_to_prim = tl.add_task(TaskPhase::Run, &t("con_to_prim"), &[phys_bcs], module_op(this, Mhd::con_to_prim))?;
    let new_dt = tl.add_task(TaskPhase::Run, &t("new_dt"), &[con_to_prim], module_op(this, Mhd::new_dt))?;
    let clear_send = tl.add_task(TaskPhase::End, &t("clear_send"), &[], module_op(this, Mhd::clear_send))?;

    Ok(MhdTaskIds {
        init_recv,
        calc_fluxes,
        send_flux,
        recv_flux,
        rk_update,
        src_terms,
        send_u,
        recv_u,
        corner_e,
        send_e,
        recv_e,
        ct,
        send_b,
        recv_b,
        phys_bcs,
        con_to_prim,
        new_dt,
        clear_send,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use torus_core::TimeIntegrator;

    fn setup() -> Rc<RefCell<Mhd>> {
        let pack = MeshBlockPack {
            nmb: 2,
            nx: 8,
            ng: 2,
            dx: 1.0 / 16.0,
        };
        let pin = ParameterInput::new();
        Rc::new(RefCell::new(Mhd::from_params("mhd", &pin, &pack).unwrap()))
    }

    #[test]
    fn assembly_contains_ct_leg_in_order() {
        let mhd = setup();
        let mut tl = TaskCollections::new();
        let ids = assemble_tasks(&mhd, &mut tl).unwrap();
        tl.validate().unwrap();
        // The CT leg sits between recv_u and phys_bcs.
        assert!(ids.corner_e.0 > ids.recv_u.0);
        assert!(ids.phys_bcs.0 > ids.recv_b.0);
        assert_eq!(tl.registry().len(), 18);
    }

    #[test]
    fn timestep_estimate_seeded_at_construction() {
        let mhd = setup();
        // dx / velocity with the default unit speed, before any task runs.
        assert!((mhd.borrow().dtnew - 1.0 / 16.0).abs() < 1e-15);
    }

    #[test]
    fn uniform_field_is_a_fixed_point_of_ct() {
        let mhd = setup();
        {
            let mut m = mhd.borrow_mut();
            m.set_profile(|_| 1.0, |_| 0.5, |_| 2.0);
        }
        let integ = TimeIntegrator::from_name("rk2").unwrap();
        let ctx = StageContext {
            stage: 1,
            dt: 0.01,
            time: 0.0,
            integrator: &integ,
        };
        let mut m = mhd.borrow_mut();
        let p = m.pack.clone();
        m.rk_update(&ctx); // captures b1
        m.corner_e(&ctx);
        m.e.prime_ghosts(&p);
        m.ct(&ctx);
        // Uniform B gives a uniform E, so the curl vanishes everywhere.
        for mb in 0..p.nmb {
            for i in p.is()..=p.ie() + 1 {
                assert!((m.b0.block(mb)[i] - 2.0).abs() < 1e-14);
            }
        }
    }
}
