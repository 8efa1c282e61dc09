//! Relativistic-field stand-in: a first-order wave system.
//!
//! Evolves the field pair (phi, pi) with `d(phi)/dt = pi` and
//! `d(pi)/dt = c^2 * d2(phi)/dx2`, followed by an algebraic bound
//! enforcement after each update.

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::{ParameterError, ParameterInput, PhysicsModule, TaskStatus};
use torus_mesh::{BlockField, HaloExchange, MeshBlockPack};
use torus_task::{AssemblyError, StageContext, TaskCollections, TaskId, TaskPhase};

use crate::module_op;

/// Task ids contributed by one [`WaveField`] instance.
#[derive(Clone, Copy, Debug)]
pub struct WaveFieldTaskIds {
    /// Arms the receive counts for the stage (start phase).
    pub init_recv: TaskId,
    /// Evaluates the right-hand sides from the current state.
    pub compute_rhs: TaskId,
    /// Two-register update of both field components.
    pub update: TaskId,
    /// Posts ghost messages for both components.
    pub send_u: TaskId,
    /// Polls ghost messages for both components.
    pub recv_u: TaskId,
    /// Physical boundary conditions.
    pub phys_bcs: TaskId,
    /// Algebraic bound enforcement.
    pub enforce: TaskId,
    /// Timestep estimate refresh.
    pub new_dt: TaskId,
    /// Exchange teardown (end phase).
    pub clear_send: TaskId,
}

/// A scalar wave field over a mesh-block pack.
pub struct WaveField {
    name: String,
    pack: MeshBlockPack,
    speed: f64,
    bound: f64,
    dtnew: f64,
    phi0: BlockField,
    pi0: BlockField,
    phi1: BlockField,
    pi1: BlockField,
    rhs_phi: BlockField,
    rhs_pi: BlockField,
    phi_exch: HaloExchange,
    pi_exch: HaloExchange,
}

impl WaveField {
    /// Build a wave field from its own parameter block.
    ///
    /// Keys: `speed` (wave speed, default 1.0) and `bound` (amplitude
    /// bound for the enforcement step, default 1.0).
    pub fn from_params(
        block: &str,
        pin: &ParameterInput,
        pack: &MeshBlockPack,
    ) -> Result<Self, ParameterError> {
        let speed = pin.get_real_or(block, "speed", 1.0)?;
        let bound = pin.get_real_or(block, "bound", 1.0)?;
        Ok(Self {
            name: block.to_string(),
            pack: pack.clone(),
            speed,
            bound,
            // Construction-time estimate: the driver reduces dt once
            // before the first step runs the new_dt task.
            dtnew: Self::wave_dt(pack.dx, speed),
            phi0: BlockField::new(pack),
            pi0: BlockField::new(pack),
            phi1: BlockField::new(pack),
            pi1: BlockField::new(pack),
            rhs_phi: BlockField::new(pack),
            rhs_pi: BlockField::new(pack),
            phi_exch: HaloExchange::new(),
            pi_exch: HaloExchange::new(),
        })
    }

    /// Set the initial condition and prime the ghost cells.
    pub fn set_profile(&mut self, phi: impl Fn(f64) -> f64, pi: impl Fn(f64) -> f64) {
        let pack = self.pack.clone();
        self.phi0.fill_interior(&pack, &phi);
        self.pi0.fill_interior(&pack, &pi);
        self.phi0.prime_ghosts(&pack);
        self.pi0.prime_ghosts(&pack);
    }

    /// Field component `phi`.
    pub fn phi(&self) -> &BlockField {
        &self.phi0
    }

    /// Field component `pi` (the time derivative of `phi`).
    pub fn pi(&self) -> &BlockField {
        &self.pi0
    }

    fn wave_dt(dx: f64, speed: f64) -> f64 {
        if speed != 0.0 {
            dx / speed.abs()
        } else {
            f64::MAX
        }
    }

    // ── Operators, in chain order ──

    pub(crate) fn init_recv(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let n = HaloExchange::ghost_count(&self.pack);
        self.phi_exch.post_receives(n);
        self.pi_exch.post_receives(n);
        TaskStatus::Complete
    }

    pub(crate) fn compute_rhs(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let (is, ie) = (self.pack.is(), self.pack.ie());
        let c2odx2 = self.speed * self.speed / (self.pack.dx * self.pack.dx);
        for m in 0..self.pack.nmb {
            for i in is..=ie {
                self.rhs_phi.block_mut(m)[i] = self.pi0.block(m)[i];
                let lap = self.phi0.block(m)[i + 1] - 2.0 * self.phi0.block(m)[i]
                    + self.phi0.block(m)[i - 1];
                self.rhs_pi.block_mut(m)[i] = c2odx2 * lap;
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn update(&mut self, ctx: &StageContext<'_>) -> TaskStatus {
        if ctx.stage == 1 {
            self.phi1.copy_from(&self.phi0);
            self.pi1.copy_from(&self.pi0);
        }
        let s = ctx.stage - 1;
        let gam0 = ctx.integrator.gam0[s];
        let gam1 = ctx.integrator.gam1[s];
        let bdt = ctx.integrator.beta[s] * ctx.dt;
        let (is, ie) = (self.pack.is(), self.pack.ie());
        for m in 0..self.pack.nmb {
            for i in is..=ie {
                let phi = self.phi0.block(m)[i];
                let pi = self.pi0.block(m)[i];
                self.phi0.block_mut(m)[i] =
                    gam0 * phi + gam1 * self.phi1.block(m)[i] + bdt * self.rhs_phi.block(m)[i];
                self.pi0.block_mut(m)[i] =
                    gam0 * pi + gam1 * self.pi1.block(m)[i] + bdt * self.rhs_pi.block(m)[i];
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn send_u(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let ok = self
            .phi_exch
            .send_ghosts(&self.pack, &self.phi0)
            .and_then(|()| self.pi_exch.send_ghosts(&self.pack, &self.pi0));
        match ok {
            Ok(()) => TaskStatus::Complete,
            Err(_) => TaskStatus::Fail,
        }
    }

    pub(crate) fn recv_u(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let a = self.phi_exch.recv_ghosts(&self.pack, &mut self.phi0);
        let b = self.pi_exch.recv_ghosts(&self.pack, &mut self.pi0);
        a.and(b)
    }

    pub(crate) fn phys_bcs(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        // Periodic topology: the exchange already filled every ghost.
        TaskStatus::Complete
    }

    /// Clamp both components into `[-bound, bound]`.
    pub(crate) fn enforce(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        let bound = self.bound;
        for m in 0..self.pack.nmb {
            for i in 0..self.pack.ncells() {
                let phi = &mut self.phi0.block_mut(m)[i];
                *phi = phi.clamp(-bound, bound);
                let pi = &mut self.pi0.block_mut(m)[i];
                *pi = pi.clamp(-bound, bound);
            }
        }
        TaskStatus::Complete
    }

    pub(crate) fn new_dt(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.dtnew = Self::wave_dt(self.pack.dx, self.speed);
        TaskStatus::Complete
    }

    pub(crate) fn clear_send(&mut self, _ctx: &StageContext<'_>) -> TaskStatus {
        self.phi_exch.clear();
        self.pi_exch.clear();
        TaskStatus::Complete
    }
}

impl PhysicsModule for WaveField {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_dt(&self) -> f64 {
        self.dtnew
    }
}

/// Add this field's task chain to the collections.
pub fn assemble_tasks(
    this: &Rc<RefCell<WaveField>>,
    tl: &mut TaskCollections,
) -> Result<WaveFieldTaskIds, AssemblyError> {
    let n = this.borrow().name.clone();
    let t = |suffix: &str| format!("{n}_{suffix}");

    let init_recv = tl.add_task(TaskPhase::Start, &t("init_recv"), &[], module_op(this, WaveField::init_recv))?;
    let compute_rhs = tl.add_task(TaskPhase::Run, &t("compute_rhs"), &[], module_op(this, WaveField::compute_rhs))?;
    let update = tl.add_task(TaskPhase::Run, &t("update"), &[compute_rhs], module_op(this, WaveField::update))?;
    let send_u = tl.add_task(TaskPhase::Run, &t("send_u"), &[update], module_op(this, WaveField::send_u))?;
    let recv_u = tl.add_task(TaskPhase::Run, &t("recv_u"), &[send_u], module_op(this, WaveField::recv_u))?;
    let phys_bcs = tl.add_task(TaskPhase::Run, &t("phys_bcs"), &[recv_u], module_op(this, WaveField::phys_bcs))?;
    let enforce = tl.add_task(TaskPhase::Run, &t("enforce"), &[phys_bcs], module_op(this, WaveField::enforce))?;
    let new_dt = tl.add_task(TaskPhase::Run, &t("new_dt"), &[enforce], module_op(this, WaveField::new_dt))?;
    let clear_send = tl.add_task(TaskPhase::End, &t("clear_send"), &[], module_op(this, WaveField::clear_send))?;

    Ok(WaveFieldTaskIds {
        init_recv,
        compute_rhs,
        update,
        send_u,
        recv_u,
        phys_bcs,
        enforce,
        new_dt,
        clear_send,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use torus_core::TimeIntegrator;

    fn setup(pin: &ParameterInput) -> Rc<RefCell<WaveField>> {
        let pack = MeshBlockPack {
            nmb: 2,
            nx: 16,
            ng: 2,
            dx: 1.0 / 32.0,
        };
        Rc::new(RefCell::new(
            WaveField::from_params("wave", pin, &pack).unwrap(),
        ))
    }

    #[test]
    fn assembly_is_valid() {
        let pin = ParameterInput::new();
        let wave = setup(&pin);
        let mut tl = TaskCollections::new();
        let ids = assemble_tasks(&wave, &mut tl).unwrap();
        tl.validate().unwrap();
        assert!(ids.enforce.0 > ids.phys_bcs.0);
        assert_eq!(tl.registry().len(), 9);
    }

    #[test]
    fn timestep_estimate_seeded_at_construction() {
        let pin = ParameterInput::new();
        let wave = setup(&pin);
        // dx / speed with the default unit speed, before any task runs.
        assert!((wave.borrow().dtnew - 1.0 / 32.0).abs() < 1e-15);
    }

    #[test]
    fn enforce_clamps_to_bound() {
        let mut pin = ParameterInput::new();
        pin.set("wave", "bound", "0.5");
        let wave = setup(&pin);
        {
            let mut w = wave.borrow_mut();
            w.set_profile(|x| 2.0 * (6.283 * x).sin(), |_| 0.0);
        }
        let integ = TimeIntegrator::from_name("rk1").unwrap();
        let ctx = StageContext {
            stage: 1,
            dt: 0.0,
            time: 0.0,
            integrator: &integ,
        };
        let mut w = wave.borrow_mut();
        w.enforce(&ctx);
        let p = w.pack.clone();
        for m in 0..p.nmb {
            for i in 0..p.ncells() {
                assert!(w.phi0.block(m)[i].abs() <= 0.5 + 1e-15);
            }
        }
    }

    #[test]
    fn uniform_state_stays_uniform() {
        let pin = ParameterInput::new();
        let wave = setup(&pin);
        {
            let mut w = wave.borrow_mut();
            w.set_profile(|_| 0.25, |_| 0.0);
        }
        let integ = TimeIntegrator::from_name("rk2").unwrap();
        for stage in 1..=2 {
            let ctx = StageContext {
                stage,
                dt: 0.005,
                time: 0.0,
                integrator: &integ,
            };
            let mut w = wave.borrow_mut();
            w.compute_rhs(&ctx);
            w.update(&ctx);
            let p = w.pack.clone();
            w.phi0.prime_ghosts(&p);
            w.pi0.prime_ghosts(&p);
        }
        let w = wave.borrow();
        let p = w.pack.clone();
        for m in 0..p.nmb {
            for i in p.is()..=p.ie() {
                assert!((w.phi0.block(m)[i] - 0.25).abs() < 1e-14);
                assert!(w.pi0.block(m)[i].abs() < 1e-14);
            }
        }
    }
}
