//! End-to-end two-fluid ImEx runs through the driver.

use std::cell::RefCell;
use std::rc::Rc;

use torus_core::{ParameterInput, PhysicsModule};
use torus_driver::{Driver, DriverConfig, DriverState};
use torus_mesh::MeshBlockPack;
use torus_physics::{ion_neutral, Hydro, IonNeutral, Mhd};
use torus_task::TaskCollections;

fn pack() -> MeshBlockPack {
    MeshBlockPack {
        nmb: 4,
        nx: 16,
        ng: 2,
        dx: 1.0 / 64.0,
    }
}

fn build(pin: &ParameterInput) -> (Rc<RefCell<Mhd>>, Rc<RefCell<Hydro>>, Rc<RefCell<IonNeutral>>) {
    let p = pack();
    let ion = Rc::new(RefCell::new(Mhd::from_params("mhd", pin, &p).unwrap()));
    let neutral = Rc::new(RefCell::new(Hydro::from_params("hydro", pin, &p).unwrap()));
    ion.borrow_mut().set_profile(
        |x| 0.2 + 0.05 * (2.0 * std::f64::consts::PI * x).sin(),
        |x| 0.3 * (2.0 * std::f64::consts::PI * x).cos(),
        |_| 1.0,
    );
    neutral.borrow_mut().set_profile(
        |x| 1.0 + 0.1 * (2.0 * std::f64::consts::PI * x).cos(),
        |x| -0.2 * (2.0 * std::f64::consts::PI * x).cos(),
        );
    let inm = Rc::new(RefCell::new(
        IonNeutral::from_params(pin, Rc::clone(&ion), Rc::clone(&neutral)).unwrap(),
    ));
    (ion, neutral, inm)
}

fn totals(ion: &Mhd, neutral: &Hydro, p: &MeshBlockPack) -> (f64, f64) {
    (
        ion.density().interior_sum(p) + neutral.density().interior_sum(p),
        ion.momentum().interior_sum(p) + neutral.momentum().interior_sum(p),
    )
}

fn run(pin: &ParameterInput, integrator: &str) {
    let p = pack();
    let (ion, neutral, inm) = build(pin);
    let (mass0, mom0) = totals(&ion.borrow(), &neutral.borrow(), &p);

    let mut tl = TaskCollections::new();
    ion_neutral::assemble_tasks(&inm, &mut tl).unwrap();

    let cfg = DriverConfig {
        integrator: integrator.to_string(),
        tlim: 0.05,
        nlim: Some(50),
        cfl: 0.4,
        max_stage_passes: None,
    };
    let modules: Vec<Rc<RefCell<dyn PhysicsModule>>> =
        vec![ion.clone(), neutral.clone(), inm.clone()];
    let mut driver = Driver::new(cfg, tl, modules).unwrap();
    let summary = driver.execute().unwrap();

    assert_eq!(driver.state(), DriverState::StageDone);
    assert!(summary.ncycle > 1);
    assert!(summary.dt > 0.0);

    let (mass1, mom1) = totals(&ion.borrow(), &neutral.borrow(), &p);
    // Drag, ionization, and recombination only move mass and momentum
    // between the species; advection telescopes over the periodic
    // domain. The totals are invariants of the whole step.
    assert!((mass1 - mass0).abs() < 1e-9 * mass0.abs(), "{mass0} -> {mass1}");
    assert!((mom1 - mom0).abs() < 1e-9, "{mom0} -> {mom1}");
}

#[test]
fn imex2_two_fluid_run_conserves_totals() {
    let mut pin = ParameterInput::new();
    pin.set("hydro", "velocity", "0.7");
    pin.set("mhd", "velocity", "1.0");
    pin.set("ion_neutral", "drag_coeff", "20.0");
    pin.set("ion_neutral", "ionization_coeff", "0.2");
    pin.set("ion_neutral", "recombination_coeff", "0.1");
    run(&pin, "imex2");
}

#[test]
fn damped_imex2_run_also_completes() {
    let mut pin = ParameterInput::new();
    pin.set("ion_neutral", "drag_coeff", "200.0");
    run(&pin, "imex2+");
}

#[test]
fn strong_drag_pulls_the_velocities_together() {
    let mut pin = ParameterInput::new();
    pin.set("hydro", "velocity", "0.0");
    pin.set("mhd", "velocity", "0.0");
    pin.set("ion_neutral", "drag_coeff", "500.0");
    let p = pack();
    let (ion, neutral, inm) = build(&pin);

    let max_drift = |ion: &Mhd, neutral: &Hydro| {
        let mut drift: f64 = 0.0;
        for m in 0..p.nmb {
            for i in p.is()..=p.ie() {
                let vi = ion.momentum().block(m)[i] / ion.density().block(m)[i];
                let vn = neutral.momentum().block(m)[i] / neutral.density().block(m)[i];
                drift = drift.max((vi - vn).abs());
            }
        }
        drift
    };
    let drift0 = max_drift(&ion.borrow(), &neutral.borrow());

    let mut tl = TaskCollections::new();
    ion_neutral::assemble_tasks(&inm, &mut tl).unwrap();

    // No advection: the CFL estimate is unbounded, so the step clamps
    // straight to tlim and the run is a single stiff step.
    let cfg = DriverConfig {
        integrator: "imex2".to_string(),
        tlim: 0.05,
        nlim: Some(10),
        cfl: 0.1,
        max_stage_passes: None,
    };
    let modules: Vec<Rc<RefCell<dyn PhysicsModule>>> = vec![inm.clone()];
    let mut driver = Driver::new(cfg, tl, modules).unwrap();
    driver.execute().unwrap();

    // One L-stable step at drag*rho*dt ~ 30 damps the velocity drift by
    // the stability-function factor, roughly 0.12.
    let drift1 = max_drift(&ion.borrow(), &neutral.borrow());
    assert!(drift1 < 0.3 * drift0, "drift {drift0} -> {drift1}");
}
