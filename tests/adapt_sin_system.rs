use fem_1d::adapt::error_est::{exact_error, exact_norm};
use fem_1d::adapt::{AdaptConfig, AdaptType, HpAdaptivity, Norm};
use fem_1d::domain::Mesh;
use fem_1d::fem_problem::{
    newton::NewtonSolver, BasisSample, DiscreteProblem, NewtonMeshSolver, QuadContext,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::f64::consts::PI;

const K: f64 = 1.0;

fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn integrate(ctx: &QuadContext, f: impl Fn(usize) -> f64) -> f64 {
    (0..ctx.x.len()).map(|q| f(q) * ctx.weights[q]).sum()
}

/// u0' = u1, u1' = -K^2 u0
fn sin_system() -> DiscreteProblem {
    let mut dp = DiscreteProblem::new(2);
    dp.add_matrix_form(0, 0, |ctx: &QuadContext, u: &BasisSample, v: &BasisSample| {
        integrate(ctx, |q| u.derivs[q] * v.values[q])
    })
    .unwrap();
    dp.add_matrix_form(0, 1, |ctx: &QuadContext, u: &BasisSample, v: &BasisSample| {
        integrate(ctx, |q| -u.values[q] * v.values[q])
    })
    .unwrap();
    dp.add_matrix_form(1, 0, |ctx: &QuadContext, u: &BasisSample, v: &BasisSample| {
        integrate(ctx, |q| K * K * u.values[q] * v.values[q])
    })
    .unwrap();
    dp.add_matrix_form(1, 1, |ctx: &QuadContext, u: &BasisSample, v: &BasisSample| {
        integrate(ctx, |q| u.derivs[q] * v.values[q])
    })
    .unwrap();
    dp.add_vector_form(0, |ctx: &QuadContext, v: &BasisSample| {
        integrate(ctx, |q| (ctx.du_prev[0][q] - ctx.u_prev[1][q]) * v.values[q])
    })
    .unwrap();
    dp.add_vector_form(1, |ctx: &QuadContext, v: &BasisSample| {
        integrate(ctx, |q| (K * K * ctx.u_prev[0][q] + ctx.du_prev[1][q]) * v.values[q])
    })
    .unwrap();
    dp
}

fn exact(x: f64) -> (Vec<f64>, Vec<f64>) {
    (
        vec![(K * x).sin(), K * (K * x).cos()],
        vec![K * (K * x).cos(), -K * K * (K * x).sin()],
    )
}

fn initial_mesh() -> Mesh {
    let mut mesh = Mesh::new(0.0, 2.0 * PI, 3, 1, 2);
    mesh.set_bc_left_dirichlet(0, 0.0);
    mesh.set_bc_left_dirichlet(1, K);
    mesh
}

fn run(adapt_type: AdaptType, parallel: bool) -> (Mesh, fem_1d::adapt::AdaptReport) {
    init_logger();
    let mut mesh = initial_mesh();
    let mut solver = NewtonMeshSolver::new(sin_system(), NewtonSolver::with_tol(1e-8));
    let adaptivity = HpAdaptivity {
        config: AdaptConfig {
            norm: Norm::H1,
            adapt_type,
            tol_err_rel: 1e-1,
            max_iterations: 40,
            max_dofs: 2_000,
            ..Default::default()
        },
        parallel,
    };

    let report = adaptivity.run(&mut mesh, &mut solver).unwrap();
    (mesh, report)
}

#[test]
fn hp_adaptivity_reaches_tolerance() {
    let (mesh, report) = run(AdaptType::Hp, false);

    assert!(report.converged);
    let first = report.history.first().unwrap();
    let last = report.history.last().unwrap();
    assert!(last.err_est_rel < 1e-1);
    assert!(last.err_est_rel < first.err_est_rel);
    assert!(last.n_dof > first.n_dof);

    let err = exact_error(Norm::H1, &mesh, &report.solution, exact, 30).unwrap();
    let norm = exact_norm(Norm::H1, exact, 2, 0.0, 2.0 * PI, 20, 30);
    assert!(err / norm < 1e-2, "relative exact error {}", err / norm);
}

#[test]
fn parallel_selection_matches_serial() {
    let (mesh_serial, report_serial) = run(AdaptType::Hp, false);
    let (mesh_parallel, report_parallel) = run(AdaptType::Hp, true);

    assert_eq!(mesh_serial.n_dof(), mesh_parallel.n_dof());
    assert_eq!(report_serial.history.len(), report_parallel.history.len());
    for (a, b) in mesh_serial.active_elems().zip(mesh_parallel.active_elems()) {
        assert_eq!(a.poly_order, b.poly_order);
        assert!((a.x1 - b.x1).abs() < 1e-14);
    }
}

#[test]
fn p_adaptivity_keeps_the_initial_elems() {
    let (mesh, report) = run(AdaptType::P, false);

    assert!(report.converged);
    assert_eq!(mesh.n_active_elems(), 3);
    assert!(mesh.active_elems().all(|e| e.level == 0 && e.poly_order > 1));
}
