extern crate fem_1d;

use fem_1d::adapt::error_est::{exact_error, exact_norm};
use fem_1d::adapt::{diagnostics::Diagnostics, AdaptConfig, AdaptType, HpAdaptivity, Norm};
use fem_1d::domain::Mesh;
use fem_1d::fem_problem::{
    newton::NewtonSolver, BasisSample, DiscreteProblem, NewtonMeshSolver, QuadContext,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::f64::consts::PI;

/*
    Solves the system
        u0' = u1
        u1' = -u0
    on [0, 2π] with u0(0) = 0 and u1(0) = 1, whose solution is (sin(x), cos(x)),
    using hp-adaptivity in the H1 norm.

    Pass "h" or "p" as the first argument to restrict the refinements; pass "trace" to log every candidate.
*/

fn integrate(ctx: &QuadContext, f: impl Fn(usize) -> f64) -> f64 {
    (0..ctx.x.len()).map(|q| f(q) * ctx.weights[q]).sum()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let trace = args.iter().any(|a| a == "trace");
    let adapt_type = match args.get(1).map(|s| s.as_str()) {
        Some("h") => AdaptType::H,
        Some("p") => AdaptType::P,
        _ => AdaptType::Hp,
    };

    TermLogger::init(
        if trace { LevelFilter::Debug } else { LevelFilter::Info },
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

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
        integrate(ctx, |q| u.values[q] * v.values[q])
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
        integrate(ctx, |q| (ctx.u_prev[0][q] + ctx.du_prev[1][q]) * v.values[q])
    })
    .unwrap();

    let mut mesh = Mesh::new(0.0, 2.0 * PI, 3, 1, 2);
    mesh.set_bc_left_dirichlet(0, 0.0);
    mesh.set_bc_left_dirichlet(1, 1.0);

    let mut solver = NewtonMeshSolver::new(dp, NewtonSolver::with_tol(1e-8));
    let adaptivity = HpAdaptivity {
        config: AdaptConfig {
            norm: Norm::H1,
            adapt_type,
            tol_err_rel: 1e-3,
            diagnostics: Diagnostics {
                trace,
                dump_dir: None,
            },
            ..Default::default()
        },
        parallel: true,
    };

    let report = adaptivity.run(&mut mesh, &mut solver).unwrap();

    let exact = |x: f64| (vec![x.sin(), x.cos()], vec![x.cos(), -x.sin()]);
    let err = exact_error(Norm::H1, &mesh, &report.solution, exact, 30).unwrap();
    let norm = exact_norm(Norm::H1, exact, 2, 0.0, 2.0 * PI, 20, 30);

    println!("ndof\terr_est_rel [%]");
    for step in report.history.iter() {
        println!("{}\t{:.6e}", step.n_dof, step.err_est_rel);
    }
    println!(
        "converged: {}, exact relative error: {:.6e}%",
        report.converged,
        err / norm * 100.0
    );

    mesh.export_to_json("./test_output/sin_system_mesh.json").unwrap();
}
