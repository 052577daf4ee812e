//! Refinement loop behavior against scripted backends.

use mpc_algo::formulate::{formulate, zoom_demo_problem};
use mpc_algo::refine::{refine_scenario, refine_with, RefineConfig, RefineError, RefinePhase};
use mpc_algo::test_utils::{uniform_solution, ScriptedBackend};
use mpc_core::scenario::presets;
use mpc_solver_common::{Solution, SolutionStatus};

fn config() -> RefineConfig {
    RefineConfig::default()
}

#[test]
fn two_pass_zoom_tightens_target_bounds() {
    let scenario = presets::bicycle();
    let coarse_t = formulate(&scenario, config().coarse).unwrap();
    let backend = ScriptedBackend::new([
        uniform_solution(&coarse_t.problem, 0.1, 5.0),
        uniform_solution(&coarse_t.problem, 0.1, 4.9),
    ]);

    let outcome = refine_scenario(&backend, &config(), &scenario).unwrap();

    assert_eq!(outcome.passes.len(), 2);
    assert_eq!(outcome.passes[0].phase, RefinePhase::Coarse);
    assert_eq!(outcome.passes[1].phase, RefinePhase::Fine);
    assert_eq!(outcome.state.phase, RefinePhase::Done);
    assert_eq!(outcome.solution.objective, Some(4.9));

    // The fine problem's target bounds are a sub-interval of the coarse
    // problem's, centered on the incumbent where the original bounds allow.
    let seen = backend.seen();
    assert_eq!(seen.len(), 2);
    for &target in &coarse_t.refine_targets {
        let (clb, cub) = seen[0].bounds(target).unwrap();
        let (flb, fub) = seen[1].bounds(target).unwrap();
        assert!(flb >= clb && fub <= cub, "window escaped original bounds");
        assert!(fub - flb <= 2.0 * config().window + 1e-12);
        assert!(flb <= 0.1 && 0.1 <= fub, "incumbent left the window");
    }
}

#[test]
fn coarse_failure_is_fatal() {
    let scenario = presets::bicycle_obstacle();
    let backend = ScriptedBackend::new([Solution::infeasible("blocked")]);

    let err = refine_scenario(&backend, &config(), &scenario).unwrap_err();
    match err {
        RefineError::PassFailed {
            phase,
            status,
            incumbent,
            ..
        } => {
            assert_eq!(phase, RefinePhase::Coarse);
            assert_eq!(status, SolutionStatus::Infeasible);
            assert!(incumbent.is_none());
        }
        other => panic!("unexpected error: {}", other),
    }
    // No fine pass was attempted.
    assert_eq!(backend.seen().len(), 1);
}

#[test]
fn fine_time_limit_with_incumbent_is_best_effort() {
    let scenario = presets::bicycle();
    let t = formulate(&scenario, config().coarse).unwrap();
    let mut timed_out = uniform_solution(&t.problem, 0.1, 5.1);
    timed_out.status = SolutionStatus::TimeLimit;
    let backend = ScriptedBackend::new([uniform_solution(&t.problem, 0.1, 5.0), timed_out]);

    let outcome = refine_scenario(&backend, &config(), &scenario).unwrap();
    assert_eq!(outcome.solution.status, SolutionStatus::TimeLimit);
    assert!(outcome.solution.has_incumbent());
    assert_eq!(outcome.state.phase, RefinePhase::Done);
}

#[test]
fn fine_failure_surfaces_the_coarse_incumbent() {
    let scenario = presets::bicycle();
    let t = formulate(&scenario, config().coarse).unwrap();
    let backend = ScriptedBackend::new([
        uniform_solution(&t.problem, 0.1, 5.0),
        Solution::infeasible("window too tight"),
    ]);

    let err = refine_scenario(&backend, &config(), &scenario).unwrap_err();
    match err {
        RefineError::PassFailed {
            phase, incumbent, ..
        } => {
            assert_eq!(phase, RefinePhase::Fine);
            let incumbent = incumbent.expect("coarse incumbent should be carried");
            assert_eq!(incumbent.objective, Some(5.0));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn single_pass_skips_the_zoom() {
    let scenario = presets::bicycle();
    let t = formulate(&scenario, config().fine).unwrap();
    let backend = ScriptedBackend::new([uniform_solution(&t.problem, 0.0, 3.0)]);

    let cfg = RefineConfig {
        single_pass: true,
        ..config()
    };
    let outcome = refine_scenario(&backend, &cfg, &scenario).unwrap();

    assert_eq!(outcome.passes.len(), 1);
    assert_eq!(outcome.passes[0].phase, RefinePhase::Fine);
    // Full-domain bounds, untouched by any window.
    let seen = backend.seen();
    for &target in &t.refine_targets {
        assert_eq!(seen[0].bounds(target), t.problem.bounds(target));
    }
}

#[test]
fn stationary_scenario_admits_a_zero_cost_solution() {
    // x0 = target = origin under identity-free dynamics: the all-zeros
    // point satisfies every constraint and costs nothing. Script the
    // backend to return it and check the formulation agrees.
    let mut scenario = presets::double_integrator();
    scenario.horizon = 1;
    scenario.x0 = vec![0.0, 0.0];
    scenario.target = vec![0.0, 0.0];

    let t = formulate(&scenario, config().fine).unwrap();
    let zeros = vec![0.0; t.problem.num_variables()];
    for c in t.problem.constraints() {
        assert_eq!(
            mpc_algo::report::constraint_violation(c, &zeros),
            0.0,
            "{} not satisfied at the stationary point",
            c.name()
        );
    }
    assert_eq!(t.problem.objective().expr.value(&zeros), 0.0);

    let backend = ScriptedBackend::new([Solution::optimal(0.0, zeros)]);
    let cfg = RefineConfig {
        single_pass: true,
        ..config()
    };
    let outcome = refine_scenario(&backend, &cfg, &scenario).unwrap();
    assert_eq!(outcome.solution.objective, Some(0.0));
    assert_eq!(outcome.state.phase, RefinePhase::Done);
}

#[test]
fn backend_errors_are_distinguished_from_solver_statuses() {
    let scenario = presets::bicycle();
    // Empty script: the backend errors on the first call.
    let backend = ScriptedBackend::new([]);
    let err = refine_scenario(&backend, &config(), &scenario).unwrap_err();
    assert!(matches!(err, RefineError::Backend { .. }));
}

#[test]
fn zoom_demo_window_clamps_at_the_origin() {
    // Coarse incumbent near the lower bound: the window must clamp to it.
    let backend = ScriptedBackend::new([
        Solution::optimal(6.0, vec![0.004, 4.0, 1.0, 2.0]),
        Solution::optimal(6.01, vec![0.004, 4.0, 1.0, 2.0]),
    ]);

    let outcome = refine_with(&backend, &config(), |resolution| {
        zoom_demo_problem(resolution)
    })
    .unwrap();
    assert_eq!(outcome.state.phase, RefinePhase::Done);

    let seen = backend.seen();
    let x = seen[1].variables().iter().position(|v| v.name == "x").unwrap();
    let y = seen[1].variables().iter().position(|v| v.name == "y").unwrap();
    let (xlb, xub) = seen[1].bounds(mpc_solver_common::VarId(x)).unwrap();
    assert_eq!(xlb, 0.0);
    assert!((xub - 0.014).abs() < 1e-12);
    let (ylb, yub) = seen[1].bounds(mpc_solver_common::VarId(y)).unwrap();
    assert!((ylb - 3.99).abs() < 1e-12 && (yub - 4.01).abs() < 1e-12);
}
