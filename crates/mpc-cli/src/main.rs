use std::fs;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use mpc_algo::backend::SubprocessBackend;
use mpc_algo::formulate::{formulate, zoom_demo_problem};
use mpc_algo::refine::{refine_with, RefineConfig, RefineError};
use mpc_algo::report::{violation_summary, TrajectoryReport};
use mpc_core::scenario::presets;
use mpc_core::Scenario;
use mpc_solver_common::{Constraint, NonconvexPolicy, Resolution};

mod cli;
use cli::{Cli, Commands, RefineArgs, ScenarioSource};

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Presets => {
            for name in presets::NAMES {
                let scenario = presets::by_name(name).expect("preset table is consistent");
                println!(
                    "{:<20} horizon {:>3}  dt {:>5}  {} states, {} controls, {} obstacle(s)",
                    name,
                    scenario.horizon,
                    scenario.dt,
                    scenario.dynamics.state_dim(),
                    scenario.dynamics.control_dim(),
                    scenario.obstacles.len()
                );
            }
            Ok(())
        }
        Commands::Inspect { scenario, pieces } => {
            let scenario = load_scenario(&scenario)?;
            inspect(&scenario, Resolution::Pieces(pieces))
        }
        Commands::Solve {
            scenario,
            solver,
            refine,
            json,
        } => {
            let scenario = load_scenario(&scenario)?;
            solve(&scenario, &solver, &refine, json)
        }
        Commands::ZoomDemo { solver, refine } => zoom_demo(&solver, &refine),
    }
}

fn load_scenario(source: &ScenarioSource) -> anyhow::Result<Scenario> {
    if let Some(name) = &source.preset {
        return presets::by_name(name).ok_or_else(|| {
            anyhow!(
                "unknown preset '{}'; available: {}",
                name,
                presets::NAMES.join(", ")
            )
        });
    }
    if let Some(path) = &source.file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scenario file {}", path.display()))?;
        scenario.validate()?;
        return Ok(scenario);
    }
    bail!("provide a scenario with --preset or --file");
}

fn refine_config(args: &RefineArgs) -> RefineConfig {
    RefineConfig {
        coarse: Resolution::PieceLength(args.coarse_piece_length),
        fine: Resolution::PieceLength(args.fine_piece_length),
        window: args.window,
        single_pass: args.single_pass,
    }
}

fn inspect(scenario: &Scenario, resolution: Resolution) -> anyhow::Result<()> {
    let t = formulate(scenario, resolution)?;

    let mut linear = 0;
    let mut quadratic = 0;
    let mut func = 0;
    for c in t.problem.constraints() {
        match c {
            Constraint::Linear { .. } => linear += 1,
            Constraint::Quadratic { .. } => quadratic += 1,
            Constraint::Func { .. } => func += 1,
        }
    }

    println!("Scenario:    {}", scenario.name);
    println!("Horizon:     {} steps of {} s", scenario.horizon, scenario.dt);
    println!("Variables:   {}", t.problem.num_variables());
    println!(
        "Constraints: {} ({} linear, {} quadratic, {} function)",
        t.problem.num_constraints(),
        linear,
        quadratic,
        func
    );
    println!("Refinement targets: {}", t.refine_targets.len());
    match t.problem.nonconvex_constraint() {
        Some(name) => println!("Non-convex:  yes (first: {})", name),
        None => println!("Non-convex:  no"),
    }
    Ok(())
}

fn solve(scenario: &Scenario, solver: &str, args: &RefineArgs, json: bool) -> anyhow::Result<()> {
    let backend = SubprocessBackend::from_spec(solver)?;
    let config = refine_config(args);

    let outcome = refine_with(&backend, &config, |resolution| {
        let t = formulate(scenario, resolution)?;
        let mut problem = t.problem;
        problem.config.time_limit_seconds = args.time_limit;
        if args.reject_nonconvex {
            problem.config.nonconvex = NonconvexPolicy::Reject;
        }
        Ok((problem, t.refine_targets))
    })
    .map_err(describe_refine_error)?;

    for pass in &outcome.passes {
        info!(
            phase = %pass.phase,
            resolution = %pass.resolution,
            status = %pass.status,
            objective = ?pass.objective,
            solve_time_ms = pass.solve_time_ms,
            "pass"
        );
    }

    // The report needs the layout; formulating again is cheap and, by
    // determinism, id-compatible with the solved problem.
    let t = formulate(scenario, config.fine)?;
    let report = TrajectoryReport::build(scenario, &t, &outcome.solution);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn zoom_demo(solver: &str, args: &RefineArgs) -> anyhow::Result<()> {
    let backend = SubprocessBackend::from_spec(solver)?;
    let config = refine_config(args);

    let outcome = refine_with(&backend, &config, |resolution| {
        let (mut problem, targets) = zoom_demo_problem(resolution)?;
        problem.config.time_limit_seconds = args.time_limit;
        Ok((problem, targets))
    })
    .map_err(describe_refine_error)?;

    let (problem, _) = zoom_demo_problem(config.fine)?;
    println!("Status:    {}", outcome.solution.status);
    if let Some(obj) = outcome.solution.objective {
        println!("Objective: {:.6}", obj);
    }
    for (i, var) in problem.variables().iter().enumerate() {
        if let Some(v) = outcome.solution.value(mpc_solver_common::VarId(i)) {
            println!("  {} = {:.6}", var.name, v);
        }
    }
    let (violations, max) =
        violation_summary(&problem, &outcome.solution, problem.config.tolerance);
    println!("Max violation: {:.3e}", max);
    for v in violations {
        println!("  {} violated by {:.3e}", v.name, v.violation);
    }
    Ok(())
}

/// Attach the best-effort incumbent to refinement failures so the user
/// still sees what the solver had in hand.
fn describe_refine_error(err: RefineError) -> anyhow::Error {
    if let RefineError::PassFailed {
        incumbent: Some(incumbent),
        ..
    } = &err
    {
        let objective = incumbent
            .objective
            .map(|o| format!("{:.6}", o))
            .unwrap_or_else(|| "unknown".to_string());
        return anyhow!("{} (last incumbent objective: {})", err, objective);
    }
    anyhow::Error::new(err)
}
