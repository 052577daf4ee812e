use assert_cmd::Command;
use predicates::prelude::*;

fn mpc() -> Command {
    Command::cargo_bin("mpc").unwrap()
}

#[test]
fn presets_lists_the_builtin_scenarios() {
    mpc()
        .arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("double-integrator"))
        .stdout(predicate::str::contains("bicycle-obstacle"));
}

#[test]
fn inspect_reports_problem_statistics() {
    mpc()
        .args(["inspect", "--preset", "bicycle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Variables:"))
        .stdout(predicate::str::contains("Refinement targets: 20"));
}

#[test]
fn inspect_flags_nonconvex_keepouts() {
    mpc()
        .args(["inspect", "--preset", "bicycle-obstacle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Non-convex:  yes"));
}

#[test]
fn unknown_preset_fails_with_the_available_names() {
    mpc()
        .args(["inspect", "--preset", "no-such-preset"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown preset"))
        .stderr(predicate::str::contains("double-integrator"));
}

#[test]
fn solve_requires_a_resolvable_solver() {
    mpc()
        .args([
            "solve",
            "--preset",
            "bicycle",
            "--solver",
            "definitely-not-a-solver-binary",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn scenario_source_is_required() {
    mpc().arg("inspect").assert().failure();
}
