use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Trajectory optimization via external solvers", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the scenario comes from: a built-in preset or a JSON file.
#[derive(Args, Debug)]
pub struct ScenarioSource {
    /// Built-in preset name (see `presets`)
    #[arg(long, conflicts_with = "file")]
    pub preset: Option<String>,

    /// Path to a scenario JSON file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Refinement loop flags shared by the solving commands.
#[derive(Args, Debug)]
pub struct RefineArgs {
    /// Piece length of the coarse exploratory pass
    #[arg(long, default_value_t = 1e-3)]
    pub coarse_piece_length: f64,

    /// Piece length of the zoomed fine pass
    #[arg(long, default_value_t = 1e-5)]
    pub fine_piece_length: f64,

    /// Half-width of the bounds window around the coarse incumbent
    #[arg(long, default_value_t = 1e-2)]
    pub window: f64,

    /// Skip the zoom and run one fine pass over the full domain
    #[arg(long)]
    pub single_pass: bool,

    /// Per-pass solver time limit in seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub time_limit: u64,

    /// Fail up front instead of submitting non-convex keep-out constraints
    #[arg(long)]
    pub reject_nonconvex: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the built-in scenario presets
    Presets,

    /// Formulate a scenario and print problem statistics without solving
    Inspect {
        #[command(flatten)]
        scenario: ScenarioSource,

        /// Approximation resolution, in pieces per function constraint
        #[arg(long, default_value_t = 64)]
        pieces: u32,
    },

    /// Solve a scenario through the refinement loop
    Solve {
        #[command(flatten)]
        scenario: ScenarioSource,

        /// Solver backend: a binary name on PATH (or under ~/.mpc/solvers)
        /// or an explicit path
        #[arg(long)]
        solver: String,

        #[command(flatten)]
        refine: RefineArgs,

        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the small built-in refinement demonstration problem
    ZoomDemo {
        /// Solver backend name or path
        #[arg(long)]
        solver: String,

        #[command(flatten)]
        refine: RefineArgs,
    },
}
