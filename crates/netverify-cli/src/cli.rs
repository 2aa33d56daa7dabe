//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "netverify")]
#[command(about = "Verify control- and data-plane properties of a network with an SMT solver")]
#[command(version)]
pub(crate) struct Cli {
    /// Worker threads for independent queries
    #[arg(long, global = true, default_value_t = 1)]
    pub(crate) workers: usize,

    /// Solver timeout per query, in seconds
    #[arg(long, global = true, default_value_t = 300)]
    pub(crate) timeout: u64,

    /// Write the SMT-LIB script of every query next to this path
    #[arg(long, global = true)]
    pub(crate) dump_smt: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Inputs shared by every check.
#[derive(Args, Debug, Clone)]
pub(crate) struct Inputs {
    /// Network JSON: `{"routers": [...]}`
    pub(crate) network: PathBuf,

    /// Question JSON; omitted fields keep their defaults
    #[arg(long)]
    pub(crate) question: Option<PathBuf>,

    /// Override the maximum number of failed links
    #[arg(long)]
    pub(crate) failures: Option<u32>,

    /// Override the tie-break rule: edge-order | arbitrary
    #[arg(long)]
    pub(crate) tie_break: Option<String>,

    /// Override the base environment: any | none | sane
    #[arg(long)]
    pub(crate) env: Option<String>,

    /// Report every variable of a counterexample
    #[arg(long, default_value_t = false)]
    pub(crate) full_model: bool,

    /// Check per equivalence class on abstracted networks
    #[arg(long, default_value_t = false)]
    pub(crate) abstraction: bool,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Find some stable forwarding state
    Forwarding {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Every source reaches the destination interfaces
    Reachability {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Every source reaches the destination within `k` hops
    BoundedLength {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        k: u32,
    },
    /// All sources reach the destination over paths of equal length
    EqualLength {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Loads of neighbouring sources differ by at most `k`
    LoadBalance {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value_t = 0)]
        k: u32,
    },
    /// No router silently drops traffic it was sent
    BlackHole {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Every forwarding path of a router leads to the destination
    Multipath {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Statically routed traffic never loops
    RoutingLoop {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Route selection is deterministic
    Determinism {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Routers matching a pattern behave the same as their name-order neighbour
    LocalConsistency {
        #[command(flatten)]
        inputs: Inputs,
        /// Routers to compare
        #[arg(long, default_value = ".*")]
        routers: String,
        /// Compare chosen routes instead of forwarding
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}
