//! Command-line options
//!
//! One flat option set shared by every backend; adapters validate the
//! combinations they care about in `check_cli`.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};

/// Which backend runs the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// C bounded model checking
    Cbmc,
    /// C bounded model checking via ESBMC
    Esbmc,
    /// CADP with an LNT monitor process
    CadpMonitor,
    /// CADP with MCL model checking
    Cadp,
    /// CADP over a compositionally-minimized parallel encoding
    CadpComp,
    /// nuXmv symbolic model checking
    Nuxmv,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Cbmc => "cbmc",
            BackendKind::Esbmc => "esbmc",
            BackendKind::CadpMonitor => "cadp-monitor",
            BackendKind::Cadp => "cadp",
            BackendKind::CadpComp => "cadp-comp",
            BackendKind::Nuxmv => "nuxmv",
        }
    }
}

/// How simulation inputs are made concrete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Concretization {
    /// Substitute concrete values into the emitted program text
    Src,
    /// Leave the program symbolic, steer the SAT solver with weak assumptions
    Sat,
    /// No concretization at all
    #[value(name = "none")]
    Off,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "swarmv")]
#[command(version)]
#[command(about = "Verification driver for Swarm specifications", long_about = None)]
pub struct CliOpts {
    /// Path of the Swarm file to analyze
    pub file: PathBuf,

    /// Values for parameterised specifications (key=value)
    #[arg(value_name = "VALUES")]
    pub values: Vec<String>,

    /// Backend to use in verification mode
    #[arg(long, value_enum, default_value_t = BackendKind::Cbmc)]
    pub backend: BackendKind,

    /// Property to consider, others will be ignored
    #[arg(long)]
    pub property: Option<String>,

    /// Ignore all properties
    #[arg(long)]
    pub no_properties: bool,

    /// Number of simulation traces to generate (0 = verification mode)
    #[arg(long, default_value_t = 0)]
    pub simulate: u32,

    /// Number of system evolutions (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    pub steps: u32,

    /// Enforce fair interleaving of agents
    #[arg(long)]
    pub fair: bool,

    /// Force synchronous stigmergy messages
    #[arg(long)]
    pub sync: bool,

    /// Disable the bitvector optimization in the encoder
    #[arg(long)]
    pub no_bv: bool,

    /// Type of concretization (only for simulation)
    #[arg(long, value_enum, default_value_t = Concretization::Src)]
    pub concretization: Concretization,

    /// Number of CPU cores for parallel analysis
    #[arg(long, default_value_t = 1)]
    pub cores: u32,

    /// Parallel analysis: partition start
    #[arg(long = "from")]
    pub cores_from: Option<u32>,

    /// Parallel analysis: partition end
    #[arg(long = "to")]
    pub cores_to: Option<u32>,

    /// Time limit in seconds (0 = no timeout)
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Translate a stored counterexample and exit
    #[arg(long, value_name = "PATH")]
    pub translate_cex: Option<PathBuf>,

    /// Add custom code to the generated program (repeatable)
    #[arg(long, value_name = "PATH")]
    pub include: Vec<PathBuf>,

    /// Seed for the random number generator (defaults to system time)
    #[arg(long)]
    pub rnd_seed: Option<u64>,

    /// Enable additional checks in the backend
    #[arg(long)]
    pub debug: bool,

    /// Do not remove intermediate files
    #[arg(long)]
    pub keep_files: bool,

    /// Print the emitted program and exit
    #[arg(long)]
    pub show: bool,

    /// Emit traces as JSON lines instead of the readable rendering
    #[arg(long)]
    pub json: bool,

    /// Print additional messages from the backend
    #[arg(long, short)]
    pub verbose: bool,
}

impl CliOpts {
    /// Bitvector optimization is on unless explicitly disabled.
    pub fn bv(&self) -> bool {
        !self.no_bv
    }

    /// The resolved random seed for this run.
    pub fn seed(&self) -> u64 {
        match self.rnd_seed {
            Some(s) => s,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64 & 0xffff_ffff)
                .unwrap_or(0),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CliOpts::parse_from(["swarmv", "spec.swarm"]);
        assert_eq!(opts.backend, BackendKind::Cbmc);
        assert_eq!(opts.concretization, Concretization::Src);
        assert_eq!(opts.simulate, 0);
        assert!(opts.bv());
        assert!(!opts.fair);
    }

    #[test]
    fn test_values_and_flags() {
        let opts = CliOpts::parse_from([
            "swarmv",
            "spec.swarm",
            "n=3",
            "k=7",
            "--backend",
            "cadp-comp",
            "--steps",
            "12",
            "--fair",
            "--no-bv",
            "--concretization",
            "none",
            "--rnd-seed",
            "99",
        ]);
        assert_eq!(opts.values, vec!["n=3", "k=7"]);
        assert_eq!(opts.backend, BackendKind::CadpComp);
        assert_eq!(opts.steps, 12);
        assert!(opts.fair);
        assert!(!opts.bv());
        assert_eq!(opts.concretization, Concretization::Off);
        assert_eq!(opts.seed(), 99);
    }

    #[test]
    fn test_seed_without_option_is_stable_nonpanicking() {
        let opts = CliOpts::parse_from(["swarmv", "spec.swarm"]);
        let _ = opts.seed();
    }
}
