//! External encoder contract
//!
//! The encoder (`swarm-encode`) turns a Swarm file into one of the target
//! encodings, leaving named holes for the concretizer, and on a separate
//! invocation emits the info bundle this driver parses into `Info`.

use std::fs;
use std::path::PathBuf;

use tracing::info as log_info;

use swarm_spec::Info;

use crate::cli::CliOpts;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::{find_in_path, log_call, run_captured};
use crate::template::{Template, MARKER_INCLUDES};

/// Target encodings the encoder can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    C,
    Lnt,
    LntMonitor,
    LntParallel,
    Nuxmv,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::C => "c",
            Encoding::Lnt | Encoding::LntMonitor | Encoding::LntParallel => "lnt",
            Encoding::Nuxmv => "smv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::C => "c",
            Encoding::Lnt => "lnt",
            Encoding::LntMonitor => "lnt-monitor",
            Encoding::LntParallel => "lnt-parallel",
            Encoding::Nuxmv => "nuxmv",
        }
    }
}

fn find_encoder() -> DriverResult<PathBuf> {
    if let Some(path) = std::env::var_os("SWARM_ENCODER") {
        return Ok(PathBuf::from(path));
    }
    find_in_path("swarm-encode").ok_or_else(|| {
        DriverError::new(
            ExitStatus::NotFound,
            "Cannot find the swarm-encode executable (set SWARM_ENCODER).",
        )
    })
}

/// The encoder command line for the given target encoding.
pub fn encoder_cmdline(opts: &CliOpts, encoding: Encoding) -> DriverResult<Vec<String>> {
    let exe = find_encoder()?;
    let mut cmd = vec![
        exe.to_string_lossy().into_owned(),
        "--file".to_string(),
        opts.file.to_string_lossy().into_owned(),
        "--bound".to_string(),
        opts.steps.to_string(),
        "--enc".to_string(),
        encoding.name().to_string(),
    ];
    if opts.fair {
        cmd.push("--fair".to_string());
    }
    if opts.simulate > 0 {
        cmd.push("--simulation".to_string());
    }
    if !opts.bv() {
        cmd.push("--no-bitvector".to_string());
    }
    if opts.sync {
        cmd.push("--sync".to_string());
    }
    if let Some(p) = &opts.property {
        cmd.push("--property".to_string());
        cmd.push(p.clone());
    }
    if opts.no_properties {
        cmd.push("--no-properties".to_string());
    }
    if !opts.values.is_empty() {
        cmd.push("--values".to_string());
        cmd.extend(opts.values.iter().cloned());
    }
    Ok(cmd)
}

fn encoder_failure(stderr: &str) -> DriverError {
    let status = if stderr.starts_with("Property") {
        ExitStatus::InvalidArgs
    } else {
        ExitStatus::ParsingError
    };
    DriverError::new(status, stderr.to_string())
}

/// Invoke the encoder and return the emitted program text with any
/// `--include` fragments spliced in.
pub fn generate_code(opts: &CliOpts, encoding: Encoding) -> DriverResult<String> {
    let cmd = encoder_cmdline(opts, encoding)?;
    log_call(&cmd);
    let out = run_captured(&cmd, std::path::Path::new("."))?;
    if !out.success() {
        return Err(encoder_failure(&out.stderr));
    }
    let mut template = Template::new(out.stdout);
    if !opts.include.is_empty() {
        let mut included = format!("{}\n\n", MARKER_INCLUDES);
        for path in &opts.include {
            let text = fs::read_to_string(path).map_err(|e| {
                DriverError::invalid_args(format!(
                    "Cannot read include '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            included.push_str(&text);
        }
        template.replace_marker(MARKER_INCLUDES, &included);
    }
    Ok(template.into_text())
}

/// Invoke the encoder's info mode and parse the bundle.
pub fn get_info(opts: &CliOpts) -> DriverResult<Info> {
    log_info!("Gathering information on {}...", opts.file.display());
    let mut cmd = encoder_cmdline(opts, Encoding::C)?;
    cmd.push("--info".to_string());
    log_call(&cmd);
    let out = run_captured(&cmd, std::path::Path::new("."))?;
    if !out.success() {
        return Err(encoder_failure(&out.stderr));
    }
    Info::parse(&out.stdout, &opts.values)
        .map_err(|e| DriverError::parsing(format!("Malformed info bundle: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cmdline_flags() {
        std::env::set_var("SWARM_ENCODER", "/opt/swarm/swarm-encode");
        let opts = CliOpts::parse_from([
            "swarmv", "f.swarm", "n=3", "--steps", "10", "--fair", "--simulate", "2", "--no-bv",
        ]);
        let cmd = encoder_cmdline(&opts, Encoding::C).unwrap();
        assert_eq!(cmd[0], "/opt/swarm/swarm-encode");
        assert!(cmd.contains(&"--fair".to_string()));
        assert!(cmd.contains(&"--simulation".to_string()));
        assert!(cmd.contains(&"--no-bitvector".to_string()));
        assert!(cmd.contains(&"--values".to_string()));
        assert!(cmd.contains(&"n=3".to_string()));
        let bound_pos = cmd.iter().position(|a| a == "--bound").unwrap();
        assert_eq!(cmd[bound_pos + 1], "10");
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::LntParallel.name(), "lnt-parallel");
        assert_eq!(Encoding::LntParallel.extension(), "lnt");
        assert_eq!(Encoding::Nuxmv.extension(), "smv");
    }

    #[test]
    fn test_encoder_failure_mapping() {
        assert_eq!(
            encoder_failure("Property p undefined").status,
            ExitStatus::InvalidArgs
        );
        assert_eq!(
            encoder_failure("syntax error at line 3").status,
            ExitStatus::ParsingError
        );
    }
}
