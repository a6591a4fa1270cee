//! Backend adapters
//!
//! Each adapter drives one external analysis tool through the common
//! state machine: build the command line, optionally wrap it in the
//! system timeout, invoke, then dispatch on the exit code. Adapters own
//! their scratch files and release them on cleanup unless the user asked
//! to keep them.

pub mod cadp;
pub mod cbmc;
pub mod esbmc;
pub mod nuxmv;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info as log_info};

use swarm_spec::Info;

use crate::cex::{render_events, render_json, Event};
use crate::cli::{BackendKind, CliOpts};
use crate::encoder::Encoding;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::{log_call, run_captured, timeout_cmd, CmdOutput};

/// Shared state of every adapter: options, working directory, and the
/// scratch-file ledger.
pub struct BackendContext {
    pub opts: CliOpts,
    pub cwd: PathBuf,
    pub temp_files: Vec<PathBuf>,
}

impl BackendContext {
    pub fn new(opts: CliOpts) -> BackendContext {
        BackendContext {
            opts,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            temp_files: Vec::new(),
        }
    }

    pub fn register_temp(&mut self, path: impl Into<PathBuf>) {
        self.temp_files.push(path.into());
    }

    /// Remove (or, with `--keep-files`, report) every scratch file.
    pub fn cleanup(&mut self) {
        if self.opts.keep_files {
            for f in &self.temp_files {
                log_info!("Keeping {}", f.display());
            }
            return;
        }
        for f in self.temp_files.drain(..) {
            debug!("Removing {}...", f.display());
            let _ = fs::remove_file(f);
        }
    }

    /// Name of the emitted file: source stem, bound, fairness, options.
    pub fn make_slug(&self, extension: &str) -> String {
        let stem = self
            .opts
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_string());
        let stem: String = stem
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let mut parts = vec![
            stem,
            self.opts.steps.to_string(),
            if self.opts.fair { "fair" } else { "unfair" }.to_string(),
        ];
        if self.opts.sync {
            parts.push("sync".to_string());
        }
        if !self.opts.values.is_empty() {
            parts.push(
                self.opts
                    .values
                    .iter()
                    .map(|v| v.replace('=', ""))
                    .collect::<Vec<_>>()
                    .join(""),
            );
        }
        format!("{}.{}", parts.join("_"), extension)
    }

    /// Prepend the timeout wrapper when a limit is configured.
    pub fn wrap_timeout(&self, cmd: Vec<String>) -> DriverResult<Vec<String>> {
        if self.opts.timeout == 0 {
            return Ok(cmd);
        }
        let mut wrapped = vec![timeout_cmd()?, self.opts.timeout.to_string()];
        wrapped.extend(cmd);
        Ok(wrapped)
    }

    pub fn verbose_output(&self, output: &str, label: &str) {
        if !output.is_empty() {
            debug!("------{}------\n{}\n---------------------", label, output);
        }
    }
}

/// One analysis backend.
pub trait Backend {
    fn name(&self) -> &'static str;
    /// Temporal modalities this backend can check.
    fn modalities(&self) -> &'static [&'static str];
    /// Target encoding requested from the encoder.
    fn encoding(&self) -> Encoding;

    fn ctx(&self) -> &BackendContext;
    fn ctx_mut(&mut self) -> &mut BackendContext;

    /// Command line for verifying `fname`.
    fn cmdline(&mut self, fname: &str, info: &Info) -> DriverResult<Vec<String>>;

    /// Parse a backend trace into neutral events.
    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>>;

    /// Option validation beyond the common rules.
    fn check_cli_extra(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Adapt the emitted program before it is written out.
    fn preprocess(&mut self, code: String, _fname: &str, _info: &Info) -> DriverResult<String> {
        Ok(code)
    }

    fn check_cli(&self) -> DriverResult<()> {
        let opts = &self.ctx().opts;
        if opts.simulate == 0 && opts.no_properties {
            return Err(DriverError::done("No property to verify!"));
        }
        if opts.simulate > 0 && opts.steps == 0 {
            return Err(DriverError::invalid_args(
                "--simulate requires --steps N (with N>0).",
            ));
        }
        self.check_cli_extra()
    }

    fn check_info(&self, info: &Info) -> DriverResult<()> {
        if self.ctx().opts.simulate > 0 {
            return Ok(());
        }
        if self.ctx().opts.no_properties || info.properties.is_empty() {
            return Err(DriverError::done("No property to verify!"));
        }
        for p in &info.properties {
            let modality = p.split_whitespace().next().unwrap_or("");
            if !self.modalities().contains(&modality) {
                return Err(DriverError::backend(format!(
                    "Backend '{}' does not support \"{}\" modality.",
                    self.name(),
                    modality
                )));
            }
        }
        Ok(())
    }

    fn handle_success(&mut self, _output: &str, _info: &Info) -> DriverResult<ExitStatus> {
        Ok(ExitStatus::Success)
    }

    fn handle_error(
        &mut self,
        code: i32,
        _output: &str,
        _fname: &str,
        _info: &Info,
    ) -> DriverResult<ExitStatus> {
        if code == 124 {
            Ok(ExitStatus::Timeout)
        } else {
            Ok(ExitStatus::BackendError)
        }
    }

    fn verify(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        let cmd = self.cmdline(fname, info)?;
        let cmd = self.ctx().wrap_timeout(cmd)?;
        log_call(&cmd);
        let out = run_captured(&cmd, &self.ctx().cwd)?;
        self.dispatch(&out, fname, info)
    }

    /// Exit-code dispatch shared by verify and the simulation loops.
    fn dispatch(&mut self, out: &CmdOutput, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        self.ctx().verbose_output(&out.merged(), "Backend output");
        match out.code {
            Some(0) => self.handle_success(&out.merged(), info),
            Some(code) => self.handle_error(code, &out.merged(), fname, info),
            None => Ok(ExitStatus::Killed),
        }
    }

    fn simulate(&mut self, _fname: &str, _info: &Info) -> DriverResult<ExitStatus> {
        tracing::error!("Backend '{}' does not support simulation.", self.name());
        Ok(ExitStatus::BackendError)
    }

    fn cleanup(&mut self, _fname: &str) {
        self.ctx_mut().cleanup();
    }
}

/// Render (or serialize) a trace for the user.
pub fn emit_trace(events: &[Event], info: &Info, json: bool) -> String {
    if json {
        render_json(events)
    } else {
        render_events(events, info)
    }
}

/// Print one simulation trace inside its `====== Trace #k ======` frame.
pub fn print_framed_trace(index: u32, rendered: &str) {
    let header = format!("====== Trace #{} ======", index);
    println!("{}", header);
    print!("{}", rendered);
    println!("{}", "=".repeat(header.len()));
}

/// Instantiate the adapter for the requested backend.
pub fn create_backend(kind: BackendKind, opts: CliOpts) -> Box<dyn Backend> {
    match kind {
        BackendKind::Cbmc => Box::new(cbmc::Cbmc::new(opts)),
        BackendKind::Esbmc => Box::new(esbmc::Esbmc::new(opts)),
        BackendKind::CadpMonitor => Box::new(cadp::CadpMonitor::new(opts)),
        BackendKind::Cadp => Box::new(cadp::Cadp::new(opts)),
        BackendKind::CadpComp => Box::new(cadp::CadpComp::new(opts)),
        BackendKind::Nuxmv => Box::new(nuxmv::NuXmv::new(opts)),
    }
}

/// Write the emitted program to its scratch file (or stdout with
/// `--show`).
pub fn write_program(
    ctx: &mut BackendContext,
    code: &str,
    extension: &str,
) -> DriverResult<PathBuf> {
    let fname = ctx.cwd.join(ctx.make_slug(extension));
    debug!("Writing emulation program to {}...", fname.display());
    fs::write(&fname, code).map_err(|e| {
        DriverError::backend(format!("Cannot write {}: {}", fname.display(), e))
    })?;
    ctx.register_temp(&fname);
    Ok(fname)
}

/// Make a scratch file executable (solver wrapper scripts).
#[cfg(unix)]
pub fn make_executable(path: &Path) -> DriverResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .map_err(|e| DriverError::backend(format!("stat {}: {}", path.display(), e)))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
        .map_err(|e| DriverError::backend(format!("chmod {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> DriverResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn ctx_with(args: &[&str]) -> BackendContext {
        let mut full = vec!["swarmv"];
        full.extend(args);
        BackendContext::new(CliOpts::parse_from(full))
    }

    #[test]
    fn test_make_slug() {
        let ctx = ctx_with(&["flock.swarm", "n=3", "--steps", "12", "--fair", "--sync"]);
        assert_eq!(ctx.make_slug("c"), "flock_12_fair_sync_n3.c");
        let plain = ctx_with(&["flock.swarm"]);
        assert_eq!(plain.make_slug("lnt"), "flock_0_unfair.lnt");
    }

    #[test]
    fn test_check_cli_rules() {
        struct Dummy {
            ctx: BackendContext,
        }
        impl Backend for Dummy {
            fn name(&self) -> &'static str {
                "dummy"
            }
            fn modalities(&self) -> &'static [&'static str] {
                &["always"]
            }
            fn encoding(&self) -> Encoding {
                Encoding::C
            }
            fn ctx(&self) -> &BackendContext {
                &self.ctx
            }
            fn ctx_mut(&mut self) -> &mut BackendContext {
                &mut self.ctx
            }
            fn cmdline(&mut self, _: &str, _: &Info) -> DriverResult<Vec<String>> {
                Ok(vec![])
            }
            fn translate_cex(&self, _: &str, _: &Info) -> DriverResult<Vec<Event>> {
                Ok(vec![])
            }
        }

        let sim_no_steps = Dummy {
            ctx: ctx_with(&["f.swarm", "--simulate", "1"]),
        };
        assert_eq!(
            sim_no_steps.check_cli().unwrap_err().status,
            ExitStatus::InvalidArgs
        );

        let no_props = Dummy {
            ctx: ctx_with(&["f.swarm", "--no-properties"]),
        };
        assert_eq!(
            no_props.check_cli().unwrap_err().status,
            ExitStatus::Success
        );

        let info = Info::parse(
            "agent A 0,1\niface 0=x=0\nproperty fairly forall A a, x of a = 0\n",
            &[],
        )
        .unwrap();
        let checker = Dummy {
            ctx: ctx_with(&["f.swarm"]),
        };
        assert_eq!(
            checker.check_info(&info).unwrap_err().status,
            ExitStatus::BackendError
        );
    }

    #[test]
    fn test_wrap_timeout_disabled() {
        let ctx = ctx_with(&["f.swarm"]);
        let cmd = vec!["tool".to_string()];
        assert_eq!(ctx.wrap_timeout(cmd.clone()).unwrap(), cmd);
    }
}
