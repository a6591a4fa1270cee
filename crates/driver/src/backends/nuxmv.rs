//! nuXmv adapter
//!
//! Drives nuXmv through a generated interactive script; simulations use
//! the MSAT engine and report a digest per trace for distinctness.

use std::io::Write;

use tracing::debug;

use swarm_spec::Info;

use crate::cex::{nuxmv::translate_nuxmv, trace_digest, Event};
use crate::cli::CliOpts;
use crate::encoder::Encoding;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::{log_call, run_captured};

use super::{emit_trace, print_framed_trace, Backend, BackendContext};

pub struct NuXmv {
    ctx: BackendContext,
}

impl NuXmv {
    pub fn new(opts: CliOpts) -> NuXmv {
        NuXmv {
            ctx: BackendContext::new(opts),
        }
    }

    fn write_script(&mut self) -> DriverResult<String> {
        let script = if self.ctx.opts.simulate > 0 {
            format!(
                "go_msat\nmsat_pick_state\nmsat_simulate -k {}\nshow_traces\nquit\n",
                self.ctx.opts.steps * 2
            )
        } else {
            String::new()
        };
        let (mut file, path) = tempfile::Builder::new()
            .prefix("swarmv-nuxmv-")
            .suffix(".cmd")
            .tempfile_in(&self.ctx.cwd)
            .map_err(|e| DriverError::backend(format!("Cannot create script: {}", e)))?
            .keep()
            .map_err(|e| DriverError::backend(format!("Cannot keep script: {}", e)))?;
        file.write_all(script.as_bytes())
            .map_err(|e| DriverError::backend(format!("Cannot write script: {}", e)))?;
        drop(file);
        self.ctx.register_temp(&path);
        Ok(path.to_string_lossy().into_owned())
    }
}

impl Backend for NuXmv {
    fn name(&self) -> &'static str {
        "nuxmv"
    }

    fn modalities(&self) -> &'static [&'static str] {
        &["always", "finally", "eventually", "between"]
    }

    fn encoding(&self) -> Encoding {
        Encoding::Nuxmv
    }

    fn ctx(&self) -> &BackendContext {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut BackendContext {
        &mut self.ctx
    }

    fn cmdline(&mut self, fname: &str, _info: &Info) -> DriverResult<Vec<String>> {
        let script = self.write_script()?;
        Ok(vec![
            "nuxmv".to_string(),
            "-source".to_string(),
            script,
            fname.to_string(),
        ])
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_nuxmv(output, info).map_err(DriverError::backend)
    }

    fn handle_success(&mut self, output: &str, info: &Info) -> DriverResult<ExitStatus> {
        if let Ok(events) = self.translate_cex(output, info) {
            print!("{}", emit_trace(&events, info, self.ctx.opts.json));
        }
        Ok(ExitStatus::Success)
    }

    fn simulate(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        for i in 1..=self.ctx.opts.simulate {
            let cmd = self.cmdline(fname, info)?;
            let cmd = self.ctx.wrap_timeout(cmd)?;
            log_call(&cmd);
            let out = run_captured(&cmd, &self.ctx.cwd)?;
            self.ctx.verbose_output(&out.stderr, "Backend stderr");
            self.ctx.verbose_output(&out.stdout, "Backend output");
            if !out.success() {
                return Ok(ExitStatus::BackendError);
            }
            let events = self.translate_cex(&out.stdout, info)?;
            let rendered = emit_trace(&events, info, self.ctx.opts.json);
            print_framed_trace(i, &rendered);
            debug!("Digest of trace #{}: {}", i, trace_digest(&rendered));
        }
        Ok(ExitStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_simulation_script_contents() {
        let mut b = NuXmv::new(CliOpts::parse_from([
            "swarmv", "f.swarm", "--simulate", "1", "--steps", "6",
        ]));
        let path = b.write_script().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("go_msat"));
        assert!(text.contains("msat_simulate -k 12"));
        assert!(text.contains("show_traces"));
        b.ctx.cleanup();
        assert!(!std::path::Path::new(&path).exists());
    }

    #[test]
    fn test_verification_script_is_empty() {
        let mut b = NuXmv::new(CliOpts::parse_from(["swarmv", "f.swarm"]));
        let path = b.write_script().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.is_empty());
        b.ctx.cleanup();
    }
}
