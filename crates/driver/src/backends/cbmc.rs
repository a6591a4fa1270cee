//! CBMC adapter
//!
//! Verification inlines the property into the emitted C; simulation runs
//! one concretization per trace, either at the source level (program text
//! substitution) or at the SAT level (weak assumptions steering an
//! external solver under a wrapper script).

use std::fs;
use std::io::Write;

use tracing::debug;
use z3::{Config, Context};

use swarm_spec::Info;

use crate::cex::{cprover::translate_cprover, trace_digest, Event};
use crate::cli::{CliOpts, Concretization};
use crate::concretizer::{
    apply_sat_concretization, apply_source_concretization, Concretizer,
};
use crate::dimacs::{minisat_script, weak_assumptions, DimacsMapping};
use crate::encoder::Encoding;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::{find_in_path, log_call, run_captured};
use crate::property::cprop::{inline_bmc_fragments, BmcDialect};
use crate::template::Template;

use super::{emit_trace, make_executable, print_framed_trace, Backend, BackendContext};

pub struct Cbmc {
    ctx: BackendContext,
    version: Option<(u32, u32)>,
}

impl Cbmc {
    pub fn new(opts: CliOpts) -> Cbmc {
        Cbmc {
            ctx: BackendContext::new(opts),
            version: None,
        }
    }

    fn executable(&self) -> String {
        std::env::var("SWARM_CBMC").unwrap_or_else(|_| "cbmc".to_string())
    }

    fn version(&mut self) -> DriverResult<(u32, u32)> {
        if let Some(v) = self.version {
            return Ok(v);
        }
        let out = run_captured(
            &[self.executable(), "--version".to_string()],
            &self.ctx.cwd,
        )?;
        let first = out.stdout.split_whitespace().next().unwrap_or("");
        let mut nums = first.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        let v = (nums.next().unwrap_or(0), nums.next().unwrap_or(0));
        self.version = Some(v);
        Ok(v)
    }

    fn is_newer_than_5_4(&mut self) -> DriverResult<bool> {
        let (major, minor) = self.version()?;
        Ok(major > 5 || (major == 5 && minor > 4))
    }

    /// Dump the DIMACS form of the program and parse its comment map.
    fn dimacs_mapping(&mut self, fname: &str, info: &Info) -> DriverResult<DimacsMapping> {
        let outfile = tempfile::NamedTempFile::new()
            .map_err(|e| DriverError::backend(format!("Cannot create DIMACS file: {}", e)))?;
        let mut cmd = self.cmdline(fname, info)?;
        cmd.push("--dimacs".to_string());
        cmd.push("--outfile".to_string());
        cmd.push(outfile.path().to_string_lossy().into_owned());
        log_call(&cmd);
        let _ = run_captured(&cmd, &self.ctx.cwd)?;
        let text = fs::read_to_string(outfile.path())
            .map_err(|e| DriverError::backend(format!("Cannot read DIMACS dump: {}", e)))?;
        let mapping = DimacsMapping::parse(&text);
        self.ctx
            .verbose_output(&format!("DIMACS header: {}", mapping.header), "DIMACS");
        Ok(mapping)
    }

    fn write_sat_wrapper(&mut self, weaks: &[(crate::dimacs::CnfLit, u8)]) -> DriverResult<String> {
        let minisat = std::env::var("SWARM_MINISAT")
            .ok()
            .or_else(|| find_in_path("minisat").map(|p| p.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "minisat".to_string());
        let script = minisat_script(&minisat, weaks);
        let (mut file, path) = tempfile::Builder::new()
            .prefix("swarmv-sat-")
            .suffix(".sh")
            .tempfile_in(&self.ctx.cwd)
            .map_err(|e| DriverError::backend(format!("Cannot create wrapper script: {}", e)))?
            .keep()
            .map_err(|e| DriverError::backend(format!("Cannot keep wrapper script: {}", e)))?;
        file.write_all(script.as_bytes())
            .map_err(|e| DriverError::backend(format!("Cannot write wrapper script: {}", e)))?;
        drop(file);
        make_executable(&path)?;
        self.ctx.register_temp(&path);
        Ok(path.to_string_lossy().into_owned())
    }
}

impl Backend for Cbmc {
    fn name(&self) -> &'static str {
        "cbmc"
    }

    fn modalities(&self) -> &'static [&'static str] {
        &["always", "finally", "eventually", "between"]
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

    fn check_cli_extra(&self) -> DriverResult<()> {
        if self.ctx.opts.steps == 0 && !self.ctx.opts.show {
            return Err(DriverError::invalid_args(
                "Backend 'cbmc' requires --steps N (with N>0).",
            ));
        }
        Ok(())
    }

    fn preprocess(&mut self, code: String, _fname: &str, info: &Info) -> DriverResult<String> {
        if self.ctx.opts.simulate > 0 {
            return Ok(code);
        }
        inline_bmc_fragments(
            code,
            info,
            self.ctx.opts.property.as_deref(),
            BmcDialect::Cprover,
        )
    }

    fn cmdline(&mut self, fname: &str, _info: &Info) -> DriverResult<Vec<String>> {
        let mut cmd = vec![self.executable()];
        if self.is_newer_than_5_4()? {
            cmd.push("--trace".to_string());
            cmd.push("--stop-on-fail".to_string());
        }
        if self.ctx.opts.debug {
            cmd.push("--bounds-check".to_string());
            cmd.push("--signed-overflow-check".to_string());
        }
        cmd.push(fname.to_string());
        Ok(cmd)
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_cprover(output, info).map_err(DriverError::backend)
    }

    fn handle_error(
        &mut self,
        code: i32,
        output: &str,
        fname: &str,
        info: &Info,
    ) -> DriverResult<ExitStatus> {
        match code {
            10 => {
                let events = self.translate_cex(output, info)?;
                print!("{}", emit_trace(&events, info, self.ctx.opts.json));
                Ok(ExitStatus::Failed)
            }
            6 => {
                tracing::error!("Backend failed with parsing error.");
                Ok(ExitStatus::BackendError)
            }
            124 => Ok(ExitStatus::Timeout),
            _ => Ok(ExitStatus::BackendError),
        }
    }

    fn simulate(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        let opts = self.ctx.opts.clone();
        let steps = opts.steps as usize;
        let pristine = fs::read_to_string(fname)
            .map_err(|e| DriverError::backend(format!("Cannot read {}: {}", fname, e)))?;
        let template0 = Template::new(pristine);

        let cfg = Config::new();
        let zctx = Context::new(&cfg);
        let mut concretizer = Concretizer::new(&zctx, info, steps, opts.fair, opts.seed())?;
        concretizer.add_picks_from(&template0)?;

        for i in 1..=opts.simulate {
            let mut cmd = self.cmdline(fname, info)?;
            match opts.concretization {
                Concretization::Src => {
                    let model = concretizer.concretize()?;
                    let mut t = template0.clone();
                    apply_source_concretization(&mut t, &model, steps)?;
                    fs::write(fname, t.text()).map_err(|e| {
                        DriverError::backend(format!("Cannot write {}: {}", fname, e))
                    })?;
                }
                Concretization::Sat => {
                    let mut t = template0.clone();
                    for pick in t.scan_picks() {
                        t.rewrite_pick_usages(&pick.name);
                    }
                    apply_sat_concretization(&mut t, info, steps, opts.fair)?;
                    fs::write(fname, t.text()).map_err(|e| {
                        DriverError::backend(format!("Cannot write {}: {}", fname, e))
                    })?;
                    let model = concretizer.concretize()?;
                    let mut mapping = self.dimacs_mapping(fname, info)?;
                    let weaks =
                        weak_assumptions(&model, &mut mapping, info, steps, opts.fair);
                    let script = self.write_sat_wrapper(&weaks)?;
                    cmd.push("--external-sat-solver".to_string());
                    cmd.push(script);
                }
                Concretization::Off => {}
            }

            let cmd = self.ctx.wrap_timeout(cmd)?;
            log_call(&cmd);
            let out = run_captured(&cmd, &self.ctx.cwd)?;
            self.ctx.verbose_output(&out.stderr, "Backend stderr");
            self.ctx.verbose_output(&out.stdout, "Backend output");

            match self.translate_cex(&out.merged(), info) {
                Ok(events) => {
                    let rendered = emit_trace(&events, info, opts.json);
                    print_framed_trace(i, &rendered);
                    debug!("Digest of trace #{}: {}", i, trace_digest(&rendered));
                }
                Err(e) => {
                    eprintln!("Counterexample translation failed: {}", e);
                }
            }
        }
        Ok(ExitStatus::Success)
    }
}
