//! ESBMC adapter
//!
//! Shares the CPROVER trace dialect with CBMC but needs its own
//! intrinsic spellings and force-disables the bitvector encoding.

use swarm_spec::Info;

use crate::cex::{cprover::translate_cprover, Event};
use crate::cli::CliOpts;
use crate::encoder::Encoding;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::find_in_path;
use crate::property::cprop::{inline_bmc_fragments, BmcDialect};

use super::{emit_trace, Backend, BackendContext};

pub struct Esbmc {
    ctx: BackendContext,
}

impl Esbmc {
    pub fn new(mut opts: CliOpts) -> Esbmc {
        // CPROVER bitvectors are not supported here
        opts.no_bv = true;
        Esbmc {
            ctx: BackendContext::new(opts),
        }
    }

    fn executable(&self) -> DriverResult<String> {
        if let Ok(path) = std::env::var("SWARM_ESBMC") {
            return Ok(path);
        }
        find_in_path("esbmc")
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| DriverError::backend("esbmc not found"))
    }
}

impl Backend for Esbmc {
    fn name(&self) -> &'static str {
        "esbmc"
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

    fn cmdline(&mut self, fname: &str, _info: &Info) -> DriverResult<Vec<String>> {
        let mut cmd = vec![
            self.executable()?,
            fname.to_string(),
            "--no-align-check".to_string(),
            "--no-pointer-check".to_string(),
            "--no-unwinding-assertions".to_string(),
            "--bv".to_string(),
        ];
        if self.ctx.opts.steps == 0 {
            cmd.push("--k-induction".to_string());
            cmd.push("--interval-analysis".to_string());
        }
        if !self.ctx.opts.debug {
            cmd.push("--no-bounds-check".to_string());
            cmd.push("--no-div-by-zero-check".to_string());
        }
        Ok(cmd)
    }

    fn preprocess(&mut self, code: String, _fname: &str, info: &Info) -> DriverResult<String> {
        let code = if self.ctx.opts.simulate == 0 {
            inline_bmc_fragments(
                code,
                info,
                self.ctx.opts.property.as_deref(),
                BmcDialect::Esbmc,
            )?
        } else {
            code
        };
        Ok(code
            .replace("__CPROVER_assert", "__ESBMC_assert")
            .replace("__CPROVER_assume", "__ESBMC_assume")
            .replace("__CPROVER_nondet_int", "nondet_int")
            .replace("__CPROVER_nondet", "nondet_int"))
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_cprover(output, info).map_err(DriverError::backend)
    }

    fn handle_success(&mut self, output: &str, _info: &Info) -> DriverResult<ExitStatus> {
        if output.contains("VERIFICATION UNKNOWN") {
            return Ok(ExitStatus::Inconclusive);
        }
        Ok(ExitStatus::Success)
    }

    fn handle_error(
        &mut self,
        code: i32,
        output: &str,
        _fname: &str,
        info: &Info,
    ) -> DriverResult<ExitStatus> {
        match code {
            1 => {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn backend(args: &[&str]) -> Esbmc {
        let mut full = vec!["swarmv"];
        full.extend(args);
        Esbmc::new(CliOpts::parse_from(full))
    }

    #[test]
    fn test_forces_no_bitvectors() {
        let b = backend(&["f.swarm"]);
        assert!(!b.ctx.opts.bv());
    }

    #[test]
    fn test_preprocess_rewrites_intrinsics() {
        let mut b = backend(&["f.swarm"]);
        let info = Info::parse("agent A 0,1\niface 0=x=0\n", &[]).unwrap();
        let code = "__CPROVER_assume(x); __CPROVER_assert(y, \"p\"); x = __CPROVER_nondet_int();";
        let out = b.preprocess(code.to_string(), "out.c", &info).unwrap();
        assert_eq!(
            out,
            "__ESBMC_assume(x); __ESBMC_assert(y, \"p\"); x = nondet_int();"
        );
    }

    #[test]
    fn test_unknown_verdict_is_inconclusive() {
        let mut b = backend(&["f.swarm"]);
        let info = Info::parse("agent A 0,1\niface 0=x=0\n", &[]).unwrap();
        assert_eq!(
            b.handle_success("VERIFICATION UNKNOWN\n", &info).unwrap(),
            ExitStatus::Inconclusive
        );
        assert_eq!(
            b.handle_success("VERIFICATION SUCCESSFUL\n", &info).unwrap(),
            ExitStatus::Success
        );
    }

    #[test]
    #[serial]
    fn test_k_induction_without_steps() {
        std::env::set_var("SWARM_ESBMC", "/usr/bin/esbmc");
        let mut b = backend(&["f.swarm"]);
        let info = Info::parse("agent A 0,1\niface 0=x=0\n", &[]).unwrap();
        let cmd = b.cmdline("out.c", &info).unwrap();
        assert!(cmd.contains(&"--k-induction".to_string()));
        let mut bounded = backend(&["f.swarm", "--steps", "5"]);
        let cmd = bounded.cmdline("out.c", &info).unwrap();
        assert!(!cmd.contains(&"--k-induction".to_string()));
    }
}
