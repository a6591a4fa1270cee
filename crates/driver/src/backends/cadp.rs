//! CADP adapters
//!
//! Three workflows over the LNT encodings: `cadp-monitor` checks a
//! monitor process with a fixed evaluator query, `cadp` model-checks an
//! MCL property against a minimized BCG, and `cadp-comp` verifies the
//! parallel encoding compositionally through an SVL script, with value
//! analysis refining the replicated stores.

use std::path::{Path, PathBuf};

use tracing::debug;

use swarm_analysis::{value_analysis, Stripes, ValueAnalysis, DEFAULT_BOUND};
use swarm_spec::{parse_property, Info, Store};

use crate::cex::{lnt::translate_cadp, trace_digest, Event};
use crate::cli::CliOpts;
use crate::encoder::Encoding;
use crate::errors::{DriverError, DriverResult, ExitStatus};
use crate::exec::{log_call, run_captured};
use crate::property::mcl;

use super::{emit_trace, print_framed_trace, Backend, BackendContext};

fn check_cadp(ctx: &BackendContext) -> DriverResult<()> {
    let out = run_captured(&["cadp_lib".to_string(), "caesar".to_string()], &ctx.cwd);
    match out {
        Ok(o) if o.success() => Ok(()),
        _ => Err(DriverError::backend(
            "CADP not found or invalid license file. \
             Please visit https://cadp.inria.fr to obtain a valid license.",
        )),
    }
}

/// Extract a counterexample prefix from `evaluator.bcg`.
fn extract_trace(ctx: &BackendContext) -> String {
    let cmd = vec![
        "bcg_open".to_string(),
        "evaluator.bcg".to_string(),
        "executor".to_string(),
        "100".to_string(),
        "2".to_string(),
    ];
    log_call(&cmd);
    match run_captured(&cmd, &ctx.cwd) {
        Ok(out) if out.success() => {
            ctx.verbose_output(&out.merged(), "Trace from counterexample BCG");
            out.merged()
        }
        _ => {
            tracing::info!("Could not extract a counterexample.");
            String::new()
        }
    }
}

/// Success handling shared by the CADP family: a FALSE/FAIL verdict means
/// the property failed, and some workflows leave the diagnostic in
/// `evaluator.bcg` instead of the output itself.
fn handle_lnt_success<B: Backend + ?Sized>(
    backend: &mut B,
    out: &str,
    info: &Info,
) -> DriverResult<ExitStatus> {
    if !out.contains("\nFALSE\n") && !out.contains("\nFAIL\n") {
        return Ok(ExitStatus::Success);
    }
    if out.contains("evaluator.bcg") && !out.contains("<initial state>") {
        let cex = extract_trace(backend.ctx());
        if !cex.is_empty() {
            if let Ok(events) = backend.translate_cex(&cex, info) {
                println!("Counterexample prefix:");
                print!("{}", emit_trace(&events, info, backend.ctx().opts.json));
            }
        }
    } else if let Ok(events) = backend.translate_cex(out, info) {
        print!("{}", emit_trace(&events, info, backend.ctx().opts.json));
    }
    Ok(ExitStatus::Failed)
}

/// Random executions through the LNT executor.
fn lnt_simulate<B: Backend + ?Sized>(
    backend: &mut B,
    fname: &str,
    info: &Info,
) -> DriverResult<ExitStatus> {
    check_cadp(backend.ctx())?;
    let opts = backend.ctx().opts.clone();
    let base = vec![
        "lnt.open".to_string(),
        fname.to_string(),
        "executor".to_string(),
        opts.steps.to_string(),
        "2".to_string(),
    ];
    for i in 1..=opts.simulate {
        let cmd = backend.ctx().wrap_timeout(base.clone())?;
        log_call(&cmd);
        let out = run_captured(&cmd, &backend.ctx().cwd)?;
        backend.ctx().verbose_output(&out.merged(), "Backend output");
        if !out.success() {
            return Ok(ExitStatus::BackendError);
        }
        let events = backend.translate_cex(&out.merged(), info)?;
        let rendered = emit_trace(&events, info, opts.json);
        print_framed_trace(i, &rendered);
        debug!("Digest of trace #{}: {}", i, trace_digest(&rendered));
    }
    Ok(ExitStatus::Success)
}

fn upper_stem(fname: &str) -> String {
    Path::new(fname)
        .file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "PROGRAM".to_string())
}

fn with_extension(fname: &str, ext: &str) -> String {
    Path::new(fname)
        .with_extension(ext)
        .to_string_lossy()
        .into_owned()
}

fn monitor_query(info: &Info) -> String {
    let modality = info
        .properties
        .first()
        .and_then(|p| p.split_whitespace().next())
        .unwrap_or("always");
    let query = if modality == "finally" {
        "fairly.mcl"
    } else {
        "never.mcl"
    };
    let dir = std::env::var("SWARM_CADP_QUERIES")
        .map(PathBuf::from)
        .unwrap_or_else(|_| Path::new("backends").join("cadp"));
    dir.join(query).to_string_lossy().into_owned()
}

fn register_lnt_scratch(ctx: &mut BackendContext, fname: &str) {
    ctx.register_temp(ctx.cwd.join("evaluator.bcg"));
    for aux in ["evaluator", "executor", "evaluator@1.o"] {
        ctx.register_temp(ctx.cwd.join(aux));
    }
    for suffix in ["err", "f", "h", "h.BAK", "lotos", "o", "t"] {
        ctx.register_temp(with_extension(fname, suffix));
    }
}

// ---------------- cadp-monitor ----------------

pub struct CadpMonitor {
    ctx: BackendContext,
}

impl CadpMonitor {
    pub fn new(opts: CliOpts) -> CadpMonitor {
        CadpMonitor {
            ctx: BackendContext::new(opts),
        }
    }
}

impl Backend for CadpMonitor {
    fn name(&self) -> &'static str {
        "cadp-monitor"
    }

    fn modalities(&self) -> &'static [&'static str] {
        &["always", "eventually", "finally"]
    }

    fn encoding(&self) -> Encoding {
        Encoding::LntMonitor
    }

    fn ctx(&self) -> &BackendContext {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut BackendContext {
        &mut self.ctx
    }

    fn cmdline(&mut self, fname: &str, info: &Info) -> DriverResult<Vec<String>> {
        let mut cmd = vec![
            "lnt.open".to_string(),
            fname.to_string(),
            "evaluator".to_string(),
            "-diag".to_string(),
        ];
        if self.ctx.opts.debug {
            cmd.push("-verbose".to_string());
        }
        cmd.push(monitor_query(info));
        Ok(cmd)
    }

    fn preprocess(&mut self, code: String, fname: &str, _info: &Info) -> DriverResult<String> {
        Ok(code.replace(
            "module HEADER is",
            &format!("module {} is", upper_stem(fname)),
        ))
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_cadp(output, info).map_err(DriverError::backend)
    }

    fn handle_success(&mut self, output: &str, info: &Info) -> DriverResult<ExitStatus> {
        handle_lnt_success(self, output, info)
    }

    fn simulate(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        lnt_simulate(self, fname, info)
    }

    fn cleanup(&mut self, fname: &str) {
        register_lnt_scratch(&mut self.ctx, fname);
        self.ctx.cleanup();
    }
}

// ---------------- cadp ----------------

pub struct Cadp {
    ctx: BackendContext,
}

impl Cadp {
    pub fn new(opts: CliOpts) -> Cadp {
        Cadp {
            ctx: BackendContext::new(opts),
        }
    }
}

impl Backend for Cadp {
    fn name(&self) -> &'static str {
        "cadp"
    }

    fn modalities(&self) -> &'static [&'static str] {
        &["always", "eventually", "fairly", "fairly_inf", "finally"]
    }

    fn encoding(&self) -> Encoding {
        // Simulation falls back to the monitor encoding
        if self.ctx.opts.simulate > 0 {
            Encoding::LntMonitor
        } else {
            Encoding::Lnt
        }
    }

    fn ctx(&self) -> &BackendContext {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut BackendContext {
        &mut self.ctx
    }

    fn cmdline(&mut self, fname: &str, _info: &Info) -> DriverResult<Vec<String>> {
        let mut cmd = vec![
            "bcg_open".to_string(),
            format!("{}.min.bcg", fname),
            "evaluator4".to_string(),
            "-diag".to_string(),
        ];
        if self.ctx.opts.debug {
            cmd.push("-verbose".to_string());
        }
        cmd.push(format!("{}.mcl", fname));
        Ok(cmd)
    }

    fn preprocess(&mut self, code: String, fname: &str, _info: &Info) -> DriverResult<String> {
        Ok(code.replace(
            "module HEADER is",
            &format!("module {} is", upper_stem(fname)),
        ))
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_cadp(output, info).map_err(DriverError::backend)
    }

    fn verify(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        let mcl_text = mcl::translate_property(info, self.ctx.opts.property.as_deref())
            .map_err(DriverError::backend)?;
        let mcl_fname = format!("{}.mcl", fname);
        debug!("Writing MCL query to {}...", mcl_fname);
        std::fs::write(&mcl_fname, &mcl_text)
            .map_err(|e| DriverError::backend(format!("Cannot write {}: {}", mcl_fname, e)))?;
        self.ctx.register_temp(&mcl_fname);
        self.ctx.verbose_output(&mcl_text, "MCL property");

        let generate = vec![
            "lnt.open".to_string(),
            fname.to_string(),
            "generator".to_string(),
            format!("{}.bcg", fname),
        ];
        log_call(&generate);
        let out = run_captured(&generate, &self.ctx.cwd)?;
        self.ctx.verbose_output(&out.merged(), "BCG generation output");
        if !out.success() {
            return Ok(ExitStatus::BackendError);
        }
        // Divbranching minimization preserves the supported properties;
        // richer property languages would need a stronger reduction.
        let minimize = vec![
            "bcg_min".to_string(),
            "-divbranching".to_string(),
            format!("{}.bcg", fname),
            format!("{}.min.bcg", fname),
        ];
        log_call(&minimize);
        let out = run_captured(&minimize, &self.ctx.cwd)?;
        if !out.success() {
            return Ok(ExitStatus::BackendError);
        }
        self.ctx.register_temp(format!("{}.bcg", fname));
        self.ctx.register_temp(format!("{}.min.bcg", fname));

        let cmd = self.cmdline(fname, info)?;
        let cmd = self.ctx.wrap_timeout(cmd)?;
        log_call(&cmd);
        let out = run_captured(&cmd, &self.ctx.cwd)?;
        self.dispatch(&out, fname, info)
    }

    fn handle_success(&mut self, output: &str, info: &Info) -> DriverResult<ExitStatus> {
        let result = handle_lnt_success(self, output, info)?;
        if output.contains("\nFALSE\n") && !output.contains("evaluator.bcg") {
            println!("<property violated>");
        }
        Ok(result)
    }

    fn simulate(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        lnt_simulate(self, fname, info)
    }

    fn cleanup(&mut self, fname: &str) {
        self.ctx.register_temp(format!("{}@1.o", fname));
        self.ctx.register_temp(format!("{}.min@1.o", fname));
        register_lnt_scratch(&mut self.ctx, fname);
        self.ctx.cleanup();
    }
}

// ---------------- cadp-comp ----------------

pub struct CadpComp {
    ctx: BackendContext,
}

impl CadpComp {
    pub fn new(opts: CliOpts) -> CadpComp {
        CadpComp {
            ctx: BackendContext::new(opts),
        }
    }

    fn svl_fname(&self, fname: &str) -> String {
        let stem = Path::new(fname)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "program".to_string());
        format!("SVL_{}.svl", stem)
    }

    /// Fill the `(*GOODIFACE*)` / `(*GOODLSTIG*)` holes with the value
    /// envelopes the analysis certified.
    fn refinement(&self, info: &Info, fname: &str) -> DriverResult<(String, String)> {
        let analysis: ValueAnalysis<Stripes> =
            value_analysis(info, DEFAULT_BOUND).map_err(DriverError::backend)?;
        for (name, value) in analysis.state.iter() {
            debug!("value analysis: {} in {}", name, value);
        }
        if !analysis.fixpoint {
            return Err(DriverError::backend(format!(
                "Value analysis of {} did not succeed.",
                fname
            )));
        }

        let fmt = |store: Store, array: &str, bound: usize| -> String {
            let mut assigns: Vec<String> = Vec::new();
            for idx in 0..bound {
                let Some(var) = info.var_at(store, idx) else { continue };
                let Some(value) = analysis.state.get(&var.name) else {
                    continue;
                };
                let intervals = value.intervals();
                if intervals.len() == 1 && intervals[0].is_singleton() {
                    assigns.push(format!("{}[{}] := {}", array, idx, intervals[0].min));
                } else {
                    let constraints: Vec<String> = intervals
                        .iter()
                        .map(|i| {
                            if i.is_singleton() {
                                format!("(x == {})", i.min)
                            } else {
                                format!("(x >= {}) and (x <= {})", i.min, i.max)
                            }
                        })
                        .collect();
                    assigns.push(format!(
                        "    x := any Int where ({});\n    {}[{}] := x",
                        constraints.join(" or "),
                        array,
                        idx
                    ));
                }
            }
            if assigns.is_empty() {
                String::new()
            } else {
                format!(
                    "var x: Int in\n    \n    {}\nend var;",
                    assigns.join(";\n    ")
                )
            }
        };

        let good_i = fmt(
            Store::Iface,
            "i",
            info.max_key_iface().map(|k| k + 1).unwrap_or(0),
        );
        let good_l = fmt(
            Store::Lstig,
            "l",
            info.max_key_lstig().map(|k| k + 1).unwrap_or(0),
        );
        Ok((good_i, good_l))
    }

    /// Gates observed by the property; everything else is hidden in the
    /// composition.
    fn not_hidden(&self, info: &Info) -> Vec<&'static str> {
        let mut gates: Vec<&'static str> = Vec::new();
        let Some(text) = info.properties.first() else {
            return gates;
        };
        let Ok(parsed) = parse_property(text) else {
            return gates;
        };
        for name in parsed.formula.ref_names() {
            if let Ok(var) = info.lookup_var(name) {
                let gate = match var.store {
                    Store::Iface => Some("ATTR"),
                    Store::Lstig => Some("L"),
                    Store::Env => None,
                };
                if let Some(g) = gate {
                    if !gates.contains(&g) {
                        gates.push(g);
                    }
                }
            }
        }
        gates.sort();
        gates
    }
}

impl Backend for CadpComp {
    fn name(&self) -> &'static str {
        "cadp-comp"
    }

    fn modalities(&self) -> &'static [&'static str] {
        &["always", "eventually", "fairly", "fairly_inf", "finally"]
    }

    fn encoding(&self) -> Encoding {
        if self.ctx.opts.simulate > 0 {
            Encoding::LntMonitor
        } else {
            Encoding::LntParallel
        }
    }

    fn ctx(&self) -> &BackendContext {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut BackendContext {
        &mut self.ctx
    }

    fn cmdline(&mut self, fname: &str, _info: &Info) -> DriverResult<Vec<String>> {
        Ok(vec!["svl".to_string(), self.svl_fname(fname)])
    }

    fn preprocess(&mut self, code: String, fname: &str, info: &Info) -> DriverResult<String> {
        let code = code.replace(
            "module HEADER is",
            &format!("module {} is", upper_stem(fname)),
        );
        if self.ctx.opts.simulate > 0 {
            return Ok(code);
        }
        let (good_i, good_l) = self.refinement(info, fname)?;
        Ok(code
            .replace("(*GOODIFACE*)", &good_i)
            .replace("(*GOODLSTIG*)", &good_l))
    }

    fn translate_cex(&self, output: &str, info: &Info) -> DriverResult<Vec<Event>> {
        translate_cadp(output, info).map_err(DriverError::backend)
    }

    fn verify(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        let mcl_text = mcl::translate_property(info, self.ctx.opts.property.as_deref())
            .map_err(DriverError::backend)?;
        let mcl_fname = with_extension(fname, "mcl");
        debug!("Writing MCL query to {}...", mcl_fname);
        std::fs::write(&mcl_fname, &mcl_text)
            .map_err(|e| DriverError::backend(format!("Cannot write {}: {}", mcl_fname, e)))?;
        self.ctx.register_temp(&mcl_fname);
        self.ctx.verbose_output(&mcl_text, "MCL property");

        let script = svl_script(
            Path::new(fname)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| fname.to_string())
                .as_str(),
            &self.not_hidden(info),
            info.has_stigmergy(),
            !info.env.is_empty(),
            info.spawn.num_agents(),
            self.ctx.opts.fair,
        );
        let svl_fname = self.svl_fname(fname);
        std::fs::write(&svl_fname, &script)
            .map_err(|e| DriverError::backend(format!("Cannot write {}: {}", svl_fname, e)))?;
        self.ctx.register_temp(&svl_fname);
        let log_fname = with_extension(&svl_fname, "log");
        self.ctx.register_temp(&log_fname);
        self.ctx.register_temp(format!("{}.bcg", fname));
        self.ctx.verbose_output(&script, "SVL script");

        let cmd = self.cmdline(fname, info)?;
        let cmd = self.ctx.wrap_timeout(cmd)?;
        log_call(&cmd);
        let run = run_captured(&cmd, &self.ctx.cwd)?;
        let log_text = std::fs::read_to_string(&log_fname).unwrap_or_default();
        self.ctx.verbose_output(&log_text, "Backend output");
        match run.code {
            Some(0) => {
                let result = handle_lnt_success(self, &log_text, info)?;
                if log_text.contains("\nFALSE\n") {
                    println!("<property violated>");
                }
                Ok(result)
            }
            Some(124) => Ok(ExitStatus::Timeout),
            Some(_) => Ok(ExitStatus::BackendError),
            None => Ok(ExitStatus::Killed),
        }
    }

    fn simulate(&mut self, fname: &str, info: &Info) -> DriverResult<ExitStatus> {
        lnt_simulate(self, fname, info)
    }

    fn cleanup(&mut self, fname: &str) {
        let svl_fname = self.svl_fname(fname);
        if !self.ctx.opts.keep_files {
            for flag in ["-sweep", "-clean"] {
                let cmd = vec!["svl".to_string(), flag.to_string(), svl_fname.clone()];
                log_call(&cmd);
                let _ = run_captured(&cmd, &self.ctx.cwd);
            }
        } else {
            debug!("Keeping SVL intermediate files. To remove them, use:");
            debug!("    svl -sweep {}", svl_fname);
            debug!("    svl -clean {}", svl_fname);
        }
        self.ctx.register_temp(format!("{}@1.o", fname));
        self.ctx
            .register_temp(self.ctx.cwd.join("svl001_composition_1.err#0"));
        register_lnt_scratch(&mut self.ctx, fname);
        self.ctx.cleanup();
    }
}

// ---------------- SVL generation ----------------

fn exp_agent(has_stigmergy: bool, has_env: bool, not_hidden: &[&str], id: usize) -> String {
    let hide: Vec<&str> = ["ATTR", "L"]
        .into_iter()
        .filter(|g| !not_hidden.contains(g))
        .collect();
    let hide_open = if hide.is_empty() {
        "\n".to_string()
    } else {
        format!("hide {} in\n", hide.join(", "))
    };
    let hide_close = if hide.is_empty() { "" } else { "end hide" };
    let mut gates = String::from("spurious, tick, attr");
    if has_stigmergy {
        gates.push_str(", put, qry, l, refresh, request");
    }
    if has_env {
        gates.push_str(", getenv, setenv");
    }
    format!(
        "\n    {}agent [{}] (ID ({}))\n    {}\n    ",
        hide_open, gates, id, hide_close
    )
}

fn exp_main(
    has_stigmergy: bool,
    has_env: bool,
    num_agents: usize,
    not_hidden: &[&str],
    fair: bool,
) -> String {
    let gates: Vec<&str> = [
        if fair { "tick" } else { "" },
        if has_stigmergy { "refresh, request" } else { "" },
        if has_env { "getenv, setenv" } else { "" },
    ]
    .into_iter()
    .filter(|g| !g.is_empty())
    .collect();
    let gates = gates.join(", ");

    let processes: Vec<&str> = [
        if fair { "tick -> sched [tick]" } else { "" },
        if has_stigmergy {
            "refresh, request -> Timestamps [refresh, request, debug]"
        } else {
            ""
        },
        if has_env {
            "getenv, setenv -> Env [getenv, setenv]"
        } else {
            ""
        },
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect();
    let processes = processes.join("\n||\n");

    let agents: Vec<String> = (0..num_agents)
        .map(|i| exp_agent(has_stigmergy, has_env, not_hidden, i))
        .collect();
    let agents = agents.join("\n  ||\n");

    let prio = |gate: &str| -> String {
        (0..num_agents)
            .map(|i| format!("\"{} !{} .*\"", gate, i))
            .collect::<Vec<_>>()
            .join(" > ")
    };
    let prios = if has_stigmergy {
        format!(
            "\n    total prio\n        \"ATTR .*\" > \"REFRESH .*\" > \"L .*\" > \"REQUEST .*\"\n        {}\n        {}\n        {}\n        {}\n    in",
            prio("ATTR"),
            prio("REFRESH"),
            prio("L"),
            prio("REQUEST")
        )
    } else {
        String::new()
    };

    format!(
        "\n{par}\n{procs}\n{bar}\n{gates}{arrow}\n    ({prios}\n    par tick{sync_gates} in\n    {agents}\n    end par\n    {prio_close}\n{par_close}\n",
        par = if processes.is_empty() { "" } else { "par" },
        procs = processes,
        bar = if processes.is_empty() { "" } else { "||" },
        gates = gates,
        arrow = if gates.is_empty() { "" } else { " -> " },
        prios = prios,
        sync_gates = if has_stigmergy { ", put, qry" } else { "" },
        agents = agents,
        prio_close = if has_stigmergy { "end prio)" } else { ")" },
        par_close = if processes.is_empty() { "" } else { "end par" },
    )
}

/// The compositional-verification SVL script.
pub fn svl_script(
    fname: &str,
    not_hidden: &[&str],
    has_stigmergy: bool,
    has_env: bool,
    num_agents: usize,
    fair: bool,
) -> String {
    let not_hidden_list = if not_hidden.is_empty() {
        String::new()
    } else {
        not_hidden.join(", ")
    };
    format!(
        "\n% DEFAULT_PROCESS_FILE=\"{fname}\"\n\n\
         \"{fname}.bcg\" = root leaf divsharp reduction\n\
         hold \"REQUEST\", \"REFRESH\", \"L\", \"ATTR\"\n\
         of\n(\n   hide all but SPURIOUS, {not_hidden_list} in\n\
         {main}\n   end hide\n);\n\n\
         property CHECK\n    \"Compositional verification\"\nis\n    \
         \"evaluator.bcg\" = verify\n    \"{mcl}\"\n    with evaluator4\n    \
         in \"{fname}.bcg\";\n    expected TRUE\nend property\n",
        fname = fname,
        not_hidden_list = not_hidden_list,
        main = exp_main(has_stigmergy, has_env, num_agents, not_hidden, fair),
        mcl = Path::new(fname)
            .with_extension("mcl")
            .to_string_lossy()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn opts(args: &[&str]) -> CliOpts {
        let mut full = vec!["swarmv"];
        full.extend(args);
        CliOpts::parse_from(full)
    }

    #[test]
    fn test_encoding_switches_for_simulation() {
        let verify = Cadp::new(opts(&["f.swarm"]));
        assert_eq!(verify.encoding(), Encoding::Lnt);
        let sim = Cadp::new(opts(&["f.swarm", "--simulate", "3", "--steps", "5"]));
        assert_eq!(sim.encoding(), Encoding::LntMonitor);

        let comp = CadpComp::new(opts(&["f.swarm"]));
        assert_eq!(comp.encoding(), Encoding::LntParallel);
    }

    #[test]
    fn test_monitor_preprocess_renames_module() {
        let mut b = CadpMonitor::new(opts(&["f.swarm"]));
        let info = Info::parse("agent A 0,1\niface 0=x=0\n", &[]).unwrap();
        let out = b
            .preprocess("module HEADER is ...".to_string(), "flock_3_fair.lnt", &info)
            .unwrap();
        assert!(out.starts_with("module FLOCK_3_FAIR is"));
    }

    #[test]
    fn test_refinement_constraints() {
        let comp = CadpComp::new(opts(&["f.swarm"]));
        let info = Info::parse(
            "agent A 0,2\n\
             iface 0=x=0..2\n\
             process A Behavior = x <- 1 - x; Behavior\n",
            &[],
        )
        .unwrap();
        let (good_i, good_l) = comp.refinement(&info, "f.lnt").unwrap();
        assert!(good_i.contains("x := any Int where ((x >= 0) and (x <= 1))"));
        assert!(good_i.contains("i[0] := x"));
        assert_eq!(good_l, "");
    }

    #[test]
    fn test_refinement_fails_without_fixpoint() {
        let comp = CadpComp::new(opts(&["f.swarm"]));
        let info = Info::parse(
            "agent A 0,1\n\
             iface 0=x=0\n\
             process A Behavior = x <- x + 1; Behavior\n",
            &[],
        )
        .unwrap();
        assert!(comp.refinement(&info, "f.lnt").is_err());
    }

    #[test]
    fn test_not_hidden_gates() {
        let comp = CadpComp::new(opts(&["f.swarm"]));
        let info = Info::parse(
            "agent A 0,2\niface 0=x=0..2\nlstig 0=pos=undef\n\
             property always forall A a, x of a < 2\n",
            &[],
        )
        .unwrap();
        assert_eq!(comp.not_hidden(&info), vec!["ATTR"]);
    }

    #[test]
    fn test_svl_script_shape() {
        let script = svl_script("flock.lnt", &["ATTR"], true, false, 2, false);
        assert!(script.contains("\"flock.lnt.bcg\" = root leaf divsharp reduction"));
        assert!(script.contains("hide all but SPURIOUS, ATTR in"));
        assert!(script.contains("total prio"));
        assert!(script.contains("with evaluator4"));
        assert!(script.contains("flock.mcl"));
        assert!(script.contains("expected TRUE"));
    }

    #[test]
    fn test_monitor_query_selection() {
        let always = Info::parse(
            "agent A 0,1\niface 0=x=0\nproperty always forall A a, x of a = 0\n",
            &[],
        )
        .unwrap();
        assert!(monitor_query(&always).ends_with("never.mcl"));
        let finally = Info::parse(
            "agent A 0,1\niface 0=x=0\nproperty finally forall A a, x of a = 0\n",
            &[],
        )
        .unwrap();
        assert!(monitor_query(&finally).ends_with("fairly.mcl"));
    }
}
