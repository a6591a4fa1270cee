//! Swarm verification driver
//!
//! Turns a Swarm specification into backend input, runs the backend, and
//! translates its traces back into the source vocabulary. The pipeline:
//! validate options, gather system information from the encoder, rewrite
//! the property, optionally run the value analysis, dispatch to the
//! backend, and always clean up scratch files.

pub mod backends;
pub mod cex;
pub mod cli;
pub mod concretizer;
pub mod dimacs;
pub mod encoder;
pub mod errors;
pub mod exec;
pub mod property;
pub mod template;

use std::fs;

use tracing::{error, info as log_info};

use backends::{create_backend, emit_trace, write_program, Backend};
use cli::{CliOpts, Concretization};
use concretizer::{apply_sat_concretization, apply_source_concretization, Concretizer};
use encoder::Encoding;
use errors::{DriverError, DriverResult, ExitStatus};
use template::Template;

pub use cli::BackendKind;
pub use errors::ExitStatus as Status;

/// Run the driver; returns the process exit code.
pub fn run(opts: CliOpts) -> i32 {
    let simulate = opts.simulate > 0;
    let mut backend = create_backend(opts.backend, opts.clone());
    let mut emitted: Option<String> = None;

    let status = match run_pipeline(backend.as_mut(), &opts, &mut emitted) {
        Ok(status) => status,
        Err(e) => {
            if !e.message.is_empty() {
                match e.status {
                    ExitStatus::Success => log_info!("{}", e.message),
                    _ => error!("{}", e.message),
                }
            }
            e.status
        }
    };

    backend.cleanup(emitted.as_deref().unwrap_or(""));
    println!("{}", status.message(simulate));
    status.code()
}

fn run_pipeline(
    backend: &mut dyn Backend,
    opts: &CliOpts,
    emitted: &mut Option<String>,
) -> DriverResult<ExitStatus> {
    backend.check_cli()?;

    // Translate a stored trace and exit
    if let Some(path) = &opts.translate_cex {
        let info = encoder::get_info(opts)?;
        log_info!("Translating counterexample {}...", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            DriverError::invalid_args(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let events = backend.translate_cex(&text, &info)?;
        print!("{}", emit_trace(&events, &info, opts.json));
        return Ok(ExitStatus::Success);
    }

    let info = encoder::get_info(opts)?;
    backend.check_info(&info)?;

    log_info!("Encoding...");
    let encoding = backend.encoding();
    let slug = backend.ctx().make_slug(encoding.extension());
    let code = encoder::generate_code(opts, encoding)?;
    let code = backend.preprocess(code, &slug, &info)?;

    if opts.show {
        let code = if opts.simulate > 0 && encoding == Encoding::C {
            concretized_for_show(code, &info, opts)?
        } else {
            code
        };
        println!("{}", code);
        return Ok(ExitStatus::Success);
    }

    let path = write_program(backend.ctx_mut(), &code, encoding.extension())?;
    let fname = path.to_string_lossy().into_owned();
    *emitted = Some(fname.clone());

    let task = if opts.simulate > 0 {
        "Running simulation"
    } else {
        "Verifying"
    };
    log_info!("{} with backend {}...", task, backend.name());
    if opts.simulate > 0 {
        backend.simulate(&fname, &info)
    } else {
        backend.verify(&fname, &info)
    }
}

/// `--show` during simulation prints the program the backend would see.
fn concretized_for_show(
    code: String,
    info: &swarm_spec::Info,
    opts: &CliOpts,
) -> DriverResult<String> {
    let steps = opts.steps as usize;
    let mut template = Template::new(code);
    match opts.concretization {
        Concretization::Src => {
            let cfg = z3::Config::new();
            let zctx = z3::Context::new(&cfg);
            let mut c = Concretizer::new(&zctx, info, steps, opts.fair, opts.seed())?;
            c.add_picks_from(&template)?;
            let model = c.concretize()?;
            apply_source_concretization(&mut template, &model, steps)?;
        }
        Concretization::Sat => {
            apply_sat_concretization(&mut template, info, steps, opts.fair)?;
        }
        Concretization::Off => {}
    }
    Ok(template.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[test]
    fn test_pipeline_surfaces_cli_errors() {
        let opts = CliOpts::parse_from(["swarmv", "f.swarm", "--simulate", "2"]);
        let code = run(opts);
        assert_eq!(code, ExitStatus::InvalidArgs.code());
    }

    #[test]
    #[serial]
    fn test_pipeline_requires_encoder_for_verification() {
        // No encoder on PATH and no SWARM_ENCODER: the pipeline must
        // stop with NotFound before touching any backend.
        std::env::remove_var("SWARM_ENCODER");
        let opts = CliOpts::parse_from(["swarmv", "f.swarm", "--backend", "cadp"]);
        let mut backend = create_backend(opts.backend, opts.clone());
        let mut emitted = None;
        let err = run_pipeline(backend.as_mut(), &opts, &mut emitted).unwrap_err();
        assert_eq!(err.status, ExitStatus::NotFound);
    }
}
