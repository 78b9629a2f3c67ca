use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use artifact_stager::config::{load_config, StagerConfig};
use artifact_stager::logging;
use artifact_stager::preflight::{check_host_setup, REQUIRED_TOOLS};
use artifact_stager::prelude::*;

fn usage() -> &'static str {
    "Usage:\n  artifact-stager stage <build_target> <build_id> [--dir <path>] [--min-free-gib <n>] [--config <path>] [--non-interactive]\n  artifact-stager check [--config <path>]"
}

#[derive(Debug, Default)]
struct Options {
    dir: Option<String>,
    min_free_gib: Option<u64>,
    config: Option<PathBuf>,
    non_interactive: bool,
}

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<StageError>() {
            Some(stage_err) => {
                eprintln!("error[{}]: {}", stage_err.kind(), stage_err);
                ExitCode::from(stage_err.exit_code() as u8)
            }
            None => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, build_target, build_id, rest @ ..] if cmd == "stage" => {
            let options = parse_options(rest)?;
            let path = stage(build_target, build_id, &options)?;
            println!("{}", path.display());
            Ok(())
        }
        [cmd, rest @ ..] if cmd == "check" => check(&parse_options(rest)?),
        _ => bail!(usage()),
    }
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => options.dir = Some(flag_value(&mut iter, arg)?.to_string()),
            "--min-free-gib" => {
                let raw = flag_value(&mut iter, arg)?;
                let gib: u64 = raw
                    .parse()
                    .with_context(|| format!("invalid --min-free-gib value '{raw}'"))?;
                if gib == 0 {
                    bail!("--min-free-gib must be at least 1");
                }
                options.min_free_gib = Some(gib);
            }
            "--config" => options.config = Some(PathBuf::from(flag_value(&mut iter, arg)?)),
            "--non-interactive" => options.non_interactive = true,
            other => bail!("unknown argument '{}'\n{}", other, usage()),
        }
    }
    Ok(options)
}

fn flag_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}

fn load(options: &Options) -> Result<StagerConfig> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(gib) = options.min_free_gib {
        config.min_free_gib = gib;
    }
    if let Some(dir) = &options.dir {
        config.download_dir = dir.clone();
    }
    Ok(config)
}

fn stage(build_target: &str, build_id: &str, options: &Options) -> Result<PathBuf> {
    let config = load(options)?;
    let runner = SystemRunner;
    let operator = if options.non_interactive {
        TerminalOperator::non_interactive()
    } else {
        TerminalOperator::new()
    };

    let report = check_host_setup(&runner, &config.required_package, REQUIRED_TOOLS);
    let client: Box<dyn BuildClient + '_> = match &config.mirror_dir {
        Some(mirror) => Box::new(MirrorClient::new(mirror)),
        None => Box::new(FetchToolClient::new(
            &config.fetch_tool,
            &runner,
            Box::new(EnvCredentials::new(&config.token_env)),
        )),
    };
    let decompressor = ArchiveDecompressor::new(&runner);

    let pipeline = StagingPipeline::new(
        DiskSpaceAdvisor::new(&operator, &Fs2Probe, config.min_free_bytes()),
        ArtifactFetcher::new(client.as_ref(), &decompressor),
        ArtifactPostProcessor::new(&runner, config.post_process.clone()),
    );

    let request = StageRequest {
        build: BuildArtifactRef::new(build_target, build_id),
        requested_dir: config.download_dir.clone(),
        setup_ok: report.setup_ok(),
        required_package: config.required_package.clone(),
    };
    Ok(pipeline.stage(&request)?)
}

fn check(options: &Options) -> Result<()> {
    let config = load(options)?;
    let report = check_host_setup(&SystemRunner, &config.required_package, REQUIRED_TOOLS);
    println!("{}", report.describe());
    if !report.setup_ok() {
        return Err(StageError::SetupIncomplete {
            package: config.required_package,
        }
        .into());
    }
    Ok(())
}
