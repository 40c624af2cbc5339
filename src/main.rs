use anyhow::{Context, Result};
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::{CommandFactory, Parser};
use log::{error, info};
use lstm_ocr::{
    cli::{BackendKind, TrainArgs},
    error::ConfigError,
    image_data::dewarp_file,
    parse_config::{self, FileConfig},
    training,
};

fn main() -> Result<()> {
    let args = TrainArgs::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let file = FileConfig::for_args(&args)?;
    let inputs = parse_config::collect_inputs(&args)?;
    if inputs.is_empty() {
        TrainArgs::command().print_help()?;
        return Ok(());
    }

    if args.dewarp {
        let lnorm = parse_config::line_normalizer(&args, &file)?;
        for path in &inputs {
            match dewarp_file(path, &lnorm) {
                Ok(written) => info!("{}", written.display()),
                Err(err) => error!("{}: {err}", path.display()),
            }
        }
        return Ok(());
    }

    let setup = match parse_config::resolve(&args, &file, inputs) {
        Ok(setup) => setup,
        Err(err @ (ConfigError::MissingOutput | ConfigError::MovieNeedsDisplay)) => {
            eprintln!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let summary = match setup.config.backend {
        BackendKind::NdArray => {
            training::train::<Autodiff<NdArray>>(setup, NdArrayDevice::Cpu)
        }
        BackendKind::Wgpu => training::train::<Autodiff<Wgpu>>(setup, WgpuDevice::default()),
    }
    .context("training failed")?;

    info!(
        "done: {} trials, {} trained, {} skipped, {} recoveries, {} checkpoints",
        summary.trials,
        summary.trained,
        summary.skipped,
        summary.recoveries,
        summary.checkpoints.len()
    );

    Ok(())
}
