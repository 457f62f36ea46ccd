//! DECIMER command-line tool.
//!
//! Prints one SMILES (or SELFIES with `--selfies`) per input image. With more
//! than one image each line is prefixed by the image path and a tab.
//!
//! Logging goes to stderr and follows `RUST_LOG`.

use anyhow::Result;
use clap::Parser;
use decimer::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

/// Translate chemical structure images into SMILES
#[derive(Debug, Parser)]
#[command(name = "decimer")]
#[command(version)]
#[command(about = "Translate chemical structure images into SMILES")]
struct Cli {
    /// Pretrained model variant (Canonical, Isomeric, Augmented)
    #[arg(short, long, default_value_t = ModelId::Canonical)]
    model: ModelId,

    /// Directory holding the pretrained checkpoints
    #[arg(long, default_value = DEFAULT_ASSET_ROOT)]
    assets: PathBuf,

    /// Compute device: cpu, cuda, cuda:N or auto
    #[arg(long, default_value_t = DeviceConfig::Auto)]
    device: DeviceConfig,

    /// Valence policy for SELFIES decoding (default, octet_rule, hypervalent)
    #[arg(long, default_value_t = ValencePolicy::Hypervalent)]
    policy: ValencePolicy,

    /// Override the model's maximum decode length
    #[arg(long)]
    max_length: Option<usize>,

    /// Print the predicted SELFIES instead of SMILES
    #[arg(long)]
    selfies: bool,

    /// Images to translate
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every image was translated.
fn run(cli: &Cli) -> Result<bool> {
    let mut builder = Predictor::builder()
        .model(cli.model)
        .asset_root(&cli.assets)
        .device(cli.device)
        .valence_policy(cli.policy);
    if let Some(max_length) = cli.max_length {
        builder = builder.max_length(max_length);
    }
    let predictor = builder.build()?;

    let labelled = cli.images.len() > 1;
    let mut all_ok = true;
    for image in &cli.images {
        let result = if cli.selfies {
            predictor.predict_selfies(image).map(|decoded| decoded.grammar())
        } else {
            predictor.predict_smiles(image)
        };
        match result {
            Ok(text) => {
                if labelled {
                    println!("{}\t{}", image.display(), text);
                } else {
                    println!("{}", text);
                }
            }
            Err(e) => {
                tracing::error!(image = %image.display(), "prediction failed");
                eprintln!("error: {}: {:#}", image.display(), e);
                all_ok = false;
            }
        }
    }
    Ok(all_ok)
}
