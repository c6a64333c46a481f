use crate::{
    error::Result,
    generating::generate,
    training::{TrainingConfig, train},
};
use burn::{backend::Autodiff, prelude::*};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Train a DCGAN and sample images from its checkpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train both networks, clearing the artifact directory first
    Train {
        /// Directory receiving the log, sample grids and checkpoints
        #[arg(long, default_value = "output")]
        artifact_dir: PathBuf,
        /// Folder of class subfolders, overrides the configured one
        #[arg(long)]
        input_dir: Option<String>,
        /// Training configuration saved as JSON, the DCGAN defaults are used otherwise
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Sample images from a saved generator
    Generate {
        /// Directory of a previous training run
        #[arg(long, default_value = "output")]
        artifact_dir: PathBuf,
        /// Epoch of the generator checkpoint
        #[arg(long)]
        epoch: usize,
        #[arg(long, default_value_t = 64)]
        num_images: usize,
    },
}

/// Runs a command on the given backend, training uses its autodiff decorator.
pub fn run<B: Backend>(cli: &Cli, device: B::Device) -> Result<()> {
    match &cli.command {
        Commands::Train {
            artifact_dir,
            input_dir,
            config,
        } => {
            let mut config = match config {
                Some(path) => TrainingConfig::load(path)?,
                None => TrainingConfig::dcgan(),
            };
            if let Some(input_dir) = input_dir {
                config.input_dir = input_dir.clone();
            }

            train::<Autodiff<B>>(artifact_dir, config, device)
        }
        Commands::Generate {
            artifact_dir,
            epoch,
            num_images,
        } => generate::<B>(artifact_dir, *epoch, *num_images, device).map(|_| ()),
    }
}
