use burn::config::ConfigError;
use burn::record::RecorderError;
use thiserror::Error;

/// Error type for a DCGAN run.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error.
    #[error("I/O error: `{0}`")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding error.
    #[error("Image error: `{0}`")]
    Image(#[from] image::ImageError),

    /// Module record could not be saved or loaded.
    #[error("Record error: `{0}`")]
    Record(#[from] RecorderError),

    /// Configuration file could not be saved or loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Tensor data could not be read back from the device.
    #[error("Tensor data error: `{0}`")]
    Data(String),

    /// The configuration is rejected before training starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The image source produced no sample.
    #[error("No image found in `{0}`")]
    EmptyDataset(String),

    /// The run logger could not open its file.
    #[error("Logger error: `{0}`")]
    Logger(#[from] tracing_appender::rolling::InitError),

    /// The image folder could not be walked.
    #[error("Dataset error: `{0}`")]
    Dataset(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
