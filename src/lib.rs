pub mod cli;
pub mod data;
pub mod error;
pub mod generating;
pub mod logger;
pub mod loss;
pub mod model;
pub mod training;
pub mod visualize;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;
#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
