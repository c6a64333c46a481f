use clap::Parser;
use dcgan::cli::Cli;
use std::process::ExitCode;

#[cfg(any(
    feature = "ndarray",
    feature = "ndarray-blas-netlib",
    feature = "ndarray-blas-openblas",
    feature = "ndarray-blas-accelerate",
))]
mod ndarray {
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use dcgan::cli::{Cli, run};

    pub fn run_cli(cli: &Cli) -> dcgan::Result<()> {
        run::<NdArray>(cli, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};
    use dcgan::cli::{Cli, run};

    pub fn run_cli(cli: &Cli) -> dcgan::Result<()> {
        run::<LibTorch>(cli, LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};
    use dcgan::cli::{Cli, run};

    pub fn run_cli(cli: &Cli) -> dcgan::Result<()> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        run::<LibTorch>(cli, device)
    }
}

#[cfg(any(feature = "wgpu", feature = "metal"))]
mod wgpu {
    use burn::backend::wgpu::{Wgpu, WgpuDevice};
    use dcgan::cli::{Cli, run};

    pub fn run_cli(cli: &Cli) -> dcgan::Result<()> {
        run::<Wgpu>(cli, WgpuDevice::default())
    }
}

// A single backend runs, accelerated ones take precedence over the default ndarray one.
fn run_cli(cli: &Cli) -> dcgan::Result<()> {
    #[cfg(any(feature = "wgpu", feature = "metal"))]
    return wgpu::run_cli(cli);

    #[cfg(all(feature = "tch-gpu", not(any(feature = "wgpu", feature = "metal"))))]
    return tch_gpu::run_cli(cli);

    #[cfg(all(
        feature = "tch-cpu",
        not(any(feature = "wgpu", feature = "metal", feature = "tch-gpu"))
    ))]
    return tch_cpu::run_cli(cli);

    #[cfg(not(any(
        feature = "wgpu",
        feature = "metal",
        feature = "tch-gpu",
        feature = "tch-cpu"
    )))]
    ndarray::run_cli(cli)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_cli(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
