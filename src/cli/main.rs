//! Inpainting server CLI
//!
//! Parses arguments, prepares the model weights and runs the HTTP server,
//! optionally inside a desktop window.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, WeightsCache, CACHE_DIR_ENV},
    config::{ExecutionProvider, ModelKind},
    inference::{BackendFactory, BackendType, DefaultBackendFactory},
    processor::InpaintProcessor,
    server::{self, gui, AppState},
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use tracing::Instrument;

/// Thread-count variables honoured by the BLAS/OpenMP libraries under the runtimes
const THREAD_ENV_VARS: &[&str] = &[
    "OMP_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "MKL_NUM_THREADS",
    "VECLIB_MAXIMUM_THREADS",
    "NUMEXPR_NUM_THREADS",
];

/// Local image inpainting server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "lama-cleaner")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Path to image you want to load by default
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Listening port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Inpainting model (lama, ldm)
    #[arg(long, default_value_t = ModelKind::Lama)]
    pub model: ModelKind,

    /// Device (cuda, cpu, coreml, auto); unavailable devices fall back to CPU
    #[arg(long, default_value_t = ExecutionProvider::Cuda)]
    pub device: ExecutionProvider,

    /// Inference backend (onnx, tract)
    #[arg(long, default_value_t = BackendType::Onnx)]
    pub backend: BackendType,

    /// If the image area is larger than WIDTH*HEIGHT, crop each painted region
    /// from the original image for inference (LaMa only)
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [2042, 2042])]
    pub crop_trigger_size: Vec<u32>,

    /// Margin around the bounding box of painted strokes in crop mode
    #[arg(long, default_value_t = 256)]
    pub crop_margin: u32,

    /// Steps for DDIM sampling; more steps are slower but better
    #[arg(long, default_value_t = 50)]
    pub ldm_steps: usize,

    /// Launch as desktop app
    #[arg(long)]
    pub gui: bool,

    /// Window size for the desktop app
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [1600, 1000])]
    pub gui_size: Vec<u32>,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// LaMa ONNX weights: local path or http(s) URL [default: LaMa-ONNX fp32 export]
    #[arg(long, value_name = "PATH_OR_URL")]
    pub lama_model: Option<String>,

    /// Fixed input size of the LaMa graph (0 = dynamic input shapes)
    #[arg(long, default_value_t = 512)]
    pub lama_input_size: u32,

    /// Directory holding the exported LDM graphs
    #[arg(long, value_name = "DIR")]
    pub ldm_model_dir: Option<PathBuf>,

    /// JPEG quality of the response (1-100)
    #[arg(long, default_value_t = 100)]
    pub jpeg_quality: u8,

    /// Number of inference threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Seed for LDM sampling noise
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Download the model weights and exit
    #[arg(long)]
    pub only_download: bool,

    /// List cached weights and exit
    #[arg(long)]
    pub list_cached: bool,

    /// Remove all cached weights and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Use a custom weights cache directory (same as CACHE_DIR)
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,
}

/// Entry point of the `lama-cleaner` binary
///
/// Process environment is written here, before the async runtime spawns its
/// worker threads.
pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.debug).context("Failed to initialize tracing")?;

    if let Some(cache_dir) = &cli.cache_dir {
        std::env::set_var(CACHE_DIR_ENV, cache_dir);
    }

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }
    if cli.list_cached {
        return list_cached_weights();
    }
    if cli.clear_cache {
        return clear_cached_weights();
    }

    configure_thread_env(cli.threads);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let server_config = CliConfigBuilder::server_config(&cli)?;
    let config = CliConfigBuilder::from_cli(&cli)?;

    info!(
        "Model: {}, device: {}, backend: {}",
        config.model, config.execution_provider, config.backend_type
    );

    let config = crate::prepare_weights(config, true)
        .await
        .context("Failed to prepare model weights")?;
    if cli.only_download {
        info!("Weights ready: {}", config.lama_model.display_name());
        return Ok(());
    }

    let model_label = config.model.to_string();
    let device_label = config.execution_provider.to_string();
    let processor = tokio::task::spawn_blocking(move || InpaintProcessor::new(config))
        .await
        .context("Model loading task failed")?
        .context("Failed to load inpainting model")?;

    let gui_size = server_config.gui_size;
    let gui_mode = server_config.gui;
    let host = if gui_mode {
        "127.0.0.1".to_string()
    } else {
        server_config.host.clone()
    };
    let port = server_config.port;

    let app = server::router(AppState::new(processor, server_config));
    let listener = server::bind(&host, port)
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let span = spans::server(&format!("{host}:{port}"), &model_label, &device_label);

    if gui_mode {
        gui::run_window(listener, app, gui_size)
            .instrument(span)
            .await
            .context("Desktop window failed")?;
    } else {
        server::serve(listener, app, server::shutdown_signal())
            .instrument(span)
            .await
            .context("Server failed")?;
    }

    info!("lama-cleaner stopped");
    Ok(())
}

/// Thread variables to set: those not already present, pinned to `threads`
/// (or the CPU count when zero)
fn thread_env_updates(
    threads: usize,
    is_set: impl Fn(&str) -> bool,
) -> Vec<(&'static str, String)> {
    let count = if threads > 0 {
        threads
    } else {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    };

    THREAD_ENV_VARS
        .iter()
        .copied()
        .filter(|var| !is_set(var))
        .map(|var| (var, count.to_string()))
        .collect()
}

/// Pin the native math libraries; must run before any other thread starts
fn configure_thread_env(threads: usize) {
    for (var, value) in thread_env_updates(threads, |var| std::env::var_os(var).is_some()) {
        log::debug!("{}={}", var, value);
        std::env::set_var(var, value);
    }
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("------------------------------------------");

    let cpu_count = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nBackends:");
    for backend in DefaultBackendFactory.available_backends() {
        println!("  - {backend}");
    }

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {name}: {status} ({description})");
        }
    }
}

fn list_cached_weights() -> Result<()> {
    let cache = WeightsCache::new().context("Failed to open weights cache")?;
    let checkpoints = cache
        .scan_checkpoints()
        .context("Failed to list cached weights")?;

    println!("Weights cache: {}", cache.checkpoint_dir().display());
    if checkpoints.is_empty() {
        println!("No cached weights. They are downloaded on first start.");
        return Ok(());
    }
    for checkpoint in checkpoints {
        println!(
            "  - {} ({})",
            checkpoint.file_name,
            format_size(checkpoint.size_bytes)
        );
    }
    Ok(())
}

fn clear_cached_weights() -> Result<()> {
    let cache = WeightsCache::new().context("Failed to open weights cache")?;
    let removed = cache.clear_all().context("Failed to clear weights cache")?;
    if removed.is_empty() {
        println!("Cache was already empty");
    } else {
        println!("Removed {} cached file(s):", removed.len());
        for name in removed {
            println!("  - {name}");
        }
    }
    Ok(())
}
