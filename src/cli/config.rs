//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{InpaintConfig, ModelKind, ServerConfig},
    models::ModelSource,
    utils::{ModelValidator, PathValidator},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to `InpaintConfig` and `ServerConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the model configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<InpaintConfig> {
        let (trigger_width, trigger_height) = pair(&cli.crop_trigger_size, "--crop-trigger-size")?;

        let mut builder = InpaintConfig::builder()
            .model(cli.model)
            .backend_type(cli.backend)
            .execution_provider(cli.device)
            .lama_input_size((cli.lama_input_size > 0).then_some(cli.lama_input_size))
            .crop_trigger_size(trigger_width, trigger_height)
            .crop_margin(cli.crop_margin)
            .ldm_steps(cli.ldm_steps)
            .seed(cli.seed)
            .jpeg_quality(cli.jpeg_quality)
            .num_threads(cli.threads);

        if let Some(source) = &cli.lama_model {
            builder = builder.lama_model(ModelSource::parse(source));
        }
        if let Some(dir) = &cli.ldm_model_dir {
            builder = builder.ldm_model_dir(dir);
        }

        builder.build().context("Invalid configuration")
    }

    /// Build the HTTP server configuration from CLI arguments
    pub(crate) fn server_config(cli: &Cli) -> Result<ServerConfig> {
        let gui_size = pair(&cli.gui_size, "--gui-size")?;
        let config = ServerConfig {
            host: cli.host.clone(),
            port: cli.port,
            input_image: cli.input.clone(),
            gui: cli.gui,
            gui_size,
            ..ServerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(input) = &cli.input {
            PathValidator::validate_input_image(input)?;
        }

        if cli.jpeg_quality == 0 || cli.jpeg_quality > 100 {
            anyhow::bail!("--jpeg-quality must be between 1 and 100, got {}", cli.jpeg_quality);
        }

        if let Some(ModelSource::Url(url)) = cli.lama_model.as_deref().map(ModelSource::parse) {
            ModelValidator::validate_model_url(&url).context("Invalid --lama-model")?;
        }

        if cli.model == ModelKind::Ldm {
            let dir = cli
                .ldm_model_dir
                .as_ref()
                .context("--model ldm requires --ldm-model-dir")?;
            ModelValidator::validate_ldm_model_dir(dir).context("Invalid --ldm-model-dir")?;
        }

        Ok(())
    }
}

fn pair(values: &[u32], flag: &str) -> Result<(u32, u32)> {
    match values {
        [width, height] => Ok((*width, *height)),
        _ => anyhow::bail!("{flag} expects WIDTH HEIGHT, got {values:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionProvider;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lama-cleaner").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&[
            "--crop-trigger-size",
            "1000",
            "800",
            "--crop-margin",
            "64",
            "--device",
            "cpu",
            "--lama-input-size",
            "0",
            "--lama-model",
            "/models/lama.onnx",
            "--threads",
            "4",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.crop_trigger_size, [1000, 800]);
        assert_eq!(config.crop_margin, 64);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.lama_input_size, None);
        assert_eq!(
            config.lama_model,
            ModelSource::External("/models/lama.onnx".into())
        );
        assert_eq!(config.intra_threads, 4);
    }

    #[test]
    fn test_server_config_conversion() {
        let cli = parse(&["--port", "9000", "--gui", "--gui-size", "800", "600"]);
        let config = CliConfigBuilder::server_config(&cli).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.gui);
        assert_eq!(config.gui_size, (800, 600));
        assert!(config.input_image.is_none());
    }

    #[test]
    fn test_debug_flag_only_changes_logging() {
        let plain = parse(&[]);
        let debug = parse(&["--debug"]);

        assert_eq!(
            CliConfigBuilder::from_cli(&debug).unwrap(),
            CliConfigBuilder::from_cli(&plain).unwrap()
        );
        assert_eq!(
            CliConfigBuilder::server_config(&debug).unwrap(),
            CliConfigBuilder::server_config(&plain).unwrap()
        );
        let tracing = crate::TracingConfig::new().with_debug(debug.debug);
        assert_eq!(tracing.verbosity_to_filter(), "debug");
    }

    #[test]
    fn test_missing_input_is_rejected() {
        let cli = parse(&["--input", "/definitely/not/here.jpg"]);
        let err = CliConfigBuilder::validate_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("not exists"));
    }

    #[test]
    fn test_ldm_requires_model_dir() {
        let cli = parse(&["--model", "ldm"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_invalid_quality() {
        let cli = parse(&["--jpeg-quality", "0"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }
}
