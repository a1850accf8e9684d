use std::path::Path;
use std::time::Duration;

use dex_lib::{Config, DexError, StaticPages};

use crate::cli::ExportArgs;

/// Tracks which CLI flags were explicitly provided vs. defaulted.
#[derive(Debug, Default)]
pub struct ExportFlagSources {
    pub scale: bool,
    pub quality: bool,
    pub capture_timeout: bool,
    pub viewport: bool,
}

impl ExportFlagSources {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            scale: flag_present(args, "--scale"),
            quality: flag_present(args, "--quality"),
            capture_timeout: flag_present(args, "--capture-timeout"),
            viewport: flag_present(args, "--viewport"),
        }
    }
}

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Applies explicitly given export flags over the loaded config.
pub fn resolve_export_settings(args: &ExportArgs, mut config: Config, flags: &ExportFlagSources) -> Config {
    let capture = &mut config.export.capture;
    if flags.scale {
        capture.scale = args.scale;
    }
    if flags.quality {
        capture.quality = args.quality;
    }
    if flags.capture_timeout {
        capture.timeout = Duration::from_secs(args.capture_timeout);
    }
    if let Some(proxy) = args.proxy_url.as_ref().filter(|p| !p.trim().is_empty()) {
        capture.proxy_url = Some(proxy.clone());
    }
    if flags.viewport {
        config.browser.viewport = args.viewport;
    }
    config
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/dex/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, DexError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        DexError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        DexError::Config(prefix)
    })?;
    Ok(cfg)
}

/// A `--pages` YAML list replaces `[[pages]]` from the config.
pub fn load_pages(config: &Config, pages: Option<&Path>) -> Result<StaticPages, DexError> {
    match pages {
        Some(path) => StaticPages::from_yaml_file(path),
        None => Ok(StaticPages::new(config.pages.clone())),
    }
}

/// Log effective config (visible with --verbose).
pub fn log_effective_config(config_path: Option<&Path>, config: &Config) {
    let source = config_path
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "defaults/built-in".to_string());
    let capture = &config.export.capture;
    tracing::debug!(
        source = %source,
        viewport = %config.browser.viewport,
        scale = capture.scale,
        quality = capture.quality,
        capture_timeout_ms = capture.timeout.as_millis() as u64,
        format = ?config.export.pdf.format,
        orientation = ?config.export.pdf.orientation,
        proxy = capture.proxy_url.is_some(),
        "effective config"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn export_args(argv: &[&str]) -> (ExportArgs, Vec<String>) {
        let raw: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        match Cli::parse_from(argv).command {
            Commands::All { export } => (export, raw),
            _ => panic!("expected all"),
        }
    }

    #[test]
    fn defaults_do_not_override_config() {
        let (args, raw) = export_args(&["dex", "all", "--url", "http://x"]);
        let mut config = Config::default();
        config.export.capture.scale = 3.0;
        config.browser.viewport = "800x600".parse().unwrap();

        let resolved = resolve_export_settings(&args, config, &ExportFlagSources::from_args(&raw));
        assert!((resolved.export.capture.scale - 3.0).abs() < f32::EPSILON);
        assert_eq!(resolved.browser.viewport.width, 800);
    }

    #[test]
    fn explicit_flags_win() {
        let (args, raw) = export_args(&[
            "dex",
            "all",
            "--url",
            "http://x",
            "--scale=1",
            "--capture-timeout",
            "30",
            "--proxy-url",
            "https://proxy/?u=",
        ]);
        let resolved =
            resolve_export_settings(&args, Config::default(), &ExportFlagSources::from_args(&raw));
        assert!((resolved.export.capture.scale - 1.0).abs() < f32::EPSILON);
        assert_eq!(resolved.export.capture.timeout, Duration::from_secs(30));
        assert_eq!(
            resolved.export.capture.proxy_url.as_deref(),
            Some("https://proxy/?u=")
        );
    }

    #[test]
    fn flag_present_matches_both_spellings() {
        let args = vec!["dex".to_string(), "--scale=2".to_string(), "--quality".to_string()];
        assert!(flag_present(&args, "--scale"));
        assert!(flag_present(&args, "--quality"));
        assert!(!flag_present(&args, "--viewport"));
    }
}
