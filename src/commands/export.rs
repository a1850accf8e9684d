use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use dex_lib::browser::{LaunchOptions, PlaywrightHost};
use dex_lib::{
    DexError, DexOutput, ExportMode, ExportOptions, ExportOutput, ExportService, FileDownload,
    DEX_OUTPUT_VERSION,
};
use url::Url;

use crate::cli::ExportArgs;
use crate::formatting::{render_error, write_output};
use crate::progress::stderr_progress;
use crate::settings::{
    load_config, load_pages, log_effective_config, resolve_export_settings, ExportFlagSources,
};

/// Run `current` or `all` against a live presentation.
pub async fn run_export(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    mode: ExportMode,
    args: ExportArgs,
    path: Option<String>,
) -> ExitCode {
    let format = args.format;
    match export(raw_args, config_path, mode, &args, path.as_deref()).await {
        Ok(body) => match write_output(&body, format) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("Failed to write output: {err}");
                ExitCode::from(2)
            }
        },
        Err(err) => render_error(err, format),
    }
}

async fn export(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    mode: ExportMode,
    args: &ExportArgs,
    path: Option<&str>,
) -> Result<DexOutput, DexError> {
    let config = load_config(config_path.as_deref())?;
    let config = resolve_export_settings(args, config, &ExportFlagSources::from_args(raw_args));
    config
        .validate()
        .map_err(|e| DexError::Config(format!("Invalid settings: {e}")))?;
    log_effective_config(config_path.as_deref(), &config);

    let pages = load_pages(&config, args.pages.as_deref())?;
    let url = start_url(&args.url, path)?;

    let host = Arc::new(
        PlaywrightHost::launch(
            url.as_str(),
            &LaunchOptions {
                browser: config.browser.clone(),
                scale: config.export.capture.scale,
                proxy_url: config.export.capture.proxy_url.clone(),
            },
        )
        .await?,
    );

    let service = ExportService::new(
        host.clone(),
        Arc::new(pages),
        Arc::new(FileDownload::new(args.output_dir.clone())),
        config.export.clone(),
    )
    .with_navigator(host.clone());

    let options = ExportOptions {
        filename: args.filename.clone(),
        ..ExportOptions::default()
    };

    let outcome = {
        let run = async {
            match mode {
                ExportMode::Single => service.export_current_page(options).await,
                ExportMode::All => service.export_all_pages(options, Some(stderr_progress())).await,
            }
        };
        tokio::pin!(run);

        loop {
            tokio::select! {
                result = &mut run => break result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupt received, cancelling export");
                    service.cancel_export();
                }
            }
        }
    };

    drop(service);
    match Arc::try_unwrap(host) {
        Ok(host) => host.close().await,
        Err(_) => tracing::debug!("browser still referenced; leaving it to drop"),
    }

    let result = outcome?;
    Ok(DexOutput::Export(ExportOutput {
        version: DEX_OUTPUT_VERSION.to_string(),
        mode,
        url: url.to_string(),
        result,
    }))
}

/// `--path` is resolved against `--url`.
fn start_url(base: &str, path: Option<&str>) -> Result<Url, DexError> {
    let base = Url::parse(base)
        .map_err(|e| DexError::Config(format!("invalid presentation URL {base:?}: {e}")))?;
    match path.filter(|p| !p.trim().is_empty()) {
        Some(path) => base
            .join(path)
            .map_err(|e| DexError::Config(format!("invalid route path {path:?}: {e}"))),
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::start_url;

    #[test]
    fn path_joins_onto_base() {
        let url = start_url("http://localhost:5173/", Some("/agenda")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/agenda");
        let url = start_url("http://localhost:5173", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/");
    }

    #[test]
    fn bad_base_is_a_config_error() {
        assert!(start_url("not a url", None).is_err());
    }
}
