use std::path::PathBuf;
use std::process::ExitCode;

use dex_lib::{DexOutput, PageEntry, PageSource, PagesOutput, DEX_OUTPUT_VERSION};

use crate::cli::OutputFormat;
use crate::formatting::{render_error, write_output};
use crate::settings::{load_config, load_pages};

/// Print the resolved, visible page list with neighbour links.
pub fn run_pages(config_path: Option<PathBuf>, pages: Option<PathBuf>, format: OutputFormat) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format),
    };
    let source = match load_pages(&config, pages.as_deref()) {
        Ok(source) => source,
        Err(err) => return render_error(err, format),
    };

    let entries: Vec<PageEntry> = source
        .pages()
        .into_iter()
        .map(|page| PageEntry {
            previous: source.previous_before(&page.path).map(|p| p.path.clone()),
            next: source.next_after(&page.path).map(|p| p.path.clone()),
            page,
        })
        .collect();

    let body = DexOutput::Pages(PagesOutput {
        version: DEX_OUTPUT_VERSION.to_string(),
        total: entries.len(),
        pages: entries,
    });
    if let Err(err) = write_output(&body, format) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
