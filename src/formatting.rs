use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::process::ExitCode;

use dex_lib::{DexError, DexOutput, ErrorOutput, ExportMode};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(body: &DexOutput, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body)?,
        OutputFormat::Pretty => write_pretty_output(body)?,
    };
    Ok(())
}

/// Render an error and return the fatal exit code.
pub fn render_error(err: DexError, format: OutputFormat) -> ExitCode {
    let payload = DexOutput::Error(ErrorOutput::new(err.to_payload()));

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"kind\":\"error\"}".into());
            println!("{content}");
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    ExitCode::from(2)
}

fn write_json_output(body: &DexOutput) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    println!("{content}");
    Ok(())
}

fn write_pretty_output(body: &DexOutput) -> io::Result<()> {
    if std::io::stdout().is_terminal() {
        println!("{}", format_pretty(body, true));
        return Ok(());
    }

    // Non-tty: keep JSON shape for pipelines.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"kind\":\"error\"}".to_string());
    println!("{content}");
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &DexOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        DexOutput::Export(out) => {
            let result = &out.result;
            let mode = match out.mode {
                ExportMode::Single => "current page",
                ExportMode::All => "all pages",
            };
            let header = color("[EXPORT]", "32", colorize);
            writeln!(buf, "{} {} -> {}", header, mode, result.filename).ok();
            writeln!(buf, "Source: {}", out.url).ok();
            writeln!(
                buf,
                "Pages: {}  Duration: {:.1}s",
                result.page_count,
                result.duration_ms as f64 / 1000.0
            )
            .ok();
            if let Some(size) = result.file_size {
                writeln!(buf, "Size: {}", format_size(size)).ok();
            }
            if let Some(location) = &result.location {
                writeln!(buf, "Saved to: {}", location.display()).ok();
            }
        }
        DexOutput::Pages(out) => {
            let header = color("[PAGES]", "36", colorize);
            writeln!(buf, "{} {} exportable", header, out.total).ok();
            for entry in &out.pages {
                let number = entry
                    .page
                    .page_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                writeln!(buf, "{:>3}. {:24} {}", number, entry.page.title, entry.page.path).ok();
            }
        }
        DexOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            writeln!(buf, "{} {}", header, out.error.message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= KIB * KIB {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dex_lib::{
        ErrorCategory, ErrorPayload, ExportOutput, ExportResult, PageDescriptor, PageEntry,
        PagesOutput, DEX_OUTPUT_VERSION,
    };
    use std::path::PathBuf;

    #[test]
    fn render_error_always_returns_fatal_exit_code() {
        let code = render_error(DexError::Config("boom".to_string()), OutputFormat::Json);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn format_pretty_summarizes_export() {
        let output = DexOutput::Export(ExportOutput {
            version: DEX_OUTPUT_VERSION.to_string(),
            mode: ExportMode::All,
            url: "http://localhost:5173".into(),
            result: ExportResult {
                success: true,
                task_id: "task-1".into(),
                filename: "deck.pdf".into(),
                page_count: 4,
                duration_ms: 2500,
                file_size: Some(3 * 1024 * 1024),
                location: Some(PathBuf::from("out/deck.pdf")),
            },
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[EXPORT] all pages -> deck.pdf"));
        assert!(pretty.contains("Pages: 4"));
        assert!(pretty.contains("2.5s"));
        assert!(pretty.contains("3.0 MiB"));
        assert!(pretty.contains("out/deck.pdf"));
    }

    #[test]
    fn format_pretty_lists_pages() {
        let output = DexOutput::Pages(PagesOutput {
            version: DEX_OUTPUT_VERSION.to_string(),
            total: 2,
            pages: vec![
                PageEntry {
                    page: PageDescriptor::new("/intro", "Intro", 1),
                    previous: None,
                    next: Some("/agenda".into()),
                },
                PageEntry {
                    page: PageDescriptor::new("/agenda", "Agenda", 2),
                    previous: Some("/intro".into()),
                    next: None,
                },
            ],
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[PAGES] 2 exportable"));
        assert!(pretty.contains("Intro"));
        assert!(pretty.contains("/agenda"));
    }

    #[test]
    fn format_pretty_handles_errors() {
        let output = DexOutput::Error(ErrorOutput::new(ErrorPayload {
            category: ErrorCategory::Config,
            message: "bad input".to_string(),
            remediation: Some("check flags".to_string()),
        }));

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[ERROR] bad input"));
        assert!(pretty.contains("Hint: check flags"));
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
    }
}
