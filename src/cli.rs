use clap::{Args, Parser, Subcommand, ValueEnum};
use dex_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dex")]
#[command(
    version,
    about = "Deck Exporter - capture presentation pages into a PDF",
    long_about = "Deck Exporter (dex)\n\nModes:\n- current: export the page open at --url (plus --path) as a one-page PDF.\n- all: export every page from the configured page list, in page-number order.\n- pages: print the resolved page list.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) with capture/pdf/file/browser defaults and [[pages]]; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export the current page as a one-page PDF
    Current {
        #[command(flatten)]
        export: ExportArgs,

        #[arg(long, help = "Route path to open under --url before capturing (e.g. /intro)")]
        path: Option<String>,
    },

    /// Export every page in the page list
    All {
        #[command(flatten)]
        export: ExportArgs,
    },

    /// Print the resolved page list
    Pages {
        #[arg(long, value_name = "PATH", help = "YAML page list (overrides [[pages]] in config)")]
        pages: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },
}

#[derive(Args, Clone)]
pub struct ExportArgs {
    #[arg(long, help = "Base URL of the running presentation")]
    pub url: String,

    #[arg(long, help = "Output filename (.pdf is appended if missing)")]
    pub filename: Option<String>,

    #[arg(
        long,
        default_value = ".",
        value_name = "PATH",
        help = "Directory the PDF is written to; created if missing"
    )]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "2", help = "Capture scale factor")]
    pub scale: f32,

    #[arg(long, default_value = "0.95", help = "JPEG quality in (0, 1]; capped at 0.95")]
    pub quality: f32,

    #[arg(
        long,
        default_value = "15",
        value_name = "SECS",
        help = "Hard timeout (seconds) for rendering one page"
    )]
    pub capture_timeout: u64,

    #[arg(long, help = "Proxy URL prefix for cross-origin images")]
    pub proxy_url: Option<String>,

    #[arg(
        long,
        default_value = "1440x900",
        help = "Viewport dimensions (WIDTHxHEIGHT)"
    )]
    pub viewport: Viewport,

    #[arg(long, value_name = "PATH", help = "YAML page list (overrides [[pages]] in config)")]
    pub pages: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, OutputFormat};
    use clap::Parser;

    #[test]
    fn current_command_uses_defaults() {
        let cli = Cli::parse_from(["dex", "current", "--url", "http://localhost:5173"]);

        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Current { export, path } => {
                assert_eq!(export.url, "http://localhost:5173");
                assert!(path.is_none());
                assert!(export.filename.is_none());
                assert_eq!(export.output_dir.to_str(), Some("."));
                assert!((export.scale - 2.0).abs() < f32::EPSILON);
                assert!((export.quality - 0.95).abs() < f32::EPSILON);
                assert_eq!(export.capture_timeout, 15);
                assert_eq!(export.viewport.width, 1440);
                assert!(matches!(export.format, OutputFormat::Json));
            }
            _ => panic!("expected current command"),
        }
    }

    #[test]
    fn all_command_accepts_overrides() {
        let cli = Cli::parse_from([
            "dex",
            "all",
            "--url",
            "http://localhost:5173",
            "--viewport",
            "1280x720",
            "--pages",
            "pages.yaml",
            "--filename",
            "deck",
            "--format",
            "pretty",
            "--verbose",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::All { export } => {
                assert_eq!(export.viewport.width, 1280);
                assert_eq!(export.pages.as_deref().and_then(|p| p.to_str()), Some("pages.yaml"));
                assert_eq!(export.filename.as_deref(), Some("deck"));
                assert!(matches!(export.format, OutputFormat::Pretty));
            }
            _ => panic!("expected all command"),
        }
    }

    #[test]
    fn url_is_required_for_exports() {
        assert!(Cli::try_parse_from(["dex", "all"]).is_err());
        assert!(Cli::try_parse_from(["dex", "pages"]).is_ok());
    }
}
