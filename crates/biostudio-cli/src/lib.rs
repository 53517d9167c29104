//! Shared CLI definitions for biostudio.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// How the `--where` rules are combined at the root of the filter tree
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum MatchMode {
    /// Every rule must hold (AND)
    #[default]
    All,
    /// At least one rule must hold (OR)
    Any,
}

/// Chart used for the grouped view instead of the recommended one
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ChartOverride {
    /// Mean per group with standard-error bars
    Bar,
    /// Box plot per group
    Box,
    /// Violin plot per group (drawn from the same quartile summary as box)
    Violin,
    /// Scatter of two numeric columns
    Scatter,
    /// Histogram of the compared column
    Histogram,
    /// Kaplan-Meier survival curves split by the grouping column
    Kmplot,
    /// Grouped summary statistics table
    Summary,
}

/// Output format for chart export
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ExportFormat {
    /// PNG bitmap
    Png,
    /// Scalable vector graphics
    Svg,
}

impl ExportFormat {
    /// Detect export format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("png") => Some(Self::Png),
            Some("svg") => Some(Self::Svg),
            _ => None,
        }
    }

    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

/// Command-line arguments for biostudio
#[derive(Clone, Parser, Debug)]
#[command(
    name = "biostudio",
    version,
    about = "Query and chart omics and clinical datasets in the terminal",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    /// Dataset key on the backend (not required with --generate-config)
    #[arg(required_unless_present = "generate_config", value_name = "DATASET")]
    pub dataset: Option<String>,

    /// Dataset version (default: config [backend] dataset_version)
    #[arg(long = "dataset-version", value_name = "VERSION")]
    pub dataset_version: Option<String>,

    /// Backend base URL, e.g. http://localhost:8000 (overrides config [backend] base_url)
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Read the data dictionary from a local JSON file instead of the backend
    #[arg(long = "dictionary", value_name = "PATH", requires = "records")]
    pub dictionary: Option<PathBuf>,

    /// Read records from a local JSON file instead of the backend (filters are not applied)
    #[arg(long = "records", value_name = "PATH", requires = "dictionary")]
    pub records: Option<PathBuf>,

    /// Filter rule as "FIELD OP VALUE", e.g. "age >= 40" or "sex in M,F". Repeatable.
    #[arg(long = "where", value_name = "RULE")]
    pub filters: Vec<String>,

    /// Combine --where rules with AND (all) or OR (any)
    #[arg(long = "match", value_enum, default_value_t = MatchMode::All)]
    pub match_mode: MatchMode,

    /// Page to load, starting at 1
    #[arg(long = "page", value_name = "N")]
    pub page: Option<usize>,

    /// Rows per page (overrides config [session] page_size)
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<usize>,

    /// Load every matching row in one page
    #[arg(long = "all", action)]
    pub load_all: bool,

    /// Columns to chart. Repeatable. Default: dictionary fields with a low display order.
    #[arg(long = "column", value_name = "KEY")]
    pub columns: Vec<String>,

    /// Compare the selected columns against this column in a grouped view
    #[arg(long = "group-by", value_name = "KEY")]
    pub group_by: Option<String>,

    /// Chart for the grouped view instead of the recommended one
    #[arg(long = "chart", value_enum, requires = "group_by")]
    pub chart: Option<ChartOverride>,

    /// Export the charts to an image file (format from extension or --export-format)
    #[arg(long = "export-chart", value_name = "PATH")]
    pub export_chart: Option<PathBuf>,

    /// Force chart export format (png, svg)
    #[arg(long = "export-format", value_enum)]
    pub export_format: Option<ExportFormat>,

    /// Write the loaded page as a tab-separated table
    #[arg(long = "export-table", value_name = "PATH")]
    pub export_table: Option<PathBuf>,

    /// Print a plain-text report instead of starting the interactive view
    #[arg(long = "print", action)]
    pub print: bool,

    /// Log level filter (overrides config [logging] level; RUST_LOG takes precedence)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long = "log-json", action)]
    pub log_json: bool,

    /// Enable debug mode to show operational information
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/biostudio/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,
}

/// Markdown-safe table cell: `|` escaped, line breaks flattened.
fn table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// `<NAME>` placeholders for the values an argument takes.
fn value_names(arg: &clap::Arg) -> Option<String> {
    let names = arg.get_value_names()?;
    Some(
        names
            .iter()
            .map(|n| format!("<{}>", n.as_str()))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// How an argument is written on the command line, e.g. `--where <RULE>` or `[<DATASET>]`.
fn usage_label(arg: &clap::Arg) -> String {
    if arg.is_positional() {
        let names = value_names(arg).unwrap_or_default();
        return if arg.is_required_set() {
            names
        } else {
            format!("[{names}]")
        };
    }
    let flags: Vec<String> = arg
        .get_short()
        .map(|s| format!("-{s}"))
        .into_iter()
        .chain(arg.get_long().map(|l| format!("--{l}")))
        .collect();
    let mut label = flags.join(", ");
    if arg.get_action().takes_values() {
        if let Some(names) = value_names(arg) {
            label.push(' ');
            label.push_str(&names);
        }
    }
    label
}

/// Render command-line options as markdown.
///
/// Used by the gen_docs binary.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = format!(
        "# Command Line Options\n\n## Usage\n\n```\n{}\n```\n\n## Options\n\n",
        cmd.render_usage()
    );
    out.push_str("| Option | Description |\n|--------|-------------|\n");
    for arg in cmd
        .get_arguments()
        .filter(|a| !matches!(a.get_id().as_str(), "help" | "version"))
    {
        let help = arg
            .get_help()
            .map(|h| table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("| `{}` | {help} |\n", usage_label(arg)));
    }
    out
}
