use crate::session::SessionOptions;
use biostudio_cli::Args;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use supports_color::Stream;

/// Location of `config.toml` and the interactive log file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Manager rooted at an explicit directory (tests, portable installs)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Manager for `<platform config dir>/<app_name>`
    pub fn new(app_name: &str) -> Result<Self> {
        let base =
            dirs::config_dir().ok_or_else(|| eyre!("Could not determine config directory"))?;
        Ok(Self::with_dir(base.join(app_name)))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, file: &str) -> PathBuf {
        self.config_dir.join(file)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir).map_err(|e| {
            eyre!(
                "Failed to create config directory {}: {}",
                self.config_dir.display(),
                e
            )
        })
    }

    /// The commented template written by `--generate-config`
    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    }

    /// Write the template to `config.toml`, refusing to overwrite unless `force`
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let path = self.config_path("config.toml");
        if path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                path.display()
            ));
        }
        self.ensure_config_dir()?;
        std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        Ok(path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub charts: ChartsConfig,
    pub theme: ThemeConfig,
    pub logging: LoggingConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub dataset_version: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub page_size: usize,
    /// Fields with a display order at most this are shown when a dataset opens
    pub default_column_order: i64,
    /// Column used to label survival curve points; empty disables labels
    pub id_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    /// Fixed histogram bin count; Sturges' rule when unset
    pub histogram_bins: Option<usize>,
    /// Group labels longer than this are truncated with an ellipsis
    pub label_max_len: usize,
    pub export_width: u32,
    pub export_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub color_mode: String,
    pub colors: ColorConfig,
    /// Colors cycled across chart series
    pub series: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub primary: String,
    pub secondary: String,
    pub success: String,
    pub error: String,
    pub warning: String,
    pub dimmed: String,
    pub text_primary: String,
    pub text_secondary: String,
    pub panel_border: String,
    pub panel_border_active: String,
    pub axis: String,
    pub outlier_marker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. "info" or "biostudio=debug"
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            backend: BackendConfig::default(),
            session: SessionConfig::default(),
            charts: ChartsConfig::default(),
            theme: ThemeConfig::default(),
            logging: LoggingConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            dataset_version: "latest".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            default_column_order: 5,
            id_column: "sample_id".to_string(),
        }
    }
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            histogram_bins: None,
            label_max_len: 10,
            export_width: 1024,
            export_height: 768,
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            color_mode: "auto".to_string(),
            colors: ColorConfig::default(),
            series: [
                "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2",
                "#7f7f7f",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            primary: "cyan".to_string(),
            secondary: "yellow".to_string(),
            success: "green".to_string(),
            error: "red".to_string(),
            warning: "yellow".to_string(),
            dimmed: "dark_gray".to_string(),
            text_primary: "white".to_string(),
            text_secondary: "dark_gray".to_string(),
            panel_border: "cyan".to_string(),
            panel_border_active: "yellow".to_string(),
            axis: "dark_gray".to_string(),
            outlier_marker: "red".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let mut config = AppConfig::default();

        let config_manager = ConfigManager::new(app_name)?;
        let config_path = config_manager.config_path("config.toml");
        if config_path.exists() {
            config.merge(Self::from_file(&config_path)?);
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse a config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            eyre!("Failed to read config file at {}: {}", path.display(), e)
        })?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file at {}: {}", path.display(), e))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.backend.merge(other.backend);
        self.session.merge(other.session);
        self.charts.merge(other.charts);
        self.theme.merge(other.theme);
        self.logging.merge(other.logging);
        self.debug.merge(other.debug);
    }

    /// Apply command-line overrides (the last layer)
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(url) = &args.base_url {
            self.backend.base_url = url.clone();
        }
        if let Some(version) = &args.dataset_version {
            self.backend.dataset_version = version.clone();
        }
        if let Some(page_size) = args.page_size {
            self.session.page_size = page_size;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.log_json {
            self.logging.json = true;
        }
        if args.debug {
            self.debug.enabled = true;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if !(self.backend.base_url.starts_with("http://")
            || self.backend.base_url.starts_with("https://"))
        {
            return Err(eyre!(
                "Invalid base_url: {}. Must start with http:// or https://",
                self.backend.base_url
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(eyre!("timeout_secs must be greater than 0"));
        }

        if self.session.page_size == 0 {
            return Err(eyre!("page_size must be greater than 0"));
        }

        if self.charts.histogram_bins == Some(0) {
            return Err(eyre!("histogram_bins must be greater than 0 when set"));
        }
        if self.charts.label_max_len == 0 {
            return Err(eyre!("label_max_len must be greater than 0"));
        }
        if self.charts.export_width == 0 || self.charts.export_height == 0 {
            return Err(eyre!("export_width and export_height must be greater than 0"));
        }

        match self.theme.color_mode.as_str() {
            "light" | "dark" | "auto" => {}
            _ => {
                return Err(eyre!(
                    "Invalid color_mode: {}. Must be 'light', 'dark', or 'auto'",
                    self.theme.color_mode
                ))
            }
        }

        let parser = ColorParser::new();
        self.theme.colors.validate(&parser)?;
        if self.theme.series.is_empty() {
            return Err(eyre!("theme.series must list at least one color"));
        }
        for (i, color) in self.theme.series.iter().enumerate() {
            parser
                .parse(color)
                .map_err(|e| eyre!("Invalid color value for 'series[{}]': {}", i, e))?;
        }

        tracing_subscriber::EnvFilter::try_new(&self.logging.level)
            .map_err(|e| eyre!("Invalid logging level '{}': {}", self.logging.level, e))?;

        Ok(())
    }

    /// Session settings derived from the `[session]` and `[charts]` sections
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            page_size: self.session.page_size,
            default_column_order: self.session.default_column_order,
            id_column: Some(self.session.id_column.clone()).filter(|c| !c.is_empty()),
            histogram_bins: self.charts.histogram_bins,
        }
    }
}

// Merge implementations for each config section
impl BackendConfig {
    pub fn merge(&mut self, other: Self) {
        let default = BackendConfig::default();
        if other.base_url != default.base_url {
            self.base_url = other.base_url;
        }
        if other.dataset_version != default.dataset_version {
            self.dataset_version = other.dataset_version;
        }
        if other.timeout_secs != default.timeout_secs {
            self.timeout_secs = other.timeout_secs;
        }
    }
}

impl SessionConfig {
    pub fn merge(&mut self, other: Self) {
        let default = SessionConfig::default();
        if other.page_size != default.page_size {
            self.page_size = other.page_size;
        }
        if other.default_column_order != default.default_column_order {
            self.default_column_order = other.default_column_order;
        }
        if other.id_column != default.id_column {
            self.id_column = other.id_column;
        }
    }
}

impl ChartsConfig {
    pub fn merge(&mut self, other: Self) {
        let default = ChartsConfig::default();
        if other.histogram_bins.is_some() {
            self.histogram_bins = other.histogram_bins;
        }
        if other.label_max_len != default.label_max_len {
            self.label_max_len = other.label_max_len;
        }
        if other.export_width != default.export_width {
            self.export_width = other.export_width;
        }
        if other.export_height != default.export_height {
            self.export_height = other.export_height;
        }
    }
}

impl ThemeConfig {
    pub fn merge(&mut self, other: Self) {
        let default = ThemeConfig::default();
        if other.color_mode != default.color_mode {
            self.color_mode = other.color_mode;
        }
        if other.series != default.series {
            self.series = other.series;
        }
        self.colors.merge(other.colors);
    }
}

impl ColorConfig {
    /// Validate all color strings can be parsed
    fn validate(&self, parser: &ColorParser) -> Result<()> {
        for (name, value) in self.entries() {
            parser
                .parse(value)
                .map_err(|e| eyre!("Invalid color value for '{}': {}", name, e))?;
        }
        Ok(())
    }

    /// Named color strings, in declaration order.
    fn entries(&self) -> [(&'static str, &String); 12] {
        [
            ("primary", &self.primary),
            ("secondary", &self.secondary),
            ("success", &self.success),
            ("error", &self.error),
            ("warning", &self.warning),
            ("dimmed", &self.dimmed),
            ("text_primary", &self.text_primary),
            ("text_secondary", &self.text_secondary),
            ("panel_border", &self.panel_border),
            ("panel_border_active", &self.panel_border_active),
            ("axis", &self.axis),
            ("outlier_marker", &self.outlier_marker),
        ]
    }

    pub fn merge(&mut self, other: Self) {
        let default = ColorConfig::default();

        macro_rules! merge_color {
            ($($field:ident),*) => {
                $(
                    if other.$field != default.$field {
                        self.$field = other.$field;
                    }
                )*
            };
        }

        merge_color!(
            primary,
            secondary,
            success,
            error,
            warning,
            dimmed,
            text_primary,
            text_secondary,
            panel_border,
            panel_border_active,
            axis,
            outlier_marker
        );
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LoggingConfig::default();
        if other.level != default.level {
            self.level = other.level;
        }
        if other.json != default.json {
            self.json = other.json;
        }
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        if other.enabled {
            self.enabled = true;
        }
    }
}

/// Named colors accepted in the theme, after normalization (lowercase, `_` separators, `gray`).
const NAMED_COLORS: [(&str, Color); 20] = [
    ("black", Color::Black),
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("white", Color::White),
    ("bright_black", Color::Indexed(8)),
    ("bright_red", Color::Indexed(9)),
    ("bright_green", Color::Indexed(10)),
    ("bright_yellow", Color::Indexed(11)),
    ("bright_blue", Color::Indexed(12)),
    ("bright_magenta", Color::Indexed(13)),
    ("bright_cyan", Color::Indexed(14)),
    ("bright_white", Color::Indexed(15)),
    ("gray", Color::Indexed(8)),
    ("dark_gray", Color::Indexed(8)),
    ("light_gray", Color::Indexed(7)),
    ("reset", Color::Reset),
];

/// How much color the output can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorDepth {
    None,
    Basic,
    Palette256,
    TrueColor,
}

/// Turns theme color strings into terminal colors.
///
/// Hex colors are reduced to what the terminal supports; `NO_COLOR` turns every
/// color into `Reset`.
pub struct ColorParser {
    depth: ColorDepth,
}

impl ColorParser {
    /// Parser for stdout, with depth detected from the terminal
    pub fn new() -> Self {
        let depth = if std::env::var_os("NO_COLOR").is_some() {
            ColorDepth::None
        } else {
            match supports_color::on(Stream::Stdout) {
                Some(level) if level.has_16m => ColorDepth::TrueColor,
                Some(level) if level.has_256 => ColorDepth::Palette256,
                _ => ColorDepth::Basic,
            }
        };
        Self { depth }
    }

    /// Parser that keeps hex colors as RGB regardless of the terminal (image export)
    pub fn true_color() -> Self {
        Self {
            depth: ColorDepth::TrueColor,
        }
    }

    /// Parse `#rrggbb`, `indexed(N)` or a color name
    pub fn parse(&self, s: &str) -> Result<Color> {
        if self.depth == ColorDepth::None {
            return Ok(Color::Reset);
        }
        let text = s.trim();

        if let Some(hex) = text.strip_prefix('#').filter(|h| h.len() == 6) {
            let (r, g, b) = parse_hex(hex).ok_or_else(|| {
                eyre!("Invalid hex color: '{}'. Expected format: #rrggbb", text)
            })?;
            return Ok(self.reduce(r, g, b));
        }

        let name = text.to_lowercase();
        if let Some(index) = name
            .strip_prefix("indexed(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return index.parse::<u8>().map(Color::Indexed).map_err(|_| {
                eyre!(
                    "Invalid indexed color: '{}'. Expected format: indexed(0-255)",
                    text
                )
            });
        }

        let key = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .replace("grey", "gray");
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, color)| *color)
            .ok_or_else(|| {
                eyre!(
                    "Unknown color name: '{}'. Use a color name (red, bright_blue, dark_gray, ...), \
                     indexed(N), or a hex color (#ff0000)",
                    text
                )
            })
    }

    fn reduce(&self, r: u8, g: u8, b: u8) -> Color {
        match self.depth {
            ColorDepth::TrueColor => Color::Rgb(r, g, b),
            ColorDepth::Palette256 => Color::Indexed(rgb_to_256_color(r, g, b)),
            ColorDepth::Basic => rgb_to_basic_ansi(r, g, b),
            ColorDepth::None => Color::Reset,
        }
    }
}

impl Default for ColorParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `rrggbb` without the leading `#`.
fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
    };
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Spread between the strongest and weakest channel; small spreads are grays.
fn channel_spread(r: u8, g: u8, b: u8) -> u8 {
    r.max(g).max(b) - r.min(g).min(b)
}

/// Nearest entry of the xterm 256-color palette
pub fn rgb_to_256_color(r: u8, g: u8, b: u8) -> u8 {
    if channel_spread(r, g, b) < 10 {
        let gray = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        return match gray {
            0..=7 => 16,
            248.. => 231,
            level => 232 + ((level - 8) * 24 / 240) as u8,
        };
    }
    let step = |c: u8| (u16::from(c) * 5 / 255) as u8;
    16 + 36 * step(r) + 6 * step(g) + step(b)
}

/// Nearest of the eight basic ANSI colors
pub fn rgb_to_basic_ansi(r: u8, g: u8, b: u8) -> Color {
    if channel_spread(r, g, b) < 30 {
        let level = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        return if level < 64 { Color::Black } else { Color::White };
    }
    const BY_BITS: [Color; 8] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
    ];
    let bits = usize::from(r > 128) | usize::from(g > 128) << 1 | usize::from(b > 128) << 2;
    BY_BITS[bits]
}

/// Parsed theme colors, looked up by the names used in `[theme.colors]`
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: HashMap<String, Color>,
    pub series: Vec<Color>,
}

impl Theme {
    /// Theme for the terminal the app runs in
    pub fn from_config(config: &ThemeConfig) -> Result<Self> {
        Self::with_parser(config, &ColorParser::new())
    }

    pub fn with_parser(config: &ThemeConfig, parser: &ColorParser) -> Result<Self> {
        let colors = config
            .colors
            .entries()
            .into_iter()
            .map(|(name, value)| Ok((name.to_string(), parser.parse(value)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        let series = config
            .series
            .iter()
            .map(|c| parser.parse(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { colors, series })
    }

    /// Color by name; `Reset` when the theme has no such entry
    pub fn get(&self, name: &str) -> Color {
        self.get_optional(name).unwrap_or(Color::Reset)
    }

    pub fn get_optional(&self, name: &str) -> Option<Color> {
        self.colors.get(name).copied()
    }

    /// Color of the `index`-th series, cycling through the palette
    pub fn series_color(&self, index: usize) -> Color {
        if self.series.is_empty() {
            return Color::Reset;
        }
        self.series[index % self.series.len()]
    }
}

// Default configuration template
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
