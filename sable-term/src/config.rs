//! Configuration.
//!
//! Settings come from CLI flags, then environment variables, then built-in
//! defaults. There is deliberately no configuration file.

use std::env;

use log::warn;

/// CLI overrides collected by `main`.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub shell: Option<String>,
    pub scrollback_rows: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Font family handed to fontconfig.
    pub font_family: String,
    /// Font size in points (scaled by the window's scale factor).
    pub font_size: f32,
    /// Scrollback rows kept above the view.
    pub scrollback_rows: usize,
    /// Shell command; `None` means `$SHELL`.
    pub shell: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            font_family: "monospace".to_string(),
            font_size: 14.0,
            scrollback_rows: sable_core::DEFAULT_SCROLLBACK_ROWS,
            shell: None,
        }
    }
}

impl Config {
    /// Merge defaults, environment variables, and CLI flags, in increasing
    /// precedence.
    pub fn load(args: &CliArgs) -> Self {
        let mut config = Config::default();

        if let Ok(family) = env::var("SABLE_FONT_FAMILY") {
            config.font_family = family;
        }
        if let Ok(size) = env::var("SABLE_FONT_SIZE") {
            match size.parse() {
                Ok(size) => config.font_size = size,
                Err(_) => warn!("ignoring invalid SABLE_FONT_SIZE {:?}", size),
            }
        }
        if let Ok(rows) = env::var("SABLE_SCROLLBACK_ROWS") {
            match rows.parse() {
                Ok(rows) => config.scrollback_rows = rows,
                Err(_) => warn!("ignoring invalid SABLE_SCROLLBACK_ROWS {:?}", rows),
            }
        }
        if let Ok(shell) = env::var("SABLE_SHELL") {
            config.shell = Some(shell);
        }

        if let Some(family) = &args.font_family {
            config.font_family = family.clone();
        }
        if let Some(size) = args.font_size {
            config.font_size = size;
        }
        if let Some(rows) = args.scrollback_rows {
            config.scrollback_rows = rows;
        }
        if let Some(shell) = &args.shell {
            config.shell = Some(shell.clone());
        }

        config.font_size = config.font_size.clamp(4.0, 128.0);
        config
    }
}
