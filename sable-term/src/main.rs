//! Sable: a low-latency CPU-rasterised terminal emulator.

mod app;
mod config;
mod font;
mod input;
mod renderer;
mod terminal;

use std::env;
use std::process;

use app::App;
use config::{CliArgs, Config};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const HELP_TEXT: &str = r#"sable - a terminal emulator

USAGE:
    sable [OPTIONS]

OPTIONS:
    -f, --font-size <SIZE>    Font size in points (default: 14.0)
        --font <FAMILY>       Font family (default: monospace)
    -s, --shell <SHELL>       Shell command to run (default: $SHELL)
        --scrollback <ROWS>   Scrollback rows (default: 10000)
    -h, --help                Print help information
    -V, --version             Print version information

ENVIRONMENT VARIABLES:
    SABLE_FONT_FAMILY         Override font family
    SABLE_FONT_SIZE           Override font size
    SABLE_SHELL               Override shell command
    SABLE_SCROLLBACK_ROWS     Override scrollback rows

KEYBINDINGS:
    Shift+Escape              Close the window
    Ctrl+1 / Ctrl+2           Decrease / increase font size
    Ctrl+Shift+V              Paste from clipboard
"#;

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                println!("{}", HELP_TEXT);
                process::exit(0);
            }
            "-V" | "--version" => {
                println!("sable {}", VERSION);
                process::exit(0);
            }
            "-f" | "--font-size" => {
                i += 1;
                let value = args.get(i).ok_or("--font-size requires a value")?;
                cli.font_size =
                    Some(value.parse().map_err(|_| format!("invalid font size: {}", value))?);
            }
            "--font" => {
                i += 1;
                let value = args.get(i).ok_or("--font requires a family name")?;
                cli.font_family = Some(value.clone());
            }
            "-s" | "--shell" => {
                i += 1;
                let value = args.get(i).ok_or("--shell requires a command")?;
                cli.shell = Some(value.clone());
            }
            "--scrollback" => {
                i += 1;
                let value = args.get(i).ok_or("--scrollback requires a row count")?;
                cli.scrollback_rows =
                    Some(value.parse().map_err(|_| format!("invalid row count: {}", value))?);
            }
            arg => {
                return Err(format!("unknown option: {} (try --help)", arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let config = Config::load(&cli);
    log::info!("starting sable {}", VERSION);

    // Fatal startup errors (no display, no font, no shell) exit with 1.
    if let Err(e) = App::new(config).run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
