use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use xshot_lib::Theme;

#[derive(Parser, Debug)]
#[command(name = "xshot")]
#[command(
    version,
    about = "xshot - Capture a clean PNG of a single X post",
    long_about = "xshot\n\nRenders one public post in a headless browser, waits for its layout to settle, expands truncated text and writes a PNG of just the post.\n\nDeleted, private and login-walled posts cannot be captured."
)]
pub struct Cli {
    #[arg(help = "Post URL (https://x.com/<user>/status/<id>)")]
    pub url: String,

    #[arg(long, value_enum, default_value = "light", help = "Color theme")]
    pub theme: ThemeArg,

    #[arg(
        long,
        short,
        value_name = "PATH",
        help = "Output PNG path (defaults to x-post-<id>.png)"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Optional config file (TOML); defaults to ~/.config/xshot/config.toml when present"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn parse() -> Cli {
    Cli::parse()
}
