//! Puyotui — falling-pair colour matching puzzle in the terminal.

mod app;
mod board;
mod game;
mod input;
mod persistence;
mod piece;
mod theme;
mod ui;

use anyhow::{Context, Result, anyhow};
use app::App;
use clap::{Parser, ValueEnum};
use persistence::{FileSink, NullSink, ScoreSink};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Options derived from CLI that affect engine behaviour.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub palette_size: usize,
    pub tick_ms: u64,
    pub clear_delay_ms: u64,
    /// Pause between chain passes; false resolves chains at once.
    pub animate: bool,
    pub seed: Option<u64>,
}

impl From<&Args> for GameConfig {
    fn from(args: &Args) -> Self {
        Self {
            palette_size: usize::from(args.colors),
            tick_ms: args.tick_ms,
            clear_delay_ms: args.clear_delay_ms,
            animate: !args.no_animation,
            seed: args.seed,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;

    let theme = match theme::Theme::load(args.theme.as_deref(), args.palette) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "theme not loaded, using default");
            theme::Theme::default()
        }
    };
    let config = GameConfig::from(&args);
    let (sink, best) = score_sink(&args);
    info!(?config, best, "starting");

    let mut app = App::new(&args, &config, theme, sink, best);
    app.run()
}

/// Where the best score is kept, if saving was asked for.
fn best_file(args: &Args) -> Option<PathBuf> {
    match (&args.best_file, args.save) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(persistence::default_path()),
        (None, false) => None,
    }
}

/// Best-score sink and the best score it starts from. Nothing is stored unless asked.
fn score_sink(args: &Args) -> (Box<dyn ScoreSink>, u32) {
    let Some(path) = best_file(args) else {
        return (Box::new(NullSink), 0);
    };
    let best = persistence::load_best(&path).unwrap_or_else(|e| {
        warn!(error = %e, path = %path.display(), "could not read best score");
        0
    });
    (Box::new(FileSink::spawn(path, best)), best)
}

/// Tracing goes to a file only; the terminal belongs to the UI.
fn init_logging(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

/// Puyo-style falling-pair puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "puyotui",
    version,
    about = "Falling-pair colour matching puzzle in the terminal. Connect four or more of a colour to clear them.",
    long_about = "Puyotui is a terminal puzzle game in the style of Puyo Puyo.\n\n\
        Pairs of coloured puyos fall into a 6x12 well. Four or more same-coloured puyos \
        touching up/down/left/right pop; everything above falls and may pop again in a chain. \
        Each popped puyo scores one point. The game ends when the well fills to the top.\n\n\
        CONTROLS:\n  Left/Right or h/l  Move     Up/Space or k/x  Rotate    Down or j  Soft drop\n  \
        +/-  Faster/slower   2/3/4  Colours   R  Restart   P  Pause   Q / Esc  Quit"
)]
pub struct Args {
    /// Number of puyo colours (2-4).
    #[arg(short, long, default_value = "4", value_name = "N", value_parser = clap::value_parser!(u8).range(2..=4))]
    pub colors: u8,

    /// Gravity interval in milliseconds.
    #[arg(short = 's', long, default_value = "500", value_name = "MS")]
    pub tick_ms: u64,

    /// Pause between chain passes in milliseconds (with animation).
    #[arg(long, default_value = "300", value_name = "MS")]
    pub clear_delay_ms: u64,

    /// Resolve chains instantly (no pause or fade between passes).
    #[arg(long)]
    pub no_animation: bool,

    /// Seed for piece colours (reproducible games).
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Skip the settings menu and start immediately.
    #[arg(long)]
    pub no_menu: bool,

    /// Write logs to this file (RUST_LOG filters; default info).
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Keep the best score in the config dir (puyotui/highscore).
    #[arg(long)]
    pub save: bool,

    /// Keep the best score in this file (implies --save).
    #[arg(long, value_name = "FILE")]
    pub best_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}
