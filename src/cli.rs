use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pagewhistle", about = "Turn pages hands-free by whistling at your microphone")]
pub struct Cli {
    /// Config file (defaults to ./pagewhistle.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Loudness (RMS x 1000) a frame must exceed to count as a whistle
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Seconds after a trigger during which further sound is treated as its echo
    #[arg(long)]
    pub debounce: Option<f64>,

    /// Seconds after which a new whistle counts as a fresh gesture
    #[arg(long)]
    pub isolation: Option<f64>,

    /// Input device name (see --list-devices)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Classify a recorded audio file instead of the microphone
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Command run on a single whistle (whitespace separated)
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    pub forward_cmd: Vec<String>,

    /// Command run on a double whistle (whitespace separated)
    #[arg(long, value_delimiter = ' ', num_args = 1..)]
    pub backward_cmd: Vec<String>,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
