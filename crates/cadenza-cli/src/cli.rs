use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cadenza", version)]
pub struct Args {
    /// Path or URL of the audio to play
    pub source: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Initial volume in [0.0, 1.0]
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,

    /// Seek to this position (milliseconds) before playback starts
    #[arg(long)]
    pub seek_ms: Option<u64>,

    /// Output ring buffer target in seconds
    #[arg(long, default_value_t = 0.5)]
    pub buffer_seconds: f32,
}
