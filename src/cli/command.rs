use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "MLP/TrueHD decoding and sample-rate conversion for PCM streams",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat integrity warnings as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode an MLP/TrueHD elementary stream into raw PCM.
    Decode(DecodeArgs),

    /// Convert the sampling rate of raw f64le PCM.
    Resample(ResampleArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input bitstream file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for raw interleaved little-endian PCM.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// PCM sample layout for the output.
    #[arg(long, value_enum, default_value_t = PcmLayout::S24In32)]
    pub format: PcmLayout,

    /// Stop at the substream that covers this many channels.
    #[arg(long, value_name = "N")]
    pub channels: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ResampleArgs {
    /// Input file of raw interleaved f64le samples.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for raw interleaved f64le samples.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Source sampling frequency in Hz.
    #[arg(long, value_name = "HZ")]
    pub from: usize,

    /// Destination sampling frequency in Hz.
    #[arg(long, value_name = "HZ")]
    pub to: usize,

    /// Interleaved channel count.
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub channels: usize,

    /// Stop-band attenuation in dB.
    #[arg(long, value_name = "DB", default_value_t = 96.0)]
    pub attenuation: f64,

    /// Transition-band width target in Hz.
    #[arg(long, value_name = "HZ", default_value_t = 8000.0)]
    pub transition: f64,

    /// Initial FFT filter length.
    #[arg(long, value_name = "N", default_value_t = 16384)]
    pub fft_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PcmLayout {
    /// 16-bit samples (the low 8 bits of each 24-bit sample are dropped).
    S16,

    /// 24-bit samples in 32-bit words.
    S24In32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}
