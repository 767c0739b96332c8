//! Polyphase/FFT sample-rate converter for interleaved 64-bit float PCM.
//!
//! A [`Resampler`] converts between any two rates whose reduced ratio is
//! divisible by 1, 2 or 3 (which covers the 44.1 kHz and 48 kHz families in
//! both directions). Conversion runs in two stages: upsampling interpolates
//! with a short time-domain polyphase filter and then low-passes with a long
//! FFT overlap-add convolution; downsampling mirrors the order. All filters
//! are Kaiser-windowed sincs designed once at construction for a requested
//! stop-band attenuation and transition width.
//!
//! Data moves through grow-on-write byte buffers: [`Resampler::write`]
//! appends input and converts whole blocks as they become available,
//! [`Resampler::read`] drains converted output, and [`Resampler::finish`]
//! flushes the tail after the last write. Samples are interleaved
//! little-endian `f64` in both directions. The filter group delay is
//! swallowed internally, so output aligns with input.
//!
//! ```rust,no_run
//! use ssrc::{Resampler, ResamplerConfig};
//!
//! let mut resampler = Resampler::new(ResamplerConfig::new(44_100, 48_000, 2))?;
//!
//! resampler.write(&[/* f64le samples */])?;
//! resampler.finish()?;
//!
//! let mut out = vec![0u8; resampler.pending()];
//! let n = resampler.read(&mut out);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, bail};

mod buffer;
mod design;
mod down;
mod up;

pub mod errors;

pub use buffer::Buffer;

use design::gcd;
use down::Downsampler;
use errors::SsrcError;
use up::Upsampler;

/// Bytes per sample: samples are 64-bit floats.
pub const BYTES_PER_SAMPLE: usize = 8;

/// Resampler construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct ResamplerConfig {
    /// Source sampling frequency in Hz.
    pub sfrq: usize,

    /// Destination sampling frequency in Hz.
    pub dfrq: usize,

    /// Interleaved channel count.
    pub nch: usize,

    /// Stop-band attenuation in dB.
    pub aa: f64,

    /// Transition-band width target in Hz for the FFT filter stage.
    pub df: f64,

    /// Initial FFT filter length; doubled until the transition band fits.
    pub fftfirlen: usize,
}

impl ResamplerConfig {
    /// Defaults: 96 dB stop-band, 8 kHz transition target, 16384-tap seed.
    pub fn new(sfrq: usize, dfrq: usize, nch: usize) -> Self {
        Self {
            sfrq,
            dfrq,
            nch,
            aa: 96.0,
            df: 8000.0,
            fftfirlen: 16384,
        }
    }
}

/// Returns whether the rate pair is convertible: equal rates, or a reduced
/// ratio divisible by 1, 2 or 3.
pub fn can_resample(sfrq: usize, dfrq: usize) -> bool {
    if sfrq == dfrq {
        return true;
    }

    let frqgcd = gcd(sfrq, dfrq);
    let ratio = if dfrq > sfrq {
        sfrq / frqgcd
    } else {
        dfrq / frqgcd
    };

    ratio == 1 || ratio % 2 == 0 || ratio % 3 == 0
}

enum Engine {
    Passthrough,
    Up(Box<Upsampler>),
    Down(Box<Downsampler>),
}

/// Streaming sample-rate converter.
pub struct Resampler {
    nch: usize,
    sfrq: usize,
    dfrq: usize,

    engine: Engine,
    input: Buffer,
    output: Buffer,

    /// Group-delay samples still to swallow before delivering output.
    delay: usize,

    staging: Vec<f64>,
}

impl Resampler {
    /// Builds a resampler, rejecting unsupported rate pairs.
    pub fn new(config: ResamplerConfig) -> Result<Self> {
        if config.nch == 0 || !can_resample(config.sfrq, config.dfrq) {
            let frqgcd = gcd(config.sfrq.max(1), config.dfrq.max(1));
            bail!(SsrcError::UnsupportedRatePair {
                sfrq: config.sfrq,
                dfrq: config.dfrq,
                ratio: config.sfrq.min(config.dfrq) / frqgcd,
            });
        }

        let engine = match config.sfrq.cmp(&config.dfrq) {
            std::cmp::Ordering::Less => Engine::Up(Box::new(Upsampler::new(&config))),
            std::cmp::Ordering::Greater => Engine::Down(Box::new(Downsampler::new(&config))),
            std::cmp::Ordering::Equal => Engine::Passthrough,
        };

        let delay = match &engine {
            Engine::Passthrough => 0,
            Engine::Up(up) => up.group_delay(),
            Engine::Down(down) => down.group_delay(),
        };

        Ok(Self {
            nch: config.nch,
            sfrq: config.sfrq,
            dfrq: config.dfrq,
            engine,
            input: Buffer::new(),
            output: Buffer::new(),
            delay,
            staging: Vec::new(),
        })
    }

    /// Appends interleaved f64le input bytes and converts whole blocks.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.input.write(bytes);
        self.pump(false)
    }

    /// Flushes the remaining input after the last [`write`](Self::write).
    pub fn finish(&mut self) -> Result<()> {
        self.pump(true)
    }

    /// Moves up to `out.len()` converted bytes into `out`; returns the count.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.output.len());
        out[..n].copy_from_slice(&self.output.as_slice()[..n]);
        self.output.read(n);

        n
    }

    /// Converted bytes waiting to be read.
    pub fn pending(&self) -> usize {
        self.output.len()
    }

    /// Audio currently held in the input and output buffers, in
    /// milliseconds.
    pub fn latency_ms(&self) -> u64 {
        let in_samples = (self.input.len() / (BYTES_PER_SAMPLE * self.nch)) as u64;
        let out_samples = (self.output.len() / (BYTES_PER_SAMPLE * self.nch)) as u64;

        in_samples * 1000 / self.sfrq as u64 + out_samples * 1000 / self.dfrq as u64
    }

    fn pump(&mut self, ending: bool) -> Result<()> {
        let Self {
            engine,
            input,
            output,
            delay,
            staging,
            ..
        } = self;

        let mut done = 0;

        loop {
            let src = &input.as_slice()[done..];

            let consumed = match engine {
                Engine::Passthrough => {
                    output.write(src);
                    src.len()
                }
                Engine::Up(up) => {
                    let consumed = up.resample(src, ending, staging)?;
                    Self::emit(output, delay, staging);
                    consumed
                }
                Engine::Down(down) => {
                    let consumed = down.resample(src, ending, staging)?;
                    Self::emit(output, delay, staging);
                    consumed
                }
            };

            done += consumed;

            if consumed == 0 || done >= input.len() {
                break;
            }
        }

        input.read(done);

        Ok(())
    }

    /// Delivers staged samples, swallowing the leading group delay.
    fn emit(output: &mut Buffer, delay: &mut usize, staging: &[f64]) {
        let skip = (*delay).min(staging.len());
        *delay -= skip;

        for sample in &staging[skip..] {
            output.write(&sample.to_le_bytes());
        }
    }
}
