use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use ssrc::{Resampler, ResamplerConfig};

use crate::cli::command::{Cli, ResampleArgs};

const CHUNK_BYTES: usize = 64 * 1024;

pub fn cmd_resample(args: &ResampleArgs, _cli: &Cli) -> Result<()> {
    let input = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("resampled.f64"));
    let mut output = fs::File::create(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;

    let mut resampler = Resampler::new(ResamplerConfig {
        sfrq: args.from,
        dfrq: args.to,
        nch: args.channels,
        aa: args.attenuation,
        df: args.transition,
        fftfirlen: args.fft_len,
    })?;

    let mut out = vec![0u8; CHUNK_BYTES];

    for chunk in input.chunks(CHUNK_BYTES) {
        resampler.write(chunk)?;

        loop {
            let n = resampler.read(&mut out);
            if n == 0 {
                break;
            }
            output.write_all(&out[..n])?;
        }
    }

    resampler.finish()?;

    loop {
        let n = resampler.read(&mut out);
        if n == 0 {
            break;
        }
        output.write_all(&out[..n])?;
    }

    info!(
        "Resampled {} -> {} Hz ({} channels) -> {}",
        args.from,
        args.to,
        args.channels,
        output_path.display()
    );

    Ok(())
}
