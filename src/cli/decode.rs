use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use log::{info, warn};

use mlp::process::decode::{DecodeOutput, Decoder, DecoderConfig, PcmFormat};

use crate::cli::command::{Cli, DecodeArgs, PcmLayout};

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli) -> Result<()> {
    let stream = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("pcm"));
    let mut output = fs::File::create(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;

    let pcm_format = match args.format {
        PcmLayout::S16 => PcmFormat::S16,
        PcmLayout::S24In32 => PcmFormat::S32,
    };

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format,
        request_channels: args.channels,
    });

    if cli.strict {
        decoder.set_fail_level(log::Level::Warn);
    }

    let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];
    let mut offset = 0;
    let mut units = 0u64;

    while offset < stream.len() {
        match decoder.read_access_unit(&stream[offset..], &mut pcm)? {
            DecodeOutput::NeedMore => {
                if stream.len() - offset > 1 {
                    warn!("Trailing {} bytes ignored", stream.len() - offset);
                }
                break;
            }
            DecodeOutput::Unit {
                bytes_consumed,
                pcm_len,
            } => {
                output.write_all(&pcm[..pcm_len])?;
                offset += bytes_consumed;
                units += 1;
            }
        }
    }

    info!(
        "Decoded {units} access units: {} Hz, {} channels -> {}",
        decoder.sample_rate(),
        decoder.channels(),
        output_path.display()
    );

    Ok(())
}
