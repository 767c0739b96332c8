//! End-to-end decoder tests over synthesized access units.
//!
//! The builder below assembles bit-exact access units (major sync, restart
//! headers, decoding parameters, block data, integrity trailers) so every
//! scenario runs through the public API only.

use mlp::process::decode::{DecodeOutput, Decoder, DecoderConfig, PcmFormat};

/// Big-endian bit writer with read-back for checksum computation.
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bitpos: usize,
}

impl BitWriter {
    fn put(&mut self, value: u64, bits: u32) {
        for i in (0..bits).rev() {
            let bit = ((value >> i) & 1) as u8;
            if self.bitpos % 8 == 0 {
                self.bytes.push(0);
            }
            let byte = self.bytes.last_mut().unwrap();
            *byte |= bit << (7 - (self.bitpos % 8));
            self.bitpos += 1;
        }
    }

    fn put_s(&mut self, value: i64, bits: u32) {
        self.put((value as u64) & ((1u64 << bits) - 1), bits);
    }

    fn align_16(&mut self) {
        while self.bitpos % 16 != 0 {
            self.put(0, 1);
        }
    }

    fn bit(&self, pos: usize) -> u8 {
        (self.bytes[pos / 8] >> (7 - (pos % 8))) & 1
    }

    /// Bit-serial CRC with generator 0x11D over a bit window.
    fn restart_crc(&self, start: usize, end: usize) -> u8 {
        let mut crc = 0u8;
        for pos in start..end {
            crc = (crc << 1) ^ (((crc >> 7) & 1) * 0x1D) ^ self.bit(pos);
        }
        crc
    }
}

fn crc8_advance(poly: u8, mut value: u8, bits: usize) -> u8 {
    for _ in 0..bits {
        value = (value << 1) ^ (((value >> 7) & 1) * poly);
    }
    value
}

fn crc16_advance(poly: u16, mut value: u16, bits: usize) -> u16 {
    for _ in 0..bits {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
    }
    value
}

/// Substream checksum: lookup-then-XOR CRC-8, poly 0x63, init 0xA2.
fn substream_checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0xA2u8, |crc, &b| crc8_advance(0x63, crc, 8) ^ b)
}

/// Major sync checksum: lookup-then-XOR CRC-16, poly 0x2D, zero init.
fn major_sync_crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, &b| {
        crc16_advance(0x2D, crc >> 8 << 8, 8) ^ (crc << 8) ^ b as u16
    })
}

/// 28-byte FBA major sync for 48 kHz, 24-bit, `num_substreams` substreams.
fn build_major_sync(num_substreams: u64) -> Vec<u8> {
    let mut w = BitWriter::default();

    w.put(0xF872_6FBA, 32);
    // format_info: ratebits 0 (48 kHz), all channel fields zero.
    w.put(0, 4);
    w.put(0, 28);
    w.put(0xB752, 16);
    w.put(0, 16); // flags
    w.put(0, 16); // reserved
    w.put(0, 1); // variable_rate
    w.put(0, 15); // peak_data_rate
    w.put(num_substreams, 4);
    w.put(0, 2);
    w.put(0, 2); // extended_substream_info
    w.put(0, 8); // substream_info
    w.put(0, 64); // channel_meaning

    let crc = major_sync_crc(&w.bytes);
    w.put(crc as u64, 16);

    w.bytes
}

struct RestartSpec {
    sync_word: u64,
    max_channel: usize,
    max_matrix_channel: usize,
    noisegen_seed: u64,
    lossless_check: u8,
}

impl Default for RestartSpec {
    fn default() -> Self {
        Self {
            sync_word: 0x31EA,
            max_channel: 0,
            max_matrix_channel: 0,
            noisegen_seed: 0,
            lossless_check: 0,
        }
    }
}

fn write_restart_header(w: &mut BitWriter, spec: &RestartSpec) {
    let start = w.bitpos;

    w.put(spec.sync_word, 14);
    w.put(0, 16); // output timestamp
    w.put(0, 4); // min_channel
    w.put(spec.max_channel as u64, 4);
    w.put(spec.max_matrix_channel as u64, 4);
    w.put(0, 4); // noise_shift
    w.put(spec.noisegen_seed, 23);
    w.put(0, 19);
    w.put(0, 1); // data_check_present
    w.put(spec.lossless_check as u64, 8);
    w.put(0, 16);

    // Identity channel assignment.
    for ch in 0..=spec.max_matrix_channel {
        w.put(ch as u64, 6);
    }

    let crc = w.restart_crc(start, w.bitpos);
    w.put(crc as u64, 8);
}

/// Writes a decoding-parameter block where every section is absent.
fn write_empty_params(w: &mut BitWriter, channels: usize) {
    w.put(0, 1); // presence flags unchanged
    w.put(0, 1); // blocksize
    w.put(0, 1); // matrices
    w.put(0, 1); // output shifts
    w.put(0, 1); // quant step sizes
    for _ in 0..channels {
        w.put(0, 1); // params_for_this_chan
    }
}

/// Raw 24-bit sample under the default parameters (codebook 0, 24 LSBs).
fn write_raw_sample(w: &mut BitWriter, sample: i32) {
    w.put((sample + (1 << 23)) as u64, 24);
}

/// Aligns, optionally appends the parity/checksum trailer, returns bytes.
fn finish_substream(mut w: BitWriter, checkdata: bool) -> Vec<u8> {
    w.align_16();

    if checkdata {
        let parity = w.bytes.iter().fold(0u8, |acc, &b| acc ^ b);
        let checksum = substream_checksum(&w.bytes);
        w.put((parity ^ 0xA9) as u64, 8);
        w.put(checksum as u64, 8);
    }

    w.bytes
}

/// Assembles header + optional major sync + directory + one substream.
fn build_access_unit(major_sync: bool, substream: &[u8], checkdata: bool) -> Vec<u8> {
    assert_eq!(substream.len() % 2, 0);

    let ms = if major_sync {
        build_major_sync(1)
    } else {
        Vec::new()
    };

    let substream_words = substream.len() / 2;
    let length_words = 2 + ms.len() / 2 + 1 + substream_words;

    let mut w = BitWriter::default();
    w.put(0, 4); // check nibble
    w.put(length_words as u64, 12);
    w.put(0, 16); // input timing

    w.bytes.extend_from_slice(&ms);
    w.bitpos += ms.len() * 8;

    // Directory entry: no extra word, optional checkdata.
    w.put(0, 1);
    w.put(0, 1);
    w.put(u64::from(checkdata), 1);
    w.put(0, 1);
    w.put(substream_words as u64, 12);

    w.bytes.extend_from_slice(substream);

    w.bytes
}

fn decode_units(decoder: &mut Decoder, stream: &[u8]) -> Vec<Vec<u8>> {
    let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];
    let mut units = Vec::new();
    let mut offset = 0;

    while offset < stream.len() {
        match decoder.read_access_unit(&stream[offset..], &mut pcm).unwrap() {
            DecodeOutput::NeedMore => break,
            DecodeOutput::Unit {
                bytes_consumed,
                pcm_len,
            } => {
                units.push(pcm[..pcm_len].to_vec());
                offset += bytes_consumed;
            }
        }
    }

    units
}

fn as_i32(pcm: &[u8]) -> Vec<i32> {
    pcm.chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

fn as_i16(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// Folds the running lossless check the way a restart header validates it.
fn lossless_fold(samples: &[[i32; 2]]) -> u8 {
    let mut check = 0u32;
    for row in samples {
        for (ch, &s) in row.iter().enumerate() {
            check ^= (s as u32 & 0xFFFFFF) << ch;
        }
    }

    check ^= check >> 16;
    check ^= check >> 8;
    (check & 0xFF) as u8
}

#[test]
fn raw_pcm_pass_through_16_and_32_bit() {
    let samples: [[i32; 2]; 8] = [
        [256, 2560],
        [-256, -2560],
        [512, 5120],
        [-512, -5120],
        [768, 7680],
        [-768, -7680],
        [1024, 10240],
        [-1024, -10240],
    ];

    let build_au = |major_sync: bool, lossless_check: u8| {
        let mut w = BitWriter::default();
        w.put(1, 1); // params present
        w.put(1, 1); // restart present
        write_restart_header(
            &mut w,
            &RestartSpec {
                max_channel: 1,
                max_matrix_channel: 1,
                lossless_check,
                ..Default::default()
            },
        );
        write_empty_params(&mut w, 2);

        for row in &samples {
            for &s in row {
                write_raw_sample(&mut w, s);
            }
        }

        w.put(1, 1); // last block in unit
        build_access_unit(major_sync, &finish_substream(w, true), true)
    };

    // The second unit's restart header validates the first unit's output.
    let mut stream = build_au(true, 0);
    stream.extend_from_slice(&build_au(false, lossless_fold(&samples)));

    // 32-bit output: samples shifted into the top 24 bits.
    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    assert_eq!(units.len(), 2);
    assert_eq!(decoder.sample_rate(), 48_000);
    assert_eq!(decoder.channels(), 2);

    for unit in &units {
        let out = as_i32(unit);
        assert_eq!(out.len(), 16);
        for (i, row) in samples.iter().enumerate() {
            assert_eq!(out[2 * i], row[0] << 8);
            assert_eq!(out[2 * i + 1], row[1] << 8);
        }
    }

    // 16-bit output: low 8 bits dropped.
    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S16,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i16(&units[0]);
    for (i, row) in samples.iter().enumerate() {
        assert_eq!(out[2 * i], (row[0] >> 8) as i16);
        assert_eq!(out[2 * i + 1], (row[1] >> 8) as i16);
    }
}

#[test]
fn huffman_residuals_decode_to_advertised_range() {
    // Codebook 1 codes for the residuals below.
    let coded: [(i32, u64, u32); 8] = [
        (-7, 0x01, 9),
        (-3, 0x01, 5),
        (0, 0x04, 3),
        (3, 0x07, 3),
        (7, 0x11, 6),
        (10, 0x81, 9),
        (-1, 0x01, 3),
        (5, 0x05, 4),
    ];

    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(&mut w, &RestartSpec::default());

    // Decoding params: only the channel section, switching to codebook 1
    // with no LSBs and a +2 Huffman offset that cancels the sign bias.
    w.put(0, 1); // presence flags unchanged
    w.put(0, 1); // blocksize
    w.put(0, 1); // matrices
    w.put(0, 1); // output shifts
    w.put(0, 1); // quant step sizes
    w.put(1, 1); // params for channel 0
    w.put(0, 1); // FIR absent
    w.put(0, 1); // IIR absent
    w.put(1, 1); // huff offset present
    w.put_s(2, 15);
    w.put(1, 2); // codebook 1
    w.put(0, 5); // huff_lsbs 0

    for &(_, code, bits) in &coded {
        w.put(code, bits);
    }

    w.put(1, 1);

    let stream = build_access_unit(true, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i32(&units[0]);

    let expected: Vec<i32> = coded.iter().map(|&(r, _, _)| r << 8).collect();
    assert_eq!(out, expected);
}

#[test]
fn fir_filter_integrates_residual_impulse() {
    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(&mut w, &RestartSpec::default());

    w.put(0, 1); // presence flags unchanged
    w.put(0, 1); // blocksize
    w.put(0, 1); // matrices
    w.put(0, 1); // output shifts
    w.put(0, 1); // quant step sizes
    w.put(1, 1); // params for channel 0
    w.put(1, 1); // FIR present
    w.put(1, 4); // order 1
    w.put(14, 4); // coeff_q
    w.put(16, 5); // coeff_bits
    w.put(0, 3); // coeff_shift
    w.put_s(1 << 14, 16); // unit tap
    w.put(0, 1); // no state preset
    w.put(0, 1); // IIR absent
    w.put(0, 1); // huff offset absent
    w.put(0, 2); // codebook 0
    w.put(24, 5); // huff_lsbs 24

    for &residual in &[100, 0, 0, 0, 0, 0, 0, 0] {
        write_raw_sample(&mut w, residual);
    }

    w.put(1, 1);

    let stream = build_access_unit(true, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i32(&units[0]);

    assert_eq!(out, vec![100 << 8; 8]);
}

#[test]
fn primitive_matrix_rewrites_destination_channel() {
    let ch1: [i32; 8] = [1000, -1000, 2000, -2000, 3000, -3000, 4000, -4000];

    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(
        &mut w,
        &RestartSpec {
            max_channel: 1,
            max_matrix_channel: 1,
            ..Default::default()
        },
    );

    w.put(0, 1); // presence flags unchanged
    w.put(0, 1); // blocksize
    w.put(1, 1); // matrices present
    w.put(1, 4); // one matrix
    w.put(0, 4); // destination channel 0
    w.put(14, 4); // frac_bits
    w.put(0, 1); // no lsb bypass
    w.put(0, 1); // coeff for source 0 absent
    w.put(1, 1); // coeff for source 1 present
    w.put_s(1 << 14, 16); // unit coefficient in 2.14
    w.put(0, 1); // noise channel 1 absent
    w.put(0, 1); // noise channel 2 absent
    w.put(0, 1); // output shifts
    w.put(0, 1); // quant step sizes
    w.put(0, 1); // params for channel 0
    w.put(0, 1); // params for channel 1

    for (i, &s) in ch1.iter().enumerate() {
        write_raw_sample(&mut w, 77 + i as i32); // overwritten by the matrix
        write_raw_sample(&mut w, s);
    }

    w.put(1, 1);

    let stream = build_access_unit(true, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i32(&units[0]);

    for (i, &s) in ch1.iter().enumerate() {
        assert_eq!(out[2 * i], s << 8, "rematrixed channel, sample {i}");
        assert_eq!(out[2 * i + 1], s << 8, "source channel, sample {i}");
    }
}

#[test]
fn variant_b_matrix_adds_table_noise() {
    let samples: [i32; 8] = [1000, -1000, 2000, -2000, 3000, -3000, 4000, -4000];
    let seed = 0x123456u32;

    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(
        &mut w,
        &RestartSpec {
            sync_word: 0x31EB,
            noisegen_seed: seed as u64,
            ..Default::default()
        },
    );

    w.put(0, 1); // presence flags unchanged
    w.put(0, 1); // blocksize
    w.put(1, 1); // matrices present
    w.put(1, 4); // one matrix
    w.put(0, 4); // destination channel 0
    w.put(14, 4); // frac_bits
    w.put(0, 1); // no lsb bypass
    w.put(1, 1); // coeff for source 0 present
    w.put_s(1 << 14, 16); // unit coefficient in 2.14
    w.put(1, 4); // matrix_noise_shift 1
    w.put(0, 1); // output shifts
    w.put(0, 1); // quant step sizes
    w.put(0, 1); // params for channel 0

    for &s in &samples {
        write_raw_sample(&mut w, s);
    }

    w.put(1, 1);

    let stream = build_access_unit(true, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i32(&units[0]);

    // Replicate the dither injection: the noise buffer spans the unit's
    // power-of-two size (64 at 48 kHz) and each matrix row reads it at
    // (i * (2k + 1) + k) & 63 for k = matrices - index.
    let mut noise = [0i8; 64];
    let mut noise_seed = seed;
    mlp::utils::noise::fill_noise_31eb(&mut noise, &mut noise_seed);

    for (i, &s) in samples.iter().enumerate() {
        let idx = (3 * i + 1) & 63;
        let accum = (s as i64) * (1 << 14) + ((noise[idx] as i64) << 8);
        let expected = (accum >> 14) as i32;

        assert_eq!(out[i], expected << 8, "sample {i}");
    }
}

#[test]
fn end_of_stream_marker_shortens_output() {
    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(&mut w, &RestartSpec::default());
    write_empty_params(&mut w, 1);

    for s in 0..8 {
        write_raw_sample(&mut w, 100 + s);
    }

    w.put(1, 1);
    w.align_16();

    // End-of-stream marker with shorten_by = 4.
    w.put(0x348D3, 18);
    w.put(1, 1);
    w.put(4, 13);

    let stream = build_access_unit(true, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let out = as_i32(&units[0]);

    assert_eq!(out, vec![100 << 8, 101 << 8, 102 << 8, 103 << 8]);
}

#[test]
fn random_raw_streams_survive_many_units() {
    let mut state = 0xDEADBEEFu32;
    let mut next = move || {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        ((state >> 8) as i32 & 0xFFFFF) - (1 << 19)
    };

    let mut stream = Vec::new();
    let mut expected = Vec::new();

    for unit in 0..3 {
        let mut w = BitWriter::default();
        w.put(1, 1);
        w.put(u64::from(unit == 0), 1);

        if unit == 0 {
            write_restart_header(
                &mut w,
                &RestartSpec {
                    max_channel: 1,
                    max_matrix_channel: 1,
                    ..Default::default()
                },
            );
        }

        write_empty_params(&mut w, 2);

        for _ in 0..8 {
            for _ in 0..2 {
                let s = next();
                write_raw_sample(&mut w, s);
                expected.push(s << 8);
            }
        }

        w.put(1, 1);
        stream.extend_from_slice(&build_access_unit(unit == 0, &finish_substream(w, true), true));
    }

    let mut decoder = Decoder::new(DecoderConfig {
        pcm_format: PcmFormat::S32,
        request_channels: None,
    });
    decoder.set_fail_level(log::Level::Warn);

    let units = decode_units(&mut decoder, &stream);
    let decoded: Vec<i32> = units.iter().flat_map(|u| as_i32(u)).collect();

    assert_eq!(decoded, expected);
}

#[test]
fn frame_without_major_sync_is_skipped_until_parameters() {
    let mut w = BitWriter::default();
    w.put(1, 1);
    w.put(1, 1);
    write_restart_header(&mut w, &RestartSpec::default());
    write_empty_params(&mut w, 1);
    for s in 0..8 {
        write_raw_sample(&mut w, s);
    }
    w.put(1, 1);

    // No major sync: the decoder must consume the unit and emit nothing.
    let stream = build_access_unit(false, &finish_substream(w, true), true);

    let mut decoder = Decoder::new(DecoderConfig::default());
    let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];

    match decoder.read_access_unit(&stream, &mut pcm).unwrap() {
        DecodeOutput::Unit {
            bytes_consumed,
            pcm_len,
        } => {
            assert_eq!(bytes_consumed, stream.len());
            assert_eq!(pcm_len, 0);
        }
        other => panic!("unexpected output {other:?}"),
    }
}

#[test]
fn truncated_packet_reports_need_more() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];

    assert_eq!(
        decoder.read_access_unit(&[0x00], &mut pcm).unwrap(),
        DecodeOutput::NeedMore
    );
}

#[test]
fn oversized_length_word_is_fatal() {
    let mut decoder = Decoder::new(DecoderConfig::default());
    let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];

    // Claims 0x400 words but only 4 bytes follow.
    assert!(decoder.read_access_unit(&[0x04, 0x00, 0, 0], &mut pcm).is_err());
}
