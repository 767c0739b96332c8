//! Downsampling pipeline: FFT low-pass, then polyphase decimation.
//!
//! The mirror of the upsampler. Stage 1 zero-stuffs the input up to
//! `fs1 = sfrq * osf` and low-passes it with a long Kaiser-sinc filter as
//! an FFT overlap-add convolution into `buf2`. Stage 2 walks `buf2` with a
//! short polyphase decimator whose phase tables (`f2order`/`f2inc`) pick
//! one output sample per destination-rate period.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::ResamplerConfig;
use crate::design::{alpha, dbesi0, gcd, hn_lpf, kaiser_d, win};

pub(crate) struct Downsampler {
    nch: usize,
    dfrq: usize,
    osf: usize,
    fs1: usize,
    fs2: usize,

    n1b: usize,
    n1b2: usize,
    n2x: usize,
    n2y: usize,

    /// Forward spectrum of the stage-1 taps, prescaled by `1 / n1b`.
    stage1: Vec<Complex<f64>>,

    stage2: Vec<Vec<f64>>,
    f2order: Vec<usize>,
    f2inc: Vec<usize>,

    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    spectrum: Vec<Complex<f64>>,
    fft_scratch: Vec<Complex<f64>>,
    ifft_scratch: Vec<Complex<f64>>,

    buf1: Vec<Vec<f64>>,
    buf2: Vec<Vec<f64>>,
    inbuf: Vec<f64>,
    outbuf: Vec<f64>,

    rp: i64,
    rps: usize,
    rp2: i64,
    s2p: usize,

    delay: usize,
}

impl Downsampler {
    /// Designs both filter stages for `sfrq > dfrq`. The caller has already
    /// verified the rate pair.
    pub(crate) fn new(config: &ResamplerConfig) -> Self {
        let ResamplerConfig {
            sfrq,
            dfrq,
            nch,
            aa,
            df,
            fftfirlen,
        } = *config;

        let frqgcd = gcd(sfrq, dfrq);

        let ratio = dfrq / frqgcd;
        let osf = if ratio == 1 {
            1
        } else if ratio % 2 == 0 {
            2
        } else {
            3
        };

        let fs1 = sfrq * osf;

        let d = kaiser_d(aa);
        let alp = alpha(aa);
        let iza = dbesi0(alp);

        // Stage 1: long FFT low-pass at fs1, grown until the transition
        // band fits under the requested width.
        let mut n1;
        let mut lpf1;
        let mut scale = 1;
        loop {
            n1 = fftfirlen * scale;
            if n1 % 2 == 0 {
                n1 -= 1;
            }

            let df1 = fs1 as f64 * d / (n1 - 1) as f64;
            lpf1 = (dfrq as f64 - df1) / 2.0;

            if df1 < df {
                break;
            }

            scale *= 2;
        }

        let mut n1b = 1;
        while n1b < n1 {
            n1b <<= 1;
        }
        n1b <<= 1;
        let n1b2 = n1b / 2;

        let mut taps = vec![0.0f64; n1b];
        let half1 = (n1 / 2) as i64;
        for i in -half1..=half1 {
            taps[(i + half1) as usize] =
                win(i as f64, n1, alp, iza) * hn_lpf(i as f64, lpf1, fs1 as f64) * osf as f64;
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n1b);
        let c2r = planner.plan_fft_inverse(n1b);

        let mut stage1 = r2c.make_output_vec();
        let mut fft_scratch = r2c.make_scratch_vec();
        let ifft_scratch = c2r.make_scratch_vec();

        // Length mismatches are impossible for vectors made by the planner.
        let _ = r2c.process_with_scratch(&mut taps, &mut stage1, &mut fft_scratch);
        for h in stage1.iter_mut() {
            *h /= n1b as f64;
        }

        let spectrum = r2c.make_output_vec();

        // Stage 2: short polyphase decimator from fs2 down to dfrq. With
        // osf == 1 the stages already land on the destination grid and the
        // decimator degenerates to a unit tap.
        let fs2 = sfrq / frqgcd * dfrq;

        let n2;
        let n2x;
        let n2y;
        let f2order;
        let mut f2inc;
        let mut stage2;

        if osf == 1 {
            n2 = 1;
            n2x = 1;
            n2y = 1;
            f2order = vec![0usize];
            f2inc = vec![sfrq / dfrq];
            stage2 = vec![vec![1.0f64]];
        } else {
            let guard = 2.0;
            let df2 = (fs1 / 2 - sfrq / 2) as f64 * 2.0 / guard;
            let lpf2 = (sfrq / 2) as f64 + (fs1 / 2 - sfrq / 2) as f64 / guard;

            let mut len = (fs2 as f64 / df2 * d + 1.0) as usize;
            if len % 2 == 0 {
                len += 1;
            }
            n2 = len;

            n2y = fs2 / fs1;
            n2x = n2 / n2y + 1;

            let phase_step = fs2 / dfrq;
            let mut order = vec![0usize; n2y];
            for (i, o) in order.iter_mut().enumerate() {
                let v = n2y - (i * phase_step) % n2y;
                *o = if v == n2y { 0 } else { v };
            }

            f2inc = vec![0usize; n2y];
            for i in 0..n2y {
                f2inc[i] = (phase_step - order[i]) / n2y + 1;
                if order[if i + 1 == n2y { 0 } else { i + 1 }] == 0 {
                    f2inc[i] -= 1;
                }
            }

            f2order = order;

            stage2 = vec![vec![0.0f64; n2x]; n2y];
            let half2 = (n2 / 2) as i64;
            for i in -half2..=half2 {
                let idx = (i + half2) as usize;
                stage2[idx % n2y][idx / n2y] =
                    win(i as f64, n2, alp, iza) * hn_lpf(i as f64, lpf2, fs2 as f64) * n2y as f64;
            }
        }

        let buf1 = vec![vec![0.0f64; n1b]; nch];
        let buf2 = vec![vec![0.0f64; n2x + 1 + n1b2]; nch];
        let inbuf = vec![0.0f64; nch * (n1b2 / osf + osf + 1)];
        let outbuf = vec![0.0f64; nch * (n1b2 * sfrq / dfrq + 1)];

        let delay = (n1 as f64 / 2.0 / (fs1 as f64 / dfrq as f64)
            + n2 as f64 / 2.0 / (fs2 as f64 / dfrq as f64)) as usize
            * nch;

        debug!(
            "downsampler {sfrq} -> {dfrq} Hz: osf = {osf}, stage 1 {n1} taps \
             ({n1b}-point FFT), stage 2 {n2} taps ({n2y} phases)"
        );

        Self {
            nch,
            dfrq,
            osf,
            fs1,
            fs2,
            n1b,
            n1b2,
            n2x,
            n2y,
            stage1,
            stage2,
            f2order,
            f2inc,
            r2c,
            c2r,
            spectrum,
            fft_scratch,
            ifft_scratch,
            buf1,
            buf2,
            inbuf,
            outbuf,
            rp: 0,
            rps: 0,
            rp2: 0,
            s2p: 0,
            delay,
        }
    }

    /// Group delay of the cascade, in interleaved sample counts.
    pub(crate) fn group_delay(&self) -> usize {
        self.delay
    }

    /// Processes one block. Returns the bytes consumed from `input`; zero
    /// means more data is needed. Produced samples are appended to `out`.
    pub(crate) fn resample(&mut self, input: &[u8], ending: bool, out: &mut Vec<f64>) -> Result<usize> {
        out.clear();

        let nch = self.nch;
        let frame_bytes = 8 * nch;
        let (osf, n1b, n1b2, n2x, n2y) = (self.osf, self.n1b, self.n1b2, self.n2x, self.n2y);
        let fs2_fs1 = self.fs2 / self.fs1;
        let fs2_dfrq = self.fs2 / self.dfrq;

        let toberead = (n1b2 - self.rps - 1) / osf + 1;

        let nsmplread;
        let consumed;

        if !ending {
            consumed = frame_bytes * toberead;
            if input.len() < consumed {
                return Ok(0);
            }
            nsmplread = toberead;
        } else {
            nsmplread = (input.len() / frame_bytes).min(toberead);
            consumed = nsmplread * frame_bytes;
        }

        for (k, chunk) in input[..consumed].chunks_exact(8).enumerate() {
            self.inbuf[k] = f64::from_le_bytes(chunk.try_into()?);
        }
        for v in self.inbuf[nsmplread * nch..toberead * nch].iter_mut() {
            *v = 0.0;
        }

        let rps_backup = self.rps;
        let s2p_backup = self.s2p;

        let mut nsmplwrt2 = 0;

        for ch in 0..nch {
            let buf1ch = &mut self.buf1[ch];

            // Zero-stuff the input onto the fs1 grid.
            for v in buf1ch[..rps_backup].iter_mut() {
                *v = 0.0;
            }

            let mut i = rps_backup;
            let mut j = 0;
            while i < n1b2 {
                buf1ch[i] = self.inbuf[j * nch + ch];

                for v in buf1ch[i + 1..i + osf].iter_mut() {
                    *v = 0.0;
                }

                i += osf;
                j += 1;
            }

            for v in buf1ch[n1b2..n1b].iter_mut() {
                *v = 0.0;
            }

            self.rps = i - n1b2;
            self.rp += j as i64;

            self.r2c
                .process_with_scratch(buf1ch, &mut self.spectrum, &mut self.fft_scratch)?;

            for (bin, h) in self.spectrum.iter_mut().zip(self.stage1.iter()) {
                *bin *= *h;
            }

            self.c2r
                .process_with_scratch(&mut self.spectrum, buf1ch, &mut self.ifft_scratch)?;

            // Overlap-add the new block into the decimator window.
            let buf2ch = &mut self.buf2[ch];
            for (acc, &v) in buf2ch[n2x + 1..n2x + 1 + n1b2].iter_mut().zip(buf1ch.iter()) {
                *acc += v;
            }

            let mut bp = {
                let mut t1 = self.rp2 as usize / fs2_fs1;
                if self.rp2 as usize % fs2_fs1 != 0 {
                    t1 += 1;
                }
                t1
            };

            let mut s2p = s2p_backup;
            let mut p = 0;

            while bp < n1b2 + 1 {
                let taps = &self.stage2[self.f2order[s2p]];
                let window = &buf2ch[bp..bp + n2x];

                bp += self.f2inc[s2p];
                s2p += 1;
                if s2p == n2y {
                    s2p = 0;
                }

                let mut acc = 0.0;
                for (tap, v) in taps.iter().zip(window.iter()) {
                    acc += tap * v;
                }

                self.outbuf[p * nch + ch] = acc;
                p += 1;
            }

            nsmplwrt2 = p;
            self.s2p = s2p;
        }

        self.rp2 += (nsmplwrt2 * fs2_dfrq) as i64;

        out.extend_from_slice(&self.outbuf[..nsmplwrt2 * nch]);

        // Slide the decimator window past the consumed span.
        let mut ds = ((self.rp2 - 1) / fs2_fs1 as i64) as usize;
        if ds > n1b2 {
            ds = n1b2;
        }

        for ch in 0..nch {
            self.buf2[ch].copy_within(ds..n2x + 1 + n1b2, 0);
        }

        self.rp2 -= (ds * fs2_fs1) as i64;

        // The second half of each convolution is next block's head.
        for ch in 0..nch {
            self.buf2[ch][n2x + 1..n2x + 1 + n1b2].copy_from_slice(&self.buf1[ch][n1b2..n1b]);
        }

        Ok(consumed)
    }
}
