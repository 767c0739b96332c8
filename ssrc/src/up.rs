//! Upsampling pipeline: polyphase interpolation, then FFT low-pass.
//!
//! Stage 1 raises the rate to `fs1 = sfrq / gcd * dfrq` with a short
//! time-domain polyphase filter whose phase tables (`f1order`/`f1inc`)
//! select the coefficient row and the input advance per output sample.
//! Stage 2 runs a long Kaiser-sinc low-pass as an FFT overlap-add
//! convolution, decimates by the oversampling factor, and carries the block
//! tail in `buf1`.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::ResamplerConfig;
use crate::design::{alpha, dbesi0, gcd, hn_lpf, kaiser_d, win};

pub(crate) struct Upsampler {
    nch: usize,
    sfrq: usize,
    dfrq: usize,
    frqgcd: usize,
    osf: usize,
    fs1: usize,

    n1x: usize,
    n1y: usize,
    n2b: usize,
    n2b2: usize,

    stage1: Vec<Vec<f64>>,
    f1order: Vec<usize>,
    f1inc: Vec<usize>,

    /// Forward spectrum of the stage-2 taps, prescaled by `1 / n2b` so the
    /// inverse transform lands at unit gain.
    stage2: Vec<Complex<f64>>,

    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    spectrum: Vec<Complex<f64>>,
    fft_scratch: Vec<Complex<f64>>,
    ifft_scratch: Vec<Complex<f64>>,

    buf1: Vec<Vec<f64>>,
    buf2: Vec<Vec<f64>>,
    inbuf: Vec<f64>,
    outbuf: Vec<f64>,

    inbuflen: usize,
    rp: i64,
    s1p: usize,
    osc: usize,

    delay: usize,
}

impl Upsampler {
    /// Designs both filter stages for `sfrq < dfrq`. The caller has already
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
        let fs1 = sfrq / frqgcd * dfrq;

        let ratio = fs1 / dfrq;
        let osf = if ratio == 1 {
            1
        } else if ratio % 2 == 0 {
            2
        } else {
            3
        };

        let d = kaiser_d(aa);
        let alp = alpha(aa);
        let iza = dbesi0(alp);

        // Stage 1: short polyphase interpolator up to fs1.
        let guard = 2.0;
        let df1 = (dfrq * osf / 2 - sfrq / 2) as f64 * 2.0 / guard;
        let lpf1 = (sfrq / 2) as f64 + (dfrq * osf / 2 - sfrq / 2) as f64 / guard;

        let mut n1 = (fs1 as f64 / df1 * d + 1.0) as usize;
        if n1 % 2 == 0 {
            n1 += 1;
        }

        let n1y = fs1 / sfrq;
        let n1x = n1 / n1y + 1;

        let phase_step = fs1 / (dfrq * osf);
        let phases = n1y * osf;

        let mut f1order = vec![0usize; phases];
        for (i, order) in f1order.iter_mut().enumerate() {
            let o = n1y - (i * phase_step) % n1y;
            *order = if o == n1y { 0 } else { o };
        }

        let f1inc: Vec<usize> = f1order
            .iter()
            .map(|&order| usize::from(order < phase_step))
            .collect();

        let mut stage1 = vec![vec![0.0f64; n1x]; n1y];
        let half1 = (n1 / 2) as i64;
        for i in -half1..=half1 {
            let idx = (i + half1) as usize;
            stage1[idx % n1y][idx / n1y] =
                win(i as f64, n1, alp, iza) * hn_lpf(i as f64, lpf1, fs1 as f64) * n1y as f64;
        }

        // Stage 2: long FFT low-pass at fs2, grown until the transition
        // band fits under the requested width.
        let fs2 = dfrq * osf;

        let mut n2;
        let mut scale = 1;
        loop {
            n2 = fftfirlen * scale;
            if n2 % 2 == 0 {
                n2 -= 1;
            }

            let df2 = fs2 as f64 * d / (n2 - 1) as f64;
            if df2 < df {
                break;
            }

            scale *= 2;
        }

        let lpf2 = (sfrq / 2) as f64;

        let mut n2b = 1;
        while n2b < n2 {
            n2b <<= 1;
        }
        n2b <<= 1;
        let n2b2 = n2b / 2;

        let mut taps = vec![0.0f64; n2b];
        let half2 = (n2 / 2) as i64;
        for i in -half2..=half2 {
            taps[(i + half2) as usize] =
                win(i as f64, n2, alp, iza) * hn_lpf(i as f64, lpf2, fs2 as f64);
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(n2b);
        let c2r = planner.plan_fft_inverse(n2b);

        let mut stage2 = r2c.make_output_vec();
        let mut fft_scratch = r2c.make_scratch_vec();
        let ifft_scratch = c2r.make_scratch_vec();

        // Length mismatches are impossible for vectors made by the planner.
        let _ = r2c.process_with_scratch(&mut taps, &mut stage2, &mut fft_scratch);
        for h in stage2.iter_mut() {
            *h /= n2b as f64;
        }

        let spectrum = r2c.make_output_vec();

        let buf1 = vec![vec![0.0f64; n2b2 / osf + 1]; nch];
        let buf2 = vec![vec![0.0f64; n2b]; nch];
        let inbuf = vec![0.0f64; nch * (n2b2 + n1x)];
        let outbuf = vec![0.0f64; nch * (n2b2 / osf + 1)];

        // The leading zeros absorb the stage-1 group delay; the stage-2
        // delay is swallowed by the output-side counter.
        let inbuflen = n1 / 2 / n1y + 1;
        let delay = (n2 as f64 / 2.0 / (fs2 as f64 / dfrq as f64)) as usize * nch;

        debug!(
            "upsampler {sfrq} -> {dfrq} Hz: osf = {osf}, stage 1 {n1} taps \
             ({n1y} phases), stage 2 {n2} taps ({n2b}-point FFT)"
        );

        Self {
            nch,
            sfrq,
            dfrq,
            frqgcd,
            osf,
            fs1,
            n1x,
            n1y,
            n2b,
            n2b2,
            stage1,
            f1order,
            f1inc,
            stage2,
            r2c,
            c2r,
            spectrum,
            fft_scratch,
            ifft_scratch,
            buf1,
            buf2,
            inbuf,
            outbuf,
            inbuflen,
            rp: 0,
            s1p: 0,
            osc: 0,
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
        let (osf, n2b, n2b2) = (self.osf, self.n2b, self.n2b2);

        let toberead = (self.n2b2 as f64 * self.sfrq as f64 / (self.dfrq * self.osf) as f64)
            .floor() as isize
            + 1
            + self.n1x as isize
            - self.inbuflen as isize;
        let toberead = toberead.max(0) as usize;

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

        let base = self.inbuflen * nch;
        for (k, chunk) in input[..consumed].chunks_exact(8).enumerate() {
            self.inbuf[base + k] = f64::from_le_bytes(chunk.try_into()?);
        }
        for v in self.inbuf[base + nsmplread * nch..base + toberead * nch].iter_mut() {
            *v = 0.0;
        }

        self.inbuflen += toberead;

        let nsmplwrt1 = n2b2;

        let ip_base =
            ((self.sfrq as i64 * (self.rp - 1) + self.fs1 as i64) / self.fs1 as i64) as usize * nch;

        let phases = self.n1y * osf;
        let s1p_backup = self.s1p;
        let osc_backup = self.osc;

        let mut nsmplwrt2 = 0;

        for ch in 0..nch {
            let mut s1p = s1p_backup;
            let mut ip = ip_base + ch;

            let buf2ch = &mut self.buf2[ch];

            for sample in buf2ch[..nsmplwrt1].iter_mut() {
                let taps = &self.stage1[self.f1order[s1p]];

                let mut acc = 0.0;
                let mut ip2 = ip;
                for tap in taps.iter() {
                    acc += tap * self.inbuf[ip2];
                    ip2 += nch;
                }

                *sample = acc;

                ip += self.f1inc[s1p] * nch;
                s1p += 1;
                if s1p == phases {
                    s1p = 0;
                }
            }

            self.s1p = s1p;

            for sample in buf2ch[nsmplwrt1..n2b].iter_mut() {
                *sample = 0.0;
            }

            self.r2c
                .process_with_scratch(buf2ch, &mut self.spectrum, &mut self.fft_scratch)?;

            for (bin, h) in self.spectrum.iter_mut().zip(self.stage2.iter()) {
                *bin *= *h;
            }

            self.c2r
                .process_with_scratch(&mut self.spectrum, buf2ch, &mut self.ifft_scratch)?;

            // Decimate by osf, overlap-adding the previous block's tail.
            let mut i = osc_backup;
            let mut j = 0;
            while i < n2b2 {
                self.outbuf[j * nch + ch] = self.buf1[ch][j] + buf2ch[i];
                i += osf;
                j += 1;
            }

            nsmplwrt2 = j;
            self.osc = i - n2b2;

            let mut j = 0;
            while i < n2b {
                self.buf1[ch][j] = buf2ch[i];
                i += osf;
                j += 1;
            }
        }

        self.rp += (nsmplwrt1 * (self.sfrq / self.frqgcd) / osf) as i64;

        out.extend_from_slice(&self.outbuf[..nsmplwrt2 * nch]);

        // Drop the consumed head of the input window.
        let ds = ((self.rp - 1) / self.n1y as i64) as usize;
        let keep = self.inbuflen - ds;

        self.inbuf.copy_within(nch * ds..nch * self.inbuflen, 0);
        self.inbuflen = keep;
        self.rp -= (ds * self.n1y) as i64;

        Ok(consumed)
    }
}
