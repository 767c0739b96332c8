//! Error types for resampler construction.

#[derive(thiserror::Error, Debug)]
pub enum SsrcError {
    #[error(
        "Resampling from {sfrq} Hz to {dfrq} Hz is not supported: \
         reduced ratio {ratio} must be 1 or divisible by 2 or 3"
    )]
    UnsupportedRatePair {
        sfrq: usize,
        dfrq: usize,
        ratio: usize,
    },
}
