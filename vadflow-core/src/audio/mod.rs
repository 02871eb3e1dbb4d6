//! Audio primitives: the PCM frame type, the sample-count unit, and the
//! input-to-model rate converter.

pub mod frame;
pub mod resample;

pub use frame::{AudioFrame, SampleCount, SampleQueue};
pub use resample::RateConverter;
