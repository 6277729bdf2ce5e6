//! Small self-contained utilities.

mod det_rng;

pub use det_rng::DetRng;
