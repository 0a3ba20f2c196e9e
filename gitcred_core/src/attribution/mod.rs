//! Attribution scoring: converts classified scores into percentage credit.
//!
//! The normalization pipeline is implemented once, as a pure function over an
//! in-memory slice, and both the whole-history aggregate call site and the
//! timeline prefix call site invoke it. Duplicating the math across those two
//! paths is exactly the correctness risk this layout exists to avoid.

pub mod engine;
pub mod models;
pub mod timeline;
