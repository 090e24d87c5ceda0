//! Boundary layer over `tictoc-runtime`: a C ABI for non-Rust hosts, plus
//! the error type of the `tictoc` demo binary.

pub mod error;
pub mod ffi;

pub use tictoc_runtime as runtime;
