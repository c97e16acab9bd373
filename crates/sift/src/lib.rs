//! Facade crate: re-exports the public surface of the sift workspace.
//!
//! - [`ion`]: the binary document format (TLV codec, symbol tables,
//!   datums, resymbolisation);
//! - [`vm`]: the lane-parallel bytecode interpreter and row drivers;
//! - [`SiftError`] / [`Result`]: the shared error type.

pub use sift_error::{Result, SiftError};

pub mod ion {
    pub use sift_ion::*;
}

pub mod vm {
    pub use sift_vm::*;
}
