//! Lane-parallel bytecode interpreter over the sift document format.
//!
//! Queries compiled to bytecode are evaluated in [`reg::LANE_COUNT`]
//! parallel lanes over a read-only buffer of encoded documents. The
//! crate provides the register files, the opcode set and its dispatch
//! loop, the scratch arena, and the row drivers (filter, project,
//! splat, dedup, aggregate) that own the batching protocol.
//!
//! A [`bytecode::Bytecode`] instance is single-threaded; parallel scans
//! clone the compiled image per worker and share only the atomic
//! aggregation state.

pub mod aggtable;
pub mod assembler;
pub mod bytecode;
pub mod dfa;
pub mod hll;
pub mod interp;
pub mod ops;
pub mod radix;
pub mod reg;

mod ops_agg;
mod ops_arith;
mod ops_box;
mod ops_cmp;
mod ops_cmpv;
mod ops_geo;
mod ops_hash;
mod ops_mask;
mod ops_pattern;
mod ops_string;
mod ops_time;
mod ops_value;

pub use aggtable::{AggBuffer, AggHashTable, AggInit};
pub use assembler::{Operand, ProgramBuilder};
pub use bytecode::{BcError, Bytecode, DictEntry, HashSetTable, LitRef, Pattern, VmState};
pub use dfa::DfaProgram;
pub use interp::{
    run_aggregate, run_batch, run_dedup, run_filter, run_project, run_splat, simd_path_label,
    ProjectedField,
};
pub use ops::{Arg, OpInfo, Opcode, Scratch, PAGE_SIZE};
pub use radix::RadixTree64;
pub use reg::{
    lanes, BaseReg, BucketReg, HashReg, LaneMask, MaskReg, ScalarReg, StringReg, ValueReg,
    ALL_LANES, LANE_COUNT, SCRATCH_BASE,
};
