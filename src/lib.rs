#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::op_ref
)]

//! Deviation finding between two line networks of the same area: a reference
//! network and a candidate network. The networks are harmonized so that both
//! are split at corresponding places, then matched segment by segment.

pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod harmonize;
pub mod ingest;
pub mod job;
pub mod matching;
pub mod progress;
pub mod results;
pub mod store;
pub mod validation;

pub use error::{DeviationError, Result};

#[cfg(test)]
mod pipeline_tests;
