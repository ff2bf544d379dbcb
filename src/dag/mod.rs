// src/dag/mod.rs
//! Reconstructing a deterministic conversational history out of an
//! arbitrary branch/merge point in the message DAG.

pub mod engine;
pub mod history;

pub use engine::{build_history, build_sub_dag, topological_sort, DagError, SubDag};
pub use history::{format_history, HistoryMessage};
