//! Workload accounting and least-loaded reviewer selection

mod selector;
mod workload;

pub use selector::{select_least_loaded, select_one_least_loaded};
pub use workload::WorkloadIndex;
