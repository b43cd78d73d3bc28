//! Assignment and healing engines

mod assignment;
mod healing;

pub use assignment::AssignmentEngine;
pub use healing::{HealingEngine, HealingReport, Removal, Replacement, TeamDeactivationReport};

pub(crate) use healing::heal_user_reviews;
