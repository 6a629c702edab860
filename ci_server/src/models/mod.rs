//! Pipeline manager data models.

pub mod pipeline;
pub mod project;
pub mod record;
pub mod stats;
