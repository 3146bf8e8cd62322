//! Domain layer: entities, errors and the pure segment rules.

pub mod calendar;
pub mod entities;
pub mod errors;
pub mod position;
