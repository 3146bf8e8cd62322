//! # Revisable Lifecycle
//!
//! Every entitlement entity is removed by stamping `deleted_at` and restored by
//! clearing it. `Revisable` is the single place that convention is expressed.

use crate::entities::Timestamp;
use serde::{Deserialize, Serialize};

/// Lifecycle status derived from the nullable `deleted_at` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// `deleted_at IS NULL`.
    Active,
    /// `deleted_at` is set.
    SoftDeleted { at: Timestamp },
}

impl Lifecycle {
    pub fn from_deleted_at(deleted_at: Option<Timestamp>) -> Self {
        match deleted_at {
            Some(at) => Lifecycle::SoftDeleted { at },
            None => Lifecycle::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// An entity following the soft-delete/revert convention.
pub trait Revisable {
    fn deleted_at(&self) -> Option<Timestamp>;

    fn set_deleted_at(&mut self, deleted_at: Option<Timestamp>);

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_deleted_at(self.deleted_at())
    }

    fn is_active(&self) -> bool {
        self.deleted_at().is_none()
    }

    /// Mark the entity deleted. Already-deleted entities keep their original stamp.
    fn soft_delete(&mut self, at: Timestamp) {
        if self.deleted_at().is_none() {
            self.set_deleted_at(Some(at));
        }
    }

    /// Clear the deletion stamp unconditionally.
    fn revert(&mut self) {
        self.set_deleted_at(None);
    }
}
