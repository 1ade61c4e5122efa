//! Elaboration boundary shared between brokers.
//!
//! The surrounding framework owns the actual lifecycle; it signals the end of
//! elaboration through [`Lifecycle::end_of_elaboration`]. Parameters with the
//! `elaboration_time` mutability class consult it on every write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Elaboration,
    Simulation,
}

#[derive(Debug, Clone, Default)]
pub struct Lifecycle(Arc<AtomicU8>);

const ELABORATION: u8 = 0;
const SIMULATION: u8 = 1;

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.0.load(Ordering::Acquire) {
            ELABORATION => Phase::Elaboration,
            _ => Phase::Simulation,
        }
    }

    /// Signal that elaboration has finished. Idempotent.
    pub fn end_of_elaboration(&self) {
        if self.0.swap(SIMULATION, Ordering::AcqRel) == ELABORATION {
            info!("[LCY] End of elaboration");
        }
    }

    pub fn is_elaboration_closed(&self) -> bool {
        self.phase() != Phase::Elaboration
    }

    /// Whether two handles observe the same boundary.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
