//! Per-maker action guards.
//!
//! Each maker has one in-flight slot per `ActionKind`. Acquiring a slot is a
//! compare-and-swap from idle to in-flight and hands out a `GuardPermit`;
//! dropping the permit returns the slot to idle, whether the action
//! succeeded, failed or was abandoned. Different kinds never block each
//! other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aidmm_core::{ActionKind, MakerId};

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    InFlight,
}

/// In-flight slots for one maker.
#[derive(Debug)]
pub struct ActionGuard {
    maker: MakerId,
    slots: [AtomicBool; 3],
}

impl ActionGuard {
    #[must_use]
    pub fn new(maker: MakerId) -> Arc<Self> {
        Arc::new(Self {
            maker,
            slots: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        })
    }

    #[must_use]
    pub fn maker(&self) -> MakerId {
        self.maker
    }

    /// Claim the slot for `kind`, or `None` if one is already in flight.
    pub fn try_acquire(self: &Arc<Self>, kind: ActionKind) -> Option<GuardPermit> {
        self.slots[kind.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit {
                guard: Arc::clone(self),
                kind,
            })
    }

    #[must_use]
    pub fn state(&self, kind: ActionKind) -> GuardState {
        if self.slots[kind.index()].load(Ordering::Acquire) {
            GuardState::InFlight
        } else {
            GuardState::Idle
        }
    }

    fn release(&self, kind: ActionKind) {
        self.slots[kind.index()].store(false, Ordering::Release);
    }
}

/// Exclusive claim on one (maker, kind) slot. Released on drop.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct GuardPermit {
    guard: Arc<ActionGuard>,
    kind: ActionKind,
}

impl GuardPermit {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    #[must_use]
    pub fn maker(&self) -> MakerId {
        self.guard.maker
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.guard.release(self.kind);
    }
}
