//! Integration tests for aidmm-bot.
//!
//! These tests drive a whole `Application` against mock collaborators:
//! - Direct submission of reconciled actions
//! - Guard suppression while an action is in flight
//! - Batched submission across makers
//! - Fill offloading after block seal

pub mod common;
