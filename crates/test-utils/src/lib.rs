//! Key management and an in-memory ledger for testing.

mod keyring;
mod ledger;

pub use crate::keyring::Keyring;
pub use crate::ledger::Ledger;
