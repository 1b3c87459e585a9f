//! Checkpointed voting power ledger with full and partial delegation.
//!
//! Power of each [`PowerKind`] is recorded per account as a history of
//! [`snapshot::Snapshot`]s indexed by height. Accounts may route all of their
//! power to a single delegatee, split part of it across several delegatees,
//! or keep it, but never use full and partial delegation at the same time.
//!
//! The token balances the power derives from are not tracked here: they are
//! read through [`balances::BalanceSource`], and the component owning them must
//! call [`ledger::PowerLedger::on_balance_change`] before every balance change.
//! [`token::GovernanceToken`] is a minimal collaborator doing exactly that.
pub mod account;
pub mod balances;
mod error;
pub mod ledger;
pub mod partial;
pub mod snapshot;
pub mod store;
pub mod token;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use account::Account;
pub use balances::{BalanceSource, Balances};
pub use error::Error;
pub use ledger::{LedgerEvent, PowerLedger};
pub use store::{LedgerTables, MemoryStore, PowerStore};
pub use token::GovernanceToken;

pub type Height = u128;
pub type Power = u128;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PowerKind {
    Voting,
    Proposition,
}

impl PowerKind {
    pub const ALL: [PowerKind; 2] = [PowerKind::Voting, PowerKind::Proposition];
}

impl fmt::Display for PowerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerKind::Voting => f.write_str("voting"),
            PowerKind::Proposition => f.write_str("proposition"),
        }
    }
}

#[cfg(any(test, feature = "proptest"))]
mod arbitrary {
    use super::PowerKind;
    use proptest::prelude::*;

    impl Arbitrary for PowerKind {
        type Parameters = ();
        type Strategy = BoxedStrategy<PowerKind>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            prop_oneof![Just(PowerKind::Voting), Just(PowerKind::Proposition)].boxed()
        }
    }
}
