use crate::{partial::PartialDelegations, snapshot::SnapshotHistory, Account, PowerKind};
use std::collections::HashMap;

/// Every table the ledger keeps for a single power kind.
///
/// The number of snapshots of an account is the length of its history.
#[derive(Clone, Debug, Default)]
pub struct LedgerTables {
    pub snapshots: HashMap<Account, SnapshotHistory>,
    /// Full delegations. A missing entry means the account delegates to itself.
    pub delegatees: HashMap<Account, Account>,
    /// Only accounts with at least one partial delegation have an entry.
    pub partial: HashMap<Account, PartialDelegations>,
}

impl LedgerTables {
    pub fn snapshots_of(&self, account: &Account) -> Option<&SnapshotHistory> {
        self.snapshots.get(account)
    }

    pub fn delegatee_of(&self, account: &Account) -> Account {
        self.delegatees.get(account).copied().unwrap_or(*account)
    }

    pub fn partial_of(&self, account: &Account) -> Option<&PartialDelegations> {
        self.partial.get(account)
    }
}

/// Backing storage of a [`crate::PowerLedger`].
pub trait PowerStore {
    fn tables(&self, kind: PowerKind) -> &LedgerTables;

    fn tables_mut(&mut self, kind: PowerKind) -> &mut LedgerTables;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    voting: LedgerTables,
    proposition: LedgerTables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PowerStore for MemoryStore {
    fn tables(&self, kind: PowerKind) -> &LedgerTables {
        match kind {
            PowerKind::Voting => &self.voting,
            PowerKind::Proposition => &self.proposition,
        }
    }

    fn tables_mut(&mut self, kind: PowerKind) -> &mut LedgerTables {
        match kind {
            PowerKind::Voting => &mut self.voting,
            PowerKind::Proposition => &mut self.proposition,
        }
    }
}

impl<T: PowerStore + ?Sized> PowerStore for &mut T {
    fn tables(&self, kind: PowerKind) -> &LedgerTables {
        (**self).tables(kind)
    }

    fn tables_mut(&mut self, kind: PowerKind) -> &mut LedgerTables {
        (**self).tables_mut(kind)
    }
}
