use crate::{Account, Power};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialDelegationEntry {
    pub amount: Power,
    /// Current position of the delegatee in the dense delegatee list.
    pub index: usize,
}

/// Partial delegations of one account for one power kind.
///
/// Delegatees are kept in a dense list so that all of them can be visited, and
/// every entry remembers its slot in that list so that removal is a swap with
/// the last element followed by a pop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialDelegations {
    delegatees: Vec<Account>,
    entries: HashMap<Account, PartialDelegationEntry>,
    total: Power,
}

impl PartialDelegations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_delegated(&self) -> Power {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.delegatees.is_empty()
    }

    pub fn len(&self) -> usize {
        self.delegatees.len()
    }

    pub fn amount_for(&self, delegatee: &Account) -> Power {
        self.entries.get(delegatee).map_or(0, |entry| entry.amount)
    }

    pub fn entry(&self, delegatee: &Account) -> Option<&PartialDelegationEntry> {
        self.entries.get(delegatee)
    }

    /// Delegatees in list order. The order changes on removal.
    pub fn delegatees(&self) -> &[Account] {
        &self.delegatees
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Account, Power)> + '_ {
        self.delegatees
            .iter()
            .map(move |delegatee| (delegatee, self.amount_for(delegatee)))
    }

    /// Sets the amount delegated to `delegatee`, returning the previous one.
    /// Zero removes the delegatee. Callers enforce the balance ceiling.
    pub(crate) fn set(&mut self, delegatee: Account, amount: Power) -> Power {
        let previous = self.amount_for(&delegatee);
        match (previous, amount) {
            (0, 0) => {}
            (previous, 0) => {
                self.remove(&delegatee);
                self.total -= previous;
            }
            (0, amount) => {
                self.entries.insert(
                    delegatee,
                    PartialDelegationEntry {
                        amount,
                        index: self.delegatees.len(),
                    },
                );
                self.delegatees.push(delegatee);
                self.total += amount;
            }
            (previous, amount) => {
                if let Some(entry) = self.entries.get_mut(&delegatee) {
                    entry.amount = amount;
                }
                self.total = self.total - previous + amount;
            }
        }
        previous
    }

    /// Removes the last delegatee of the list.
    pub(crate) fn pop(&mut self) -> Option<(Account, Power)> {
        let delegatee = self.delegatees.pop()?;
        let amount = self
            .entries
            .remove(&delegatee)
            .map_or(0, |entry| entry.amount);
        self.total -= amount;
        Some((delegatee, amount))
    }

    fn remove(&mut self, delegatee: &Account) -> Option<PartialDelegationEntry> {
        let removed = self.entries.remove(delegatee)?;
        self.delegatees.swap_remove(removed.index);
        if let Some(moved) = self.delegatees.get(removed.index) {
            if let Some(entry) = self.entries.get_mut(moved) {
                entry.index = removed.index;
            }
        }
        Some(removed)
    }

    #[cfg(any(test, feature = "test-api"))]
    pub fn assert_consistent(&self) {
        assert_eq!(self.delegatees.len(), self.entries.len());
        for (index, delegatee) in self.delegatees.iter().enumerate() {
            let entry = self.entries[delegatee];
            assert_eq!(entry.index, index, "stale index for {}", delegatee);
            assert!(entry.amount > 0, "zero amount for {}", delegatee);
        }
        assert_eq!(
            self.total,
            self.entries.values().map(|entry| entry.amount).sum::<Power>()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    fn account(i: u8) -> Account {
        Account::new([i; 32])
    }

    #[test]
    fn swap_remove_fixes_moved_index() {
        let mut partial = PartialDelegations::new();
        partial.set(account(1), 10);
        partial.set(account(2), 20);
        partial.set(account(3), 30);

        assert_eq!(partial.set(account(1), 0), 10);
        partial.assert_consistent();
        assert_eq!(partial.delegatees(), &[account(3), account(2)]);
        assert_eq!(partial.amount_for(&account(2)), 20);
        assert_eq!(partial.amount_for(&account(3)), 30);
        assert_eq!(partial.entry(&account(3)).unwrap().index, 0);
        assert_eq!(partial.total_delegated(), 50);

        // the moved delegatee can still be found and removed by id
        assert_eq!(partial.set(account(3), 0), 30);
        partial.assert_consistent();
        assert_eq!(partial.delegatees(), &[account(2)]);
        assert_eq!(partial.total_delegated(), 20);
    }

    #[test]
    fn update_adjusts_total() {
        let mut partial = PartialDelegations::new();
        partial.set(account(1), 10);
        assert_eq!(partial.set(account(1), 4), 10);
        assert_eq!(partial.total_delegated(), 4);
        assert_eq!(partial.set(account(1), 25), 4);
        assert_eq!(partial.total_delegated(), 25);
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn removing_absent_delegatee_is_noop() {
        let mut partial = PartialDelegations::new();
        partial.set(account(1), 10);
        assert_eq!(partial.set(account(2), 0), 0);
        assert_eq!(partial.len(), 1);
        assert_eq!(partial.total_delegated(), 10);
    }

    #[test]
    fn pop_drains_from_the_end() {
        let mut partial = PartialDelegations::new();
        partial.set(account(1), 10);
        partial.set(account(2), 20);
        assert_eq!(partial.pop(), Some((account(2), 20)));
        assert_eq!(partial.pop(), Some((account(1), 10)));
        assert_eq!(partial.pop(), None);
        assert_eq!(partial.total_delegated(), 0);
        assert!(partial.is_empty());
    }

    #[proptest]
    fn stays_consistent(
        #[strategy(proptest::collection::vec((1..8u8, 0..4u128), 0..64))] ops: Vec<(u8, Power)>,
    ) {
        let mut partial = PartialDelegations::new();
        let mut model = std::collections::BTreeMap::new();
        for (delegatee, amount) in ops {
            partial.set(account(delegatee), amount);
            if amount == 0 {
                model.remove(&delegatee);
            } else {
                model.insert(delegatee, amount);
            }
            partial.assert_consistent();
        }
        for (delegatee, amount) in model {
            assert_eq!(partial.amount_for(&account(delegatee)), amount);
        }
    }
}
