use crate::{
    balances::BalanceSource,
    partial::PartialDelegations,
    snapshot::SnapshotHistory,
    store::{MemoryStore, PowerStore},
    Account, Error, Height, Power, PowerKind,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Observable effect of a committed ledger operation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PowerChanged {
        account: Account,
        kind: PowerKind,
        power: Power,
        height: Height,
    },
    DelegateeChanged {
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
    },
    PartialDelegationChanged {
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
        amount: Power,
    },
}

/// Voting and proposition power of every account, with full and partial
/// delegation.
///
/// Every mutating operation is given the current height and the balance
/// source explicitly, runs in its own transaction and either commits all of
/// its writes or none of them.
#[derive(Debug, Default)]
pub struct PowerLedger<S = MemoryStore> {
    store: S,
    last_height: Height,
    events: Vec<LedgerEvent>,
}

impl PowerLedger<MemoryStore> {
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl<S: PowerStore> PowerLedger<S> {
    /// Opens a ledger over `store`, resuming from the highest snapshot it
    /// already holds.
    pub fn new(store: S) -> Self {
        let last_height = PowerKind::ALL
            .into_iter()
            .flat_map(|kind| store.tables(kind).snapshots.values())
            .filter_map(|history| history.last().map(|snapshot| snapshot.height))
            .max()
            .unwrap_or_default();
        Self {
            store,
            last_height,
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Height of the last committed operation.
    pub fn last_height(&self) -> Height {
        self.last_height
    }

    /// Hands over the events committed since the last call.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn delegatee_by_type(&self, delegator: &Account, kind: PowerKind) -> Account {
        self.store.tables(kind).delegatee_of(delegator)
    }

    pub fn partial_delegations(
        &self,
        delegator: &Account,
        kind: PowerKind,
    ) -> Option<&PartialDelegations> {
        self.store.tables(kind).partial_of(delegator)
    }

    pub fn snapshots(&self, account: &Account, kind: PowerKind) -> Option<&SnapshotHistory> {
        self.store.tables(kind).snapshots_of(account)
    }

    /// An account that never took part in a power movement holds exactly its
    /// balance.
    pub fn power_current<B: BalanceSource>(
        &self,
        balances: &B,
        account: &Account,
        kind: PowerKind,
    ) -> Power {
        self.snapshots(account, kind)
            .and_then(SnapshotHistory::last)
            .map_or_else(|| balances.balance_of(account), |snapshot| snapshot.value)
    }

    pub fn power_at_height<B: BalanceSource>(
        &self,
        balances: &B,
        account: &Account,
        height: Height,
        kind: PowerKind,
        now: Height,
    ) -> Result<Power, Error> {
        if height > now {
            return Err(Error::InvalidHeight {
                requested: height,
                current: now,
            });
        }
        Ok(self
            .snapshots(account, kind)
            .and_then(|history| history.value_at(height))
            .unwrap_or_else(|| balances.balance_of(account)))
    }

    /// Supply history is not recorded: this is the current total supply,
    /// whatever the requested height.
    pub fn total_supply_at<B: BalanceSource>(&self, balances: &B, _height: Height) -> Power {
        balances.total_supply()
    }

    /// Fully delegates both power kinds of `delegator` to `delegatee`.
    pub fn delegate<B: BalanceSource>(
        &mut self,
        balances: &B,
        now: Height,
        delegator: Account,
        delegatee: Account,
    ) -> Result<(), Error> {
        self.transact(balances, now, |tx| {
            PowerKind::ALL
                .iter()
                .try_for_each(|kind| tx.set_delegatee(delegator, delegatee, *kind))
        })
    }

    pub fn delegate_by_type<B: BalanceSource>(
        &mut self,
        balances: &B,
        now: Height,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
    ) -> Result<(), Error> {
        self.transact(balances, now, |tx| {
            tx.set_delegatee(delegator, delegatee, kind)
        })
    }

    /// Sets the amount of `kind` power `delegator` lends to `delegatee`.
    /// Zero withdraws the delegation.
    pub fn set_partial_delegation<B: BalanceSource>(
        &mut self,
        balances: &B,
        now: Height,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
        amount: Power,
    ) -> Result<(), Error> {
        self.transact(balances, now, |tx| {
            tx.set_partial(delegator, delegatee, kind, amount)
        })
    }

    pub fn clear_all_partial_delegations<B: BalanceSource>(
        &mut self,
        balances: &B,
        now: Height,
        delegator: Account,
        kind: PowerKind,
    ) -> Result<(), Error> {
        self.transact(balances, now, |tx| tx.clear_partial(delegator, kind))
    }

    /// Must be called by the owner of the balances before it moves `amount`
    /// tokens from `from` to `to`, with `balances` still reflecting the state
    /// prior to the change. The null account stands for minting (as `from`) and
    /// burning (as `to`).
    pub fn on_balance_change<B: BalanceSource>(
        &mut self,
        balances: &B,
        now: Height,
        from: Account,
        to: Account,
        amount: Power,
    ) -> Result<(), Error> {
        self.transact(balances, now, |tx| tx.route_balance_change(from, to, amount))
    }

    fn transact<B, F>(&mut self, balances: &B, now: Height, f: F) -> Result<(), Error>
    where
        B: BalanceSource,
        F: FnOnce(&mut Transaction<'_, S, B>) -> Result<(), Error>,
    {
        if now < self.last_height {
            return Err(Error::ClockRegression {
                height: now,
                last: self.last_height,
            });
        }
        trace!(height = %now, "opening ledger transaction");

        let mut tx = Transaction::new(&self.store, balances, now);
        if let Err(error) = f(&mut tx) {
            debug!(height = %now, %error, "ledger transaction rejected");
            return Err(error);
        }
        let changes = tx.changes;
        if let Err(error) = self.commit(changes) {
            debug!(height = %now, %error, "ledger transaction rejected");
            return Err(error);
        }
        Ok(())
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<(), Error> {
        let ChangeSet {
            height,
            powers,
            delegatees,
            partial,
            events,
        } = changes;

        // nothing is applied unless every history accepts the height
        for (kind, account) in powers.keys() {
            let tables = self.store.tables(*kind);
            if let Some(last) = tables.snapshots_of(account).and_then(SnapshotHistory::last) {
                if last.height > height {
                    return Err(Error::ClockRegression {
                        height,
                        last: last.height,
                    });
                }
            }
        }
        for ((kind, account), power) in powers {
            self.store
                .tables_mut(kind)
                .snapshots
                .entry(account)
                .or_default()
                .write(height, power)?;
        }
        for ((kind, delegator), delegatee) in delegatees {
            let tables = self.store.tables_mut(kind);
            if delegatee == delegator {
                tables.delegatees.remove(&delegator);
            } else {
                tables.delegatees.insert(delegator, delegatee);
            }
        }
        for ((kind, delegator), state) in partial {
            let tables = self.store.tables_mut(kind);
            if state.is_empty() {
                tables.partial.remove(&delegator);
            } else {
                tables.partial.insert(delegator, state);
            }
        }

        for event in &events {
            debug!(height = %height, ?event, "ledger event");
        }
        self.events.extend(events);
        self.last_height = height;
        Ok(())
    }

    /// Panics if any ledger invariant does not hold. `holders` must contain at
    /// least every account with a non-zero balance.
    #[cfg(any(test, feature = "test-api"))]
    pub fn assert_invariants<'a, B: BalanceSource>(
        &self,
        balances: &B,
        holders: impl IntoIterator<Item = &'a Account>,
    ) {
        use std::collections::BTreeSet;

        let holders = holders.into_iter().copied().collect::<BTreeSet<_>>();
        for kind in PowerKind::ALL {
            let tables = self.store.tables(kind);

            let accounts = holders
                .iter()
                .chain(tables.snapshots.keys())
                .collect::<BTreeSet<_>>();
            let total_power = accounts
                .iter()
                .map(|account| self.power_current(balances, account, kind))
                .sum::<Power>();
            assert_eq!(total_power, balances.total_supply(), "{} power leaked", kind);

            for (delegator, delegatee) in &tables.delegatees {
                assert_ne!(delegator, delegatee);
                assert!(
                    tables.partial_of(delegator).is_none(),
                    "{} uses both delegation modes",
                    delegator
                );
            }
            for (delegator, state) in &tables.partial {
                state.assert_consistent();
                assert!(!state.is_empty());
                assert!(state.total_delegated() <= balances.balance_of(delegator));
            }
            for history in tables.snapshots.values() {
                assert!(history
                    .as_slice()
                    .windows(2)
                    .all(|pair| pair[0].height < pair[1].height));
            }
        }
    }
}

/// Writes staged by a transaction, applied to the store only on success.
struct ChangeSet {
    height: Height,
    powers: BTreeMap<(PowerKind, Account), Power>,
    delegatees: BTreeMap<(PowerKind, Account), Account>,
    partial: BTreeMap<(PowerKind, Account), PartialDelegations>,
    events: Vec<LedgerEvent>,
}

/// Consistent view of the store overlaid with the writes of the ongoing
/// operation.
struct Transaction<'a, S, B> {
    store: &'a S,
    balances: &'a B,
    changes: ChangeSet,
}

impl<'a, S: PowerStore, B: BalanceSource> Transaction<'a, S, B> {
    fn new(store: &'a S, balances: &'a B, height: Height) -> Self {
        Self {
            store,
            balances,
            changes: ChangeSet {
                height,
                powers: BTreeMap::new(),
                delegatees: BTreeMap::new(),
                partial: BTreeMap::new(),
                events: Vec::new(),
            },
        }
    }

    fn power(&self, kind: PowerKind, account: &Account) -> Power {
        if let Some(power) = self.changes.powers.get(&(kind, *account)) {
            return *power;
        }
        self.store
            .tables(kind)
            .snapshots_of(account)
            .and_then(SnapshotHistory::last)
            .map_or_else(|| self.balances.balance_of(account), |snapshot| snapshot.value)
    }

    fn delegatee(&self, kind: PowerKind, account: &Account) -> Account {
        match self.changes.delegatees.get(&(kind, *account)) {
            Some(delegatee) => *delegatee,
            None => self.store.tables(kind).delegatee_of(account),
        }
    }

    fn partial(&self, kind: PowerKind, account: &Account) -> Option<&PartialDelegations> {
        match self.changes.partial.get(&(kind, *account)) {
            Some(state) => Some(state),
            None => self.store.tables(kind).partial_of(account),
        }
    }

    fn partial_total(&self, kind: PowerKind, account: &Account) -> Power {
        self.partial(kind, account)
            .map_or(0, PartialDelegations::total_delegated)
    }

    fn partial_mut(&mut self, kind: PowerKind, account: Account) -> &mut PartialDelegations {
        let store = self.store;
        self.changes
            .partial
            .entry((kind, account))
            .or_insert_with(|| {
                store
                    .tables(kind)
                    .partial_of(&account)
                    .cloned()
                    .unwrap_or_default()
            })
    }

    fn write_power(&mut self, kind: PowerKind, account: Account, power: Power) {
        self.changes.powers.insert((kind, account), power);
        self.changes.events.push(LedgerEvent::PowerChanged {
            account,
            kind,
            power,
            height: self.changes.height,
        });
    }

    /// Moves `amount` of `kind` power from `from` to `to`. Null endpoints are
    /// skipped, so minting and burning are moves from and to the null account.
    fn move_power(
        &mut self,
        from: Account,
        to: Account,
        amount: Power,
        kind: PowerKind,
    ) -> Result<(), Error> {
        if from == to {
            return Ok(());
        }

        if !from.is_null() {
            let previous = self.power(kind, &from);
            let power = previous.checked_sub(amount).ok_or_else(|| {
                Error::LedgerInvariantViolation {
                    account: from,
                    kind,
                    details: format!("cannot move {} power out of {}", amount, previous),
                }
            })?;
            self.write_power(kind, from, power);
        }

        if !to.is_null() {
            let previous = self.power(kind, &to);
            let power = previous.checked_add(amount).ok_or_else(|| {
                Error::LedgerInvariantViolation {
                    account: to,
                    kind,
                    details: format!("adding {} power to {} overflows", amount, previous),
                }
            })?;
            self.write_power(kind, to, power);
        }

        Ok(())
    }

    fn set_delegatee(
        &mut self,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
    ) -> Result<(), Error> {
        if delegator.is_null() {
            return Err(Error::InvalidDelegator);
        }
        if delegatee.is_null() {
            return Err(Error::InvalidDelegatee);
        }
        if self.partial_total(kind, &delegator) > 0 {
            return Err(Error::PartialDelegationActive { delegator, kind });
        }

        let previous = self.delegatee(kind, &delegator);
        let balance = self.balances.balance_of(&delegator);
        self.changes
            .delegatees
            .insert((kind, delegator), delegatee);
        self.changes.events.push(LedgerEvent::DelegateeChanged {
            delegator,
            delegatee,
            kind,
        });
        self.move_power(previous, delegatee, balance, kind)
    }

    fn set_partial(
        &mut self,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
        amount: Power,
    ) -> Result<(), Error> {
        if delegator.is_null() {
            return Err(Error::InvalidDelegator);
        }
        if delegatee.is_null() {
            return Err(Error::InvalidDelegatee);
        }
        if delegatee == delegator {
            return Err(Error::SelfPartialDelegation { delegator, kind });
        }
        if self.delegatee(kind, &delegator) != delegator {
            return Err(Error::FullDelegationActive { delegator, kind });
        }

        let (previous, total) = self
            .partial(kind, &delegator)
            .map_or((0, 0), |state| {
                (state.amount_for(&delegatee), state.total_delegated())
            });
        if previous == amount {
            return Ok(());
        }

        // withdrawing everything can only lower the total
        if amount != 0 {
            let balance = self.balances.balance_of(&delegator);
            let delegated = (total - previous).checked_add(amount);
            if !matches!(delegated, Some(delegated) if delegated <= balance) {
                return Err(Error::DelegationExceedsBalance {
                    delegator,
                    kind,
                    delegated: delegated.unwrap_or(Power::MAX),
                    balance,
                });
            }
        }

        if amount > previous {
            self.move_power(delegator, delegatee, amount - previous, kind)?;
        } else {
            self.move_power(delegatee, delegator, previous - amount, kind)?;
        }
        self.partial_mut(kind, delegator).set(delegatee, amount);
        self.changes
            .events
            .push(LedgerEvent::PartialDelegationChanged {
                delegator,
                delegatee,
                kind,
                amount,
            });
        Ok(())
    }

    fn clear_partial(&mut self, delegator: Account, kind: PowerKind) -> Result<(), Error> {
        if delegator.is_null() {
            return Err(Error::InvalidDelegator);
        }
        if self.partial(kind, &delegator).map_or(true, PartialDelegations::is_empty) {
            return Ok(());
        }

        let state = self.partial_mut(kind, delegator);
        let drained = std::iter::from_fn(|| state.pop()).collect::<Vec<_>>();
        for (delegatee, amount) in drained {
            self.move_power(delegatee, delegator, amount, kind)?;
            self.changes
                .events
                .push(LedgerEvent::PartialDelegationChanged {
                    delegator,
                    delegatee,
                    kind,
                    amount: 0,
                });
        }
        Ok(())
    }

    /// Balance moves follow the power of its owner: they are credited to and
    /// debited from the current delegatees of the two endpoints.
    fn route_balance_change(
        &mut self,
        from: Account,
        to: Account,
        amount: Power,
    ) -> Result<(), Error> {
        if from == to {
            return Ok(());
        }

        for kind in PowerKind::ALL {
            let from_delegatee = if from.is_null() {
                Account::NULL
            } else {
                let delegated = self.partial_total(kind, &from);
                let remaining = self.balances.balance_of(&from).saturating_sub(amount);
                if remaining < delegated {
                    return Err(Error::DelegationExceedsBalance {
                        delegator: from,
                        kind,
                        delegated,
                        balance: remaining,
                    });
                }
                self.delegatee(kind, &from)
            };
            let to_delegatee = if to.is_null() {
                Account::NULL
            } else {
                self.delegatee(kind, &to)
            };
            self.move_power(from_delegatee, to_delegatee, amount, kind)?;
        }
        Ok(())
    }
}
