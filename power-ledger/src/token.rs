//! Minimal token owning the balances a [`PowerLedger`] derives power from.
//!
//! It exists to drive the ledger's balance hook from real mints, burns and
//! transfers; it carries none of the usual token metadata or access control.
use crate::{
    balances::{BalanceSource, Balances},
    ledger::{LedgerEvent, PowerLedger},
    partial::PartialDelegations,
    store::{MemoryStore, PowerStore},
    Account, Height, Power, PowerKind,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("tokens cannot be sent to the null account")]
    InvalidRecipient,

    #[error("tokens cannot be taken from the null account")]
    InvalidSender,

    #[error("{account} holds {balance}, {requested} requested")]
    InsufficientBalance {
        account: Account,
        balance: Power,
        requested: Power,
    },

    #[error("minting {amount} would overflow the total supply")]
    SupplyOverflow { amount: Power },

    #[error(transparent)]
    Ledger(#[from] crate::Error),
}

#[derive(Debug, Default)]
pub struct GovernanceToken<S = MemoryStore> {
    balances: Balances,
    ledger: PowerLedger<S>,
}

impl GovernanceToken<MemoryStore> {
    pub fn in_memory() -> Self {
        Self::new(PowerLedger::in_memory())
    }
}

impl<S: PowerStore> GovernanceToken<S> {
    pub fn new(ledger: PowerLedger<S>) -> Self {
        Self {
            balances: Balances::new(),
            ledger,
        }
    }

    pub fn ledger(&self) -> &PowerLedger<S> {
        &self.ledger
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.ledger.drain_events()
    }

    pub fn balance_of(&self, account: &Account) -> Power {
        self.balances.balance_of(account)
    }

    pub fn total_supply(&self) -> Power {
        self.balances.total_supply()
    }

    /// Always the current supply: no supply history is kept.
    pub fn total_supply_at(&self, height: Height) -> Power {
        self.ledger.total_supply_at(&self.balances, height)
    }

    pub fn mint(&mut self, now: Height, to: Account, amount: Power) -> Result<(), Error> {
        if to.is_null() {
            return Err(Error::InvalidRecipient);
        }
        if self.total_supply().checked_add(amount).is_none() {
            return Err(Error::SupplyOverflow { amount });
        }
        self.ledger
            .on_balance_change(&self.balances, now, Account::NULL, to, amount)?;
        self.balances
            .credit(to, amount)
            .ok_or(Error::SupplyOverflow { amount })
    }

    pub fn burn(&mut self, now: Height, from: Account, amount: Power) -> Result<(), Error> {
        if from.is_null() {
            return Err(Error::InvalidSender);
        }
        self.ensure_balance(&from, amount)?;
        self.ledger
            .on_balance_change(&self.balances, now, from, Account::NULL, amount)?;
        self.debit(from, amount)
    }

    pub fn transfer(
        &mut self,
        now: Height,
        from: Account,
        to: Account,
        amount: Power,
    ) -> Result<(), Error> {
        if from.is_null() {
            return Err(Error::InvalidSender);
        }
        if to.is_null() {
            return Err(Error::InvalidRecipient);
        }
        self.ensure_balance(&from, amount)?;
        self.ledger
            .on_balance_change(&self.balances, now, from, to, amount)?;
        self.debit(from, amount)?;
        self.balances
            .credit(to, amount)
            .ok_or(Error::SupplyOverflow { amount })
    }

    pub fn delegate(
        &mut self,
        now: Height,
        delegator: Account,
        delegatee: Account,
    ) -> Result<(), Error> {
        Ok(self
            .ledger
            .delegate(&self.balances, now, delegator, delegatee)?)
    }

    pub fn delegate_by_type(
        &mut self,
        now: Height,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
    ) -> Result<(), Error> {
        Ok(self
            .ledger
            .delegate_by_type(&self.balances, now, delegator, delegatee, kind)?)
    }

    pub fn set_partial_delegation(
        &mut self,
        now: Height,
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
        amount: Power,
    ) -> Result<(), Error> {
        Ok(self.ledger.set_partial_delegation(
            &self.balances,
            now,
            delegator,
            delegatee,
            kind,
            amount,
        )?)
    }

    pub fn clear_all_partial_delegations(
        &mut self,
        now: Height,
        delegator: Account,
        kind: PowerKind,
    ) -> Result<(), Error> {
        Ok(self
            .ledger
            .clear_all_partial_delegations(&self.balances, now, delegator, kind)?)
    }

    pub fn delegatee_by_type(&self, delegator: &Account, kind: PowerKind) -> Account {
        self.ledger.delegatee_by_type(delegator, kind)
    }

    pub fn partial_delegations(
        &self,
        delegator: &Account,
        kind: PowerKind,
    ) -> Option<&PartialDelegations> {
        self.ledger.partial_delegations(delegator, kind)
    }

    pub fn power_current(&self, account: &Account, kind: PowerKind) -> Power {
        self.ledger.power_current(&self.balances, account, kind)
    }

    pub fn power_at_height(
        &self,
        account: &Account,
        height: Height,
        kind: PowerKind,
        now: Height,
    ) -> Result<Power, Error> {
        Ok(self
            .ledger
            .power_at_height(&self.balances, account, height, kind, now)?)
    }

    fn ensure_balance(&self, account: &Account, amount: Power) -> Result<(), Error> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                account: *account,
                balance,
                requested: amount,
            });
        }
        Ok(())
    }

    fn debit(&mut self, account: Account, amount: Power) -> Result<(), Error> {
        self.balances
            .debit(account, amount)
            .ok_or(Error::InsufficientBalance {
                account,
                balance: self.balances.balance_of(&account),
                requested: amount,
            })
    }

    #[cfg(any(test, feature = "test-api"))]
    pub fn assert_invariants(&self) {
        let holders = self
            .balances
            .holders()
            .map(|(account, _)| *account)
            .collect::<Vec<_>>();
        self.ledger.assert_invariants(&self.balances, &holders);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_strategy::proptest;

    const VOTING: PowerKind = PowerKind::Voting;
    const PROPOSITION: PowerKind = PowerKind::Proposition;

    fn account(i: u8) -> Account {
        Account::new([i; 32])
    }

    #[test]
    fn mint_goes_to_the_delegatee() {
        let mut token = GovernanceToken::in_memory();
        token.delegate(1, account(1), account(2)).unwrap();
        token.mint(2, account(1), 100).unwrap();

        assert_eq!(token.balance_of(&account(1)), 100);
        assert_eq!(token.power_current(&account(1), VOTING), 0);
        assert_eq!(token.power_current(&account(2), VOTING), 100);
        assert_eq!(token.power_current(&account(2), PROPOSITION), 100);
        assert_eq!(token.power_at_height(&account(2), 1, VOTING, 2), Ok(0));
        token.assert_invariants();
    }

    #[test]
    fn transfer_moves_power_between_delegatees() {
        let mut token = GovernanceToken::in_memory();
        token.mint(1, account(1), 100).unwrap();
        token.mint(1, account(2), 100).unwrap();
        token.delegate(2, account(1), account(3)).unwrap();
        token
            .delegate_by_type(2, account(2), account(4), PROPOSITION)
            .unwrap();

        token.transfer(3, account(1), account(2), 40).unwrap();
        assert_eq!(token.power_current(&account(3), VOTING), 60);
        assert_eq!(token.power_current(&account(2), VOTING), 140);
        assert_eq!(token.power_current(&account(3), PROPOSITION), 60);
        assert_eq!(token.power_current(&account(4), PROPOSITION), 140);
        assert_eq!(token.power_current(&account(2), PROPOSITION), 0);
        token.assert_invariants();
    }

    #[test]
    fn transfer_between_accounts_sharing_a_delegatee() {
        let mut token = GovernanceToken::in_memory();
        token.mint(1, account(1), 100).unwrap();
        token.delegate(2, account(1), account(3)).unwrap();
        token.delegate(2, account(2), account(3)).unwrap();
        token.drain_events();

        token.transfer(3, account(1), account(2), 40).unwrap();
        assert_eq!(token.power_current(&account(3), VOTING), 100);
        assert!(token.drain_events().is_empty());
        token.assert_invariants();
    }

    #[test]
    fn burn_from_partial_delegator_uses_free_balance() {
        let mut token = GovernanceToken::in_memory();
        token.mint(1, account(1), 100).unwrap();
        token
            .set_partial_delegation(2, account(1), account(2), VOTING, 60)
            .unwrap();

        assert!(matches!(
            token.burn(3, account(1), 50),
            Err(Error::Ledger(crate::Error::DelegationExceedsBalance { .. }))
        ));
        assert_eq!(token.balance_of(&account(1)), 100);
        assert_eq!(token.total_supply(), 100);

        token.burn(3, account(1), 40).unwrap();
        assert_eq!(token.power_current(&account(1), VOTING), 0);
        assert_eq!(token.power_current(&account(1), PROPOSITION), 60);
        assert_eq!(token.power_current(&account(2), VOTING), 60);
        token.assert_invariants();
    }

    #[test]
    fn rejected_balance_changes() {
        let mut token = GovernanceToken::in_memory();
        token.mint(1, account(1), 10).unwrap();
        assert_eq!(
            token.transfer(2, account(1), account(2), 11),
            Err(Error::InsufficientBalance {
                account: account(1),
                balance: 10,
                requested: 11
            })
        );
        assert_eq!(
            token.mint(2, Account::NULL, 1),
            Err(Error::InvalidRecipient)
        );
        assert_eq!(
            token.transfer(2, Account::NULL, account(1), 1),
            Err(Error::InvalidSender)
        );
        assert_eq!(
            token.mint(2, account(1), Power::MAX),
            Err(Error::SupplyOverflow { amount: Power::MAX })
        );
        assert_eq!(
            token.mint(0, account(1), 1),
            Err(Error::Ledger(crate::Error::ClockRegression {
                height: 0,
                last: 1
            }))
        );
        assert_eq!(token.total_supply(), 10);
        token.assert_invariants();
    }

    #[test]
    fn total_supply_at_reports_the_current_supply() {
        let mut token = GovernanceToken::in_memory();
        token.mint(1, account(1), 10).unwrap();
        token.mint(5, account(1), 90).unwrap();
        assert_eq!(token.total_supply_at(1), 100);
        assert_eq!(token.total_supply_at(0), 100);
        // whereas power history is exact
        assert_eq!(token.power_at_height(&account(1), 1, VOTING, 5), Ok(10));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Mint(u8, Power),
        Burn(u8, Power),
        Transfer(u8, u8, Power),
        Delegate(u8, u8),
        DelegateByType(u8, u8, PowerKind),
        SetPartial(u8, u8, PowerKind, Power),
        ClearPartial(u8, PowerKind),
    }

    impl Arbitrary for Op {
        type Parameters = ();
        type Strategy = BoxedStrategy<Op>;

        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            let holder = || 1..6u8;
            let amount = || 0..200u128;
            prop_oneof![
                (holder(), amount()).prop_map(|(a, v)| Op::Mint(a, v)),
                (holder(), amount()).prop_map(|(a, v)| Op::Burn(a, v)),
                (holder(), holder(), amount()).prop_map(|(a, b, v)| Op::Transfer(a, b, v)),
                (holder(), holder()).prop_map(|(a, b)| Op::Delegate(a, b)),
                (holder(), holder(), any::<PowerKind>())
                    .prop_map(|(a, b, k)| Op::DelegateByType(a, b, k)),
                (holder(), holder(), any::<PowerKind>(), amount())
                    .prop_map(|(a, b, k, v)| Op::SetPartial(a, b, k, v)),
                (holder(), any::<PowerKind>()).prop_map(|(a, k)| Op::ClearPartial(a, k)),
            ]
            .boxed()
        }
    }

    fn apply(token: &mut GovernanceToken, now: Height, op: Op) -> Result<(), Error> {
        match op {
            Op::Mint(a, v) => token.mint(now, account(a), v),
            Op::Burn(a, v) => token.burn(now, account(a), v),
            Op::Transfer(a, b, v) => token.transfer(now, account(a), account(b), v),
            Op::Delegate(a, b) => token.delegate(now, account(a), account(b)),
            Op::DelegateByType(a, b, k) => token.delegate_by_type(now, account(a), account(b), k),
            Op::SetPartial(a, b, k, v) => {
                token.set_partial_delegation(now, account(a), account(b), k, v)
            }
            Op::ClearPartial(a, k) => token.clear_all_partial_delegations(now, account(a), k),
        }
    }

    #[proptest]
    fn power_is_conserved(ops: Vec<(bool, Op)>) {
        let mut token = GovernanceToken::in_memory();
        let mut now = 0;
        for (advance, op) in ops {
            if advance {
                now += 1;
            }
            if let Err(error) = apply(&mut token, now, op) {
                assert!(
                    !matches!(
                        error,
                        Error::Ledger(crate::Error::LedgerInvariantViolation { .. })
                    ),
                    "{}",
                    error
                );
            }
            token.assert_invariants();
        }
    }

    #[proptest]
    fn rejected_operations_change_nothing(ops: Vec<Op>, last: Op) {
        let mut token = GovernanceToken::in_memory();
        for (now, op) in ops.into_iter().enumerate() {
            let _ = apply(&mut token, now as Height, op);
        }
        token.drain_events();

        let now = token.ledger().last_height() + 1;
        let before = (1..6u8)
            .flat_map(|i| {
                PowerKind::ALL.map(|kind| {
                    (
                        token.balance_of(&account(i)),
                        token.power_current(&account(i), kind),
                        token.delegatee_by_type(&account(i), kind),
                        token.partial_delegations(&account(i), kind).cloned(),
                    )
                })
            })
            .collect::<Vec<_>>();

        if apply(&mut token, now, last).is_err() {
            let after = (1..6u8)
                .flat_map(|i| {
                    PowerKind::ALL.map(|kind| {
                        (
                            token.balance_of(&account(i)),
                            token.power_current(&account(i), kind),
                            token.delegatee_by_type(&account(i), kind),
                            token.partial_delegations(&account(i), kind).cloned(),
                        )
                    })
                })
                .collect::<Vec<_>>();
            assert_eq!(before, after);
            assert!(token.drain_events().is_empty());
        }
    }
}
