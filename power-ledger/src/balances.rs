use crate::{Account, Power};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw token balances the voting power derives from.
pub trait BalanceSource {
    fn balance_of(&self, account: &Account) -> Power;

    fn total_supply(&self) -> Power;
}

impl<T: BalanceSource + ?Sized> BalanceSource for &T {
    fn balance_of(&self, account: &Account) -> Power {
        (**self).balance_of(account)
    }

    fn total_supply(&self) -> Power {
        (**self).total_supply()
    }
}

/// In-memory balance book. Keeps the total supply in sync with the balances.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    balances: HashMap<Account, Power>,
    total_supply: Power,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to `account`, returning `None` on overflow of the supply.
    pub fn credit(&mut self, account: Account, amount: Power) -> Option<()> {
        if amount == 0 {
            return Some(());
        }
        let total_supply = self.total_supply.checked_add(amount)?;
        // a single balance never exceeds the total supply
        *self.balances.entry(account).or_default() += amount;
        self.total_supply = total_supply;
        Some(())
    }

    /// Removes `amount` from `account`, returning `None` if it does not hold it.
    pub fn debit(&mut self, account: Account, amount: Power) -> Option<()> {
        if amount == 0 {
            return Some(());
        }
        let balance = self.balances.get_mut(&account)?;
        *balance = balance.checked_sub(amount)?;
        if *balance == 0 {
            self.balances.remove(&account);
        }
        self.total_supply -= amount;
        Some(())
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Account, Power)> + '_ {
        self.balances.iter().map(|(account, balance)| (account, *balance))
    }
}

impl BalanceSource for Balances {
    fn balance_of(&self, account: &Account) -> Power {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> Power {
        self.total_supply
    }
}
