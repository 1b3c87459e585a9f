use power_ledger::{
    token, Account, GovernanceToken, Height, LedgerEvent, Power, PowerKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

// Amounts and heights are read as u64: serde buffers internally tagged enums
// and cannot buffer 128 bit integers.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("genesis allocation to {account} failed")]
    Genesis {
        account: Account,
        #[source]
        source: token::Error,
    },

    #[error("step {step} at height {height} was rejected")]
    Step {
        step: usize,
        height: u64,
        #[source]
        source: token::Error,
    },
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub account: Account,
    pub amount: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub height: u64,
    #[serde(flatten)]
    pub operation: Operation,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Mint {
        to: Account,
        amount: u64,
    },
    Burn {
        from: Account,
        amount: u64,
    },
    Transfer {
        from: Account,
        to: Account,
        amount: u64,
    },
    Delegate {
        delegator: Account,
        delegatee: Account,
    },
    DelegateByType {
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
    },
    SetPartialDelegation {
        delegator: Account,
        delegatee: Account,
        kind: PowerKind,
        amount: u64,
    },
    ClearAllPartialDelegations {
        delegator: Account,
        kind: PowerKind,
    },
}

impl Operation {
    fn accounts(&self) -> Vec<Account> {
        match self {
            Operation::Mint { to, .. } => vec![*to],
            Operation::Burn { from, .. } => vec![*from],
            Operation::Transfer { from, to, .. } => vec![*from, *to],
            Operation::Delegate {
                delegator,
                delegatee,
            }
            | Operation::DelegateByType {
                delegator,
                delegatee,
                ..
            }
            | Operation::SetPartialDelegation {
                delegator,
                delegatee,
                ..
            } => vec![*delegator, *delegatee],
            Operation::ClearAllPartialDelegations { delegator, .. } => vec![*delegator],
        }
    }

    fn apply(&self, token: &mut GovernanceToken, now: Height) -> Result<(), token::Error> {
        match *self {
            Operation::Mint { to, amount } => token.mint(now, to, amount.into()),
            Operation::Burn { from, amount } => token.burn(now, from, amount.into()),
            Operation::Transfer { from, to, amount } => {
                token.transfer(now, from, to, amount.into())
            }
            Operation::Delegate {
                delegator,
                delegatee,
            } => token.delegate(now, delegator, delegatee),
            Operation::DelegateByType {
                delegator,
                delegatee,
                kind,
            } => token.delegate_by_type(now, delegator, delegatee, kind),
            Operation::SetPartialDelegation {
                delegator,
                delegatee,
                kind,
                amount,
            } => token.set_partial_delegation(now, delegator, delegatee, kind, amount.into()),
            Operation::ClearAllPartialDelegations { delegator, kind } => {
                token.clear_all_partial_delegations(now, delegator, kind)
            }
        }
    }
}

/// Power lookup evaluated once every step has been applied. Without a height
/// the current power is reported.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub account: Account,
    pub kind: PowerKind,
    #[serde(default)]
    pub height: Option<u64>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Scenario {
    /// Minted at height 0, before any step.
    #[serde(default)]
    pub genesis: Vec<Allocation>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub step: usize,
    pub height: u64,
    pub error: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PartialEntry {
    pub delegatee: Account,
    pub amount: Power,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PowerReport {
    pub power: Power,
    /// `None` when the account delegates to itself.
    pub delegatee: Option<Account>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial: Vec<PartialEntry>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountReport {
    pub balance: Power,
    pub voting: PowerReport,
    pub proposition: PowerReport,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct QueryAnswer {
    pub account: Account,
    pub kind: PowerKind,
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub height: Height,
    pub total_supply: Power,
    pub accounts: BTreeMap<Account, AccountReport>,
    pub queries: Vec<QueryAnswer>,
    pub rejected: Vec<Rejection>,
    pub events: Vec<LedgerEvent>,
}

/// A scenario played against a fresh in-memory token.
pub struct ScenarioRun {
    token: GovernanceToken,
    height: Height,
    accounts: BTreeSet<Account>,
    rejected: Vec<Rejection>,
    events: Vec<LedgerEvent>,
}

impl ScenarioRun {
    /// With `strict` the first rejected step aborts the run, otherwise rejected
    /// steps are recorded and skipped.
    pub fn play(scenario: &Scenario, strict: bool) -> Result<Self, Error> {
        let mut run = ScenarioRun {
            token: GovernanceToken::in_memory(),
            height: 0,
            accounts: BTreeSet::new(),
            rejected: Vec::new(),
            events: Vec::new(),
        };

        for Allocation { account, amount } in &scenario.genesis {
            run.token
                .mint(0, *account, (*amount).into())
                .map_err(|source| Error::Genesis {
                    account: *account,
                    source,
                })?;
            run.accounts.insert(*account);
        }
        run.events.extend(run.token.drain_events());

        for (step, Step { height, operation }) in scenario.steps.iter().enumerate() {
            run.accounts.extend(
                operation
                    .accounts()
                    .into_iter()
                    .filter(|account| !account.is_null()),
            );
            let now = Height::from(*height);
            // queries are answered at the latest step height, applied or not
            run.height = run.height.max(now);
            match operation.apply(&mut run.token, now) {
                Ok(()) => {}
                Err(source) if strict => {
                    return Err(Error::Step {
                        step,
                        height: *height,
                        source,
                    })
                }
                Err(error) => {
                    warn!(step, height, %error, "step rejected");
                    run.rejected.push(Rejection {
                        step,
                        height: *height,
                        error: error.to_string(),
                    });
                }
            }
            run.events.extend(run.token.drain_events());
        }

        info!(
            steps = scenario.steps.len(),
            rejected = run.rejected.len(),
            "scenario replayed"
        );
        Ok(run)
    }

    pub fn token(&self) -> &GovernanceToken {
        &self.token
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    pub fn report(&self, queries: &[Query]) -> Report {
        let accounts = self
            .accounts
            .iter()
            .map(|account| {
                (
                    *account,
                    AccountReport {
                        balance: self.token.balance_of(account),
                        voting: self.power_report(account, PowerKind::Voting),
                        proposition: self.power_report(account, PowerKind::Proposition),
                    },
                )
            })
            .collect();

        let queries = queries
            .iter()
            .map(|query| {
                let result = match query.height {
                    Some(height) => self.token.power_at_height(
                        &query.account,
                        height.into(),
                        query.kind,
                        self.height,
                    ),
                    None => Ok(self.token.power_current(&query.account, query.kind)),
                };
                let (power, error) = match result {
                    Ok(power) => (Some(power), None),
                    Err(error) => (None, Some(error.to_string())),
                };
                QueryAnswer {
                    account: query.account,
                    kind: query.kind,
                    height: query.height,
                    power,
                    error,
                }
            })
            .collect();

        Report {
            height: self.height,
            total_supply: self.token.total_supply(),
            accounts,
            queries,
            rejected: self.rejected.clone(),
            events: self.events.clone(),
        }
    }

    fn power_report(&self, account: &Account, kind: PowerKind) -> PowerReport {
        let delegatee = self.token.delegatee_by_type(account, kind);
        PowerReport {
            power: self.token.power_current(account, kind),
            delegatee: (delegatee != *account).then(|| delegatee),
            partial: self
                .token
                .partial_delegations(account, kind)
                .map(|partial| {
                    partial
                        .iter()
                        .map(|(delegatee, amount)| PartialEntry {
                            delegatee: *delegatee,
                            amount,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
