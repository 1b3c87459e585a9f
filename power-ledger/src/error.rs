use crate::{Account, Height, Power, PowerKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("the null account cannot be a delegatee")]
    InvalidDelegatee,

    #[error("the null account cannot delegate")]
    InvalidDelegator,

    #[error("height {requested} is in the future (current height is {current})")]
    InvalidHeight { requested: Height, current: Height },

    #[error("height {height} is lower than the last committed height {last}")]
    ClockRegression { height: Height, last: Height },

    #[error("{delegator} cannot partially delegate {kind} power to itself")]
    SelfPartialDelegation { delegator: Account, kind: PowerKind },

    #[error("{delegator} has an active full {kind} delegation")]
    FullDelegationActive { delegator: Account, kind: PowerKind },

    #[error("{delegator} has active partial {kind} delegations")]
    PartialDelegationActive { delegator: Account, kind: PowerKind },

    #[error("{delegator} would delegate {delegated} {kind} power with a balance of {balance}")]
    DelegationExceedsBalance {
        delegator: Account,
        kind: PowerKind,
        delegated: Power,
        balance: Power,
    },

    #[error("ledger invariant violated for {account} ({kind}): {details}")]
    LedgerInvariantViolation {
        account: Account,
        kind: PowerKind,
        details: String,
    },
}
