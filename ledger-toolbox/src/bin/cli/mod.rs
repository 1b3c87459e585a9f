mod replay;

use color_eyre::Report;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub enum Cli {
    /// Replay a json encoded scenario against an in-memory ledger and print the
    /// resulting powers and delegations
    Replay(replay::Replay),
}

impl Cli {
    pub fn exec(self) -> Result<(), Report> {
        match self {
            Self::Replay(replay) => replay.exec(),
        }
    }
}
