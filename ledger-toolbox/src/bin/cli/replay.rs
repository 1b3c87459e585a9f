use ledger_toolbox::scenario::{Scenario, ScenarioRun};

use color_eyre::{eyre::WrapErr, Report};
use structopt::StructOpt;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct Replay {
    /// Path to a json encoded scenario: genesis allocations, steps and queries
    #[structopt(long)]
    scenario: PathBuf,

    /// Path of the json report, printed to stdout if missing
    #[structopt(long)]
    output: Option<PathBuf>,

    /// Abort on the first rejected step instead of recording it in the report
    #[structopt(long)]
    strict: bool,
}

impl Replay {
    pub fn exec(self) -> Result<(), Report> {
        let Replay {
            scenario,
            output,
            strict,
        } = self;

        let file = File::open(&scenario)
            .wrap_err_with(|| format!("cannot open scenario {}", scenario.display()))?;
        let scenario: Scenario = serde_json::from_reader(BufReader::new(file))?;

        let run = ScenarioRun::play(&scenario, strict)?;
        let report = run.report(&scenario.queries);

        let mut writer: Box<dyn Write> = match output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(std::io::stdout()),
        };
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}
