mod scenarios;

use std::{path::PathBuf, str::FromStr};

use anyhow::{bail, Context};
use argh::FromArgs;
use smc::{
    executor,
    fields::{Mersenne127, Mersenne61},
    EngineConfig, MpcField,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scenarios::{Scenario, Selection};

enum FieldType {
    Mersenne61,
    Mersenne127,
}

impl FromStr for FieldType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "61" => Ok(FieldType::Mersenne61),
            "127" => Ok(FieldType::Mersenne127),
            _ => Err("Unsupported field type. Available options: 61, 127"),
        }
    }
}

#[derive(FromArgs)]
/// Runs demo computations with every party in this process.
struct Options {
    /// scenario to run: sum, difference, pairwise or all
    #[argh(option, default = "Selection(Scenario::ALL.to_vec())")]
    scenario: Selection,

    /// connect parties to the mailbox over framed channels
    #[argh(switch)]
    framed: bool,

    /// path to JSON engine configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// target field
    #[argh(option, default = "FieldType::Mersenne127")]
    field: FieldType,
}

async fn run_scenario<F: MpcField>(
    scenario: Scenario,
    framed: bool,
    config: EngineConfig,
) -> anyhow::Result<()> {
    let spec = scenario.spec::<F>();
    info!(scenario = scenario.name(), expression = %spec.expr, "Running scenario");

    let results = if framed {
        executor::run_in_process_framed(&spec, scenario.inputs(), config).await
    } else {
        executor::run_in_process(&spec, scenario.inputs(), config).await
    };

    for (participant, result) in spec.participant_ids.iter().zip(results) {
        let value = result
            .with_context(|| format!("party {participant} failed in scenario {}", scenario.name()))?
            .to_i128();
        println!("{:<12} {participant}: {value}", scenario.name());
        if value != scenario.expected() {
            bail!(
                "party {participant} reconstructed {value}, expected {}",
                scenario.expected()
            );
        }
    }
    Ok(())
}

async fn run<F: MpcField>(options: &Options, config: EngineConfig) -> anyhow::Result<()> {
    for &scenario in &options.scenario.0 {
        run_scenario::<F>(scenario, options.framed, config.clone()).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let options: Options = argh::from_env();

    let config = match &options.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("unable to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match options.field {
        FieldType::Mersenne61 => run::<Mersenne61>(&options, config).await,
        FieldType::Mersenne127 => run::<Mersenne127>(&options, config).await,
    }
}
