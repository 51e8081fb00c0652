use std::{future, path::PathBuf, process, sync::Arc};

use structopt::StructOpt;
use tokio::signal;
use tracing_subscriber::*;

use gossipfl_server::{
    settings::Settings,
    simulation::{initial_state, QuadraticEvaluator, QuadraticTrainer, SyntheticPartition},
    state_machine::{phases::PhaseError, StateMachineInitializer},
};

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "Coordinator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        training: training_settings,
        algorithm: algorithm_settings,
        topology: topology_settings,
        simulation: simulation_settings,
        evaluation: evaluation_settings,
        report: report_settings,
        log: log_settings,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log_settings.filter)
        .with_ansi(true)
        .init();

    let topology = topology_settings.to_topology().unwrap_or_else(|err| {
        error!("invalid topology: {}", err);
        process::exit(1);
    });

    let partition = Arc::new(SyntheticPartition::seeded(
        &topology_settings.node_ids(),
        &simulation_settings,
        training_settings.seed,
    ));
    let trainer = Arc::new(QuadraticTrainer::new(
        partition.clone(),
        simulation_settings.learning_rate,
    ));

    let mut initializer = StateMachineInitializer::new(
        training_settings,
        algorithm_settings,
        topology,
        initial_state(simulation_settings.dimensions),
        trainer,
    );
    if evaluation_settings.global_model {
        initializer = initializer.with_evaluator(Arc::new(QuadraticEvaluator::new(partition)));
    }

    let (state_machine, _event_subscriber) = initializer.init().unwrap_or_else(|err| {
        error!("failed to initialize state machine: {}", err);
        process::exit(1);
    });

    let shutdown = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", err);
            future::pending::<()>().await;
        }
    };
    let (history, exit_code) = match state_machine.run_until(shutdown).await {
        Ok(summary) => (summary.history, None),
        Err(err) => {
            error!("shutting down: {}", err);
            let exit_code = match err.error {
                PhaseError::Interrupted => 130,
                _ => 1,
            };
            (err.history, Some(exit_code))
        }
    };

    if let Some(path) = report_settings.path {
        if let Err(err) = history.write_json(&path) {
            error!("failed to write the run report to {}: {:?}", path.display(), err);
            process::exit(1);
        }
        info!("run report written to {}", path.display());
    }

    if let Some(exit_code) = exit_code {
        process::exit(exit_code);
    }
}
