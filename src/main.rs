use std::path::{Path, PathBuf};

use clap::Parser;

use wasting_model::artifact::ContextArtifactExt;
use wasting_model::error::ModelError;
use wasting_model::global_properties::ContextGlobalPropertiesExt;
use wasting_model::log::{error, info, set_log_level, LevelFilter};
use wasting_model::parameters::{init_parameters, Parameters, Scenario};
use wasting_model::random::ContextRandomExt;
use wasting_model::{population, reports, sq_lns, wasting, Context};

/// Individual-based childhood wasting simulation
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the parameters JSON file
    #[arg(short, long)]
    input: PathBuf,

    /// Override the scenario from the parameters file
    #[arg(long)]
    scenario: Option<Scenario>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the population size
    #[arg(long)]
    population: Option<usize>,

    /// Override the Monte Carlo draw to load
    #[arg(long)]
    draw: Option<u32>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() {
    let args = Args::parse();
    set_log_level(args.log_level);
    if let Err(error) = run(&args) {
        error!("{error}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ModelError> {
    let mut context = Context::new();
    init_parameters(&mut context, &args.input)?;

    let mut parameters = context.get_global_property_value(Parameters).clone();
    if let Some(scenario) = args.scenario {
        parameters.scenario = scenario;
    }
    if let Some(seed) = args.seed {
        parameters.seed = seed;
    }
    if let Some(population) = args.population {
        parameters.population = population;
    }
    if let Some(draw) = args.draw {
        parameters.draw = draw;
    }
    context.set_global_property_value(Parameters, parameters.clone());
    info!(
        "scenario {}, draw {}, seed {}, {} children",
        parameters.scenario, parameters.draw, parameters.seed, parameters.population
    );

    context.init_random(parameters.seed);
    context.load_artifact(Path::new(&parameters.data_dir))?;

    wasting::init(&mut context)?;
    sq_lns::init(&mut context)?;
    population::init(&mut context)?;
    reports::init(
        &mut context,
        Path::new(&parameters.output_file),
        Path::new(&parameters.transition_output_file),
    )?;

    let steps = (parameters.max_time / parameters.step_size).ceil() as usize;
    info!(
        "running {steps} steps of {} days",
        parameters.step_size
    );
    for _ in 0..steps {
        context.step(parameters.step_size);
    }
    info!(
        "simulation complete at day {}",
        context.get_current_time()
    );
    Ok(())
}
