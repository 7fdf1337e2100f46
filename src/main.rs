#[macro_use]
extern crate log;

use clap::{App, Arg, ArgMatches};
use safa::config::{known_best, InstanceParameters, ParameterOverrides};
use safa::error::{Error, Result};
use safa::parser::read_instance;
use safa::solver::registry::Strategy;
use safa::solver::safa::{BeaconPolicy, Config, HybridMode, Orchestrator};
use safa::solver::{calculate_cmax, print_solution, verify_solution, CandidateMode, ImprovementPolicy};
use std::path::Path;
use std::process;
use std::str::FromStr;

fn main() {
  env_logger::init();

  if let Err(e) = run() {
    error!("{}", e);
    eprintln!("error: {}", e);
    process::exit(1);
  }
}

fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
  return match matches.value_of(name) {
    Some(value) => value
      .parse()
      .map(Some)
      .map_err(|_| Error::MissingParameters(format!("invalid value '{}' for --{}", value, name))),
    None => Ok(None),
  };
}

fn run() -> Result<()> {
  let matches = App::new("safa")
    .version("0.1")
    .about("Hybrid simulated annealing and firefly search for the job shop scheduling problem")
    .arg(
      Arg::with_name("instance")
        .long("instance")
        .help("Instance file name")
        .takes_value(true)
        .required(true),
    )
    .arg(
      Arg::with_name("benchmark")
        .long("benchmark")
        .help("Benchmark name for the parameter table (defaults to the file stem)")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("seed")
        .long("seed")
        .help("Seed for rng")
        .takes_value(true)
        .default_value("0"),
    )
    .arg(
      Arg::with_name("trials")
        .long("trials")
        .help("Number of independent trials")
        .takes_value(true)
        .default_value("1"),
    )
    .arg(
      Arg::with_name("workers")
        .long("workers")
        .help("Size of the worker pool")
        .takes_value(true)
        .default_value("5"),
    )
    .arg(
      Arg::with_name("hybrid")
        .long("hybrid")
        .help("How the population chases the beacon")
        .possible_values(&["rounds", "threaded"])
        .takes_value(true)
        .default_value("rounds"),
    )
    .arg(
      Arg::with_name("beacon")
        .long("beacon")
        .help("Initial beacon after local search")
        .possible_values(&["best", "backbone"])
        .takes_value(true)
        .default_value("best"),
    )
    .arg(
      Arg::with_name("candidates")
        .long("candidates")
        .help("Flip candidates for local search and simulated annealing")
        .possible_values(&["random", "contended"])
        .takes_value(true)
        .default_value("random"),
    )
    .arg(
      Arg::with_name("policy")
        .long("policy")
        .help("Whether a search stops after publishing a new best")
        .possible_values(&["stop", "continue"])
        .takes_value(true)
        .default_value("stop"),
    )
    .arg(
      Arg::with_name("population")
        .long("population")
        .help("Population size (overrides the parameter table)")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("ls-iterations")
        .long("ls-iterations")
        .help("Maximum local search iterations (overrides the parameter table)")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("sa-start-temperature")
        .long("sa-start-temperature")
        .help("Start temperature (overrides the parameter table)")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("sa-cooling-rate")
        .long("sa-cooling-rate")
        .help("Cooling rate in (0, 1) (overrides the parameter table)")
        .takes_value(true),
    )
    .get_matches();

  let file = matches
    .value_of("instance")
    .ok_or_else(|| Error::MissingParameters("instance file".to_string()))?;
  let benchmark = match matches.value_of("benchmark") {
    Some(name) => Some(name.to_string()),
    None => Path::new(file)
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned()),
  };

  let overrides = ParameterOverrides {
    population: parse_value(&matches, "population")?,
    local_search_iterations: parse_value(&matches, "ls-iterations")?,
    start_temperature: parse_value(&matches, "sa-start-temperature")?,
    cooling_rate: parse_value(&matches, "sa-cooling-rate")?,
  };
  let seed: u64 = parse_value(&matches, "seed")?.unwrap_or(0);
  let trials: usize = parse_value(&matches, "trials")?.unwrap_or(1);
  let workers: usize = parse_value(&matches, "workers")?.unwrap_or(5);

  // Fail on bad input before any worker exists.
  let instance = read_instance(file)?;
  let params = InstanceParameters::resolve(benchmark.as_deref(), &overrides)?;
  info!(
    "Instance {} ({}x{}) with {:?}",
    benchmark.as_deref().unwrap_or(file),
    instance.n_jobs,
    instance.n_machines,
    params
  );

  let mut config = Config::from_parameters(&params, workers, seed);
  let mode = match matches.value_of("candidates") {
    Some("contended") => CandidateMode::MostContended,
    _ => CandidateMode::Random,
  };
  let policy = match matches.value_of("policy") {
    Some("continue") => ImprovementPolicy::ContinueToFloor,
    _ => ImprovementPolicy::StopOnImprovement,
  };
  config.local_search.mode = mode;
  config.annealing.mode = mode;
  config.annealing.policy = policy;
  config.hybrid.policy = policy;
  config.hybrid.mode = match matches.value_of("hybrid") {
    Some("threaded") => HybridMode::Threaded,
    _ => HybridMode::Rounds,
  };
  config.hybrid.beacon = match matches.value_of("beacon") {
    Some("backbone") => BeaconPolicy::Backbone,
    _ => BeaconPolicy::BestMakespan,
  };

  let orchestrator = Orchestrator::new(config)?;
  let summary = orchestrator.run(&instance, trials)?;

  let makespans: Vec<String> = summary
    .trials
    .iter()
    .map(|t| t.makespan().to_string())
    .collect();
  info!("Makespans per trial: {}", makespans.join(", "));
  for strategy in Strategy::ALL.iter() {
    info!(
      "Average updates by {}: {:.2}",
      strategy,
      summary.average_updates(*strategy)
    );
  }
  info!("Average trial time: {:.2?}", summary.average_elapsed());

  let best = match summary.best() {
    Some(best) => best,
    None => return Ok(()),
  };
  if let Some(optimum) = benchmark.as_deref().and_then(known_best) {
    let gap = 100.0 * (best.makespan() as f64 - optimum as f64) / optimum as f64;
    info!("Best known {}, gap {:.2}%", optimum, gap);
  }

  let solution = best.best.to_solution();
  if let Err(e) = verify_solution(&instance, &solution) {
    error!("Verification failed: {}", e);
    process::exit(2);
  }

  println!("{}", calculate_cmax(&instance, &solution));
  print_solution(&instance, &solution);

  Ok(())
}
