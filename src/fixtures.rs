use crate::data::Instance;
use crate::graph::Schedule;
use crate::parser::parse_instance;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

pub const FT06: &str = include_str!("../instances/ft06.txt");

/// Two jobs on two machines; with job 0 first everywhere the makespan is 9.
pub const TINY: &str = "2\t2\n0\t3\t1\t2\n0\t2\t1\t4\n";

pub fn ft06() -> Instance {
  return parse_instance(FT06).unwrap();
}

pub fn random_schedule(seed: u64) -> Schedule {
  let mut rng = ChaChaRng::seed_from_u64(seed);
  return Schedule::random(&ft06(), &mut rng).unwrap();
}
