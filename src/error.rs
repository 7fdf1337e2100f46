use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Malformed instance: {0}")]
  MalformedInstance(String),

  #[error("Invalid number in instance: {0}")]
  Parse(#[from] ParseIntError),

  #[error("Missing parameter: {0}")]
  MissingParameters(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Unable to build worker pool: {0}")]
  Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
