pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod parser;
pub mod solver;

#[cfg(test)]
mod fixtures;
