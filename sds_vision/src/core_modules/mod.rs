pub mod dataset;
pub mod image;
pub mod microtest;
pub mod swarm;
pub mod utils;
