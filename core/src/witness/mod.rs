mod builder;

pub use builder::{BuilderOptions, RunReport, WitnessBuilder};
