pub mod aggregator;
pub mod agromanagement;
pub mod engine;
pub mod gdd;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod tracker;
pub mod weather;

#[cfg(test)]
pub(crate) mod testing;
