// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod align;
mod config;
mod db;
mod error;
mod formats;
mod io;
mod loader;
mod pipeline;
mod store;
mod telemetry;

#[cfg(test)]
mod integ_tests;
