pub mod config;
pub mod global;
pub mod metrics;
pub mod objective;
pub mod pipeline;
pub mod types;

// Re-export optimization backends for easy access inside the library
pub use cmaes_lbfgsb::cmaes;
pub use cmaes_lbfgsb::lbfgsb_optimize;
