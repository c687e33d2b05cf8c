//! Core data types shared by the simulator, severity evaluator and optimizer

mod history;
mod optimizer;
mod patient;
mod rollout;
mod stim;

pub use history::*;
pub use optimizer::*;
pub use patient::*;
pub use rollout::*;
pub use stim::*;
