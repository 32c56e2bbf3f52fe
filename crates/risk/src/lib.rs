pub mod exit;

pub use exit::{ExitDecision, ExitPolicy, SpikeExit};
