//! Port traits: the collaborators the core depends on.

pub mod config_port;
pub mod price_port;
pub mod results_port;
pub mod signal_log_port;
