//! Task controllers (§4.9): one module per session type, each driving
//! [`crate::cycle::runtime_cycle`] according to its own termination and
//! reward-resolution rules. Window checking is the odd one out — it
//! never touches the runtime loop at all.

pub mod experiment;
pub mod lick_training;
pub mod run_training;
pub mod window_checking;
