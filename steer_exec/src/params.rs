//! # Steering Executable Parameters
//!
//! This module provide parameters for the steering executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteerExecParams {

    /// Network endpoint the simulator connects to
    pub sim_endpoint: String,

    /// Number of simulator connections to serve before exiting, zero for no limit
    #[serde(default)]
    pub max_sessions: usize
}
