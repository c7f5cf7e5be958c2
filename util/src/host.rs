//! Host platform utility functions

use std::{env, path::PathBuf};

/// Environment variable which must point at the root of the software checkout, i.e. the
/// directory containing `params` and `sessions`.
pub const SW_ROOT_ENV_VAR: &str = "STEER_SW_ROOT";

/// Get the software root directory from the environment.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
