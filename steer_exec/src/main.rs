//! Main steering executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session and logging
//!     - Load the executable parameters
//!     - Initialise SteerCtrl, so that parameter errors are reported before the simulator
//!       connects
//!     - Serve simulator connections:
//!         - Telemetry decoding
//!         - Steering control processing
//!         - Steering command encoding
//!     - Exit when a tuning run completes or the session limit is reached
//!
//! # Usage
//!
//! ```text
//! steer_exec [--tuning] [--params-file <file>] [kp ki kd]
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::WrapErr};
use log::info;
use structopt::StructOpt;

// Internal
use steer_lib::{
    params::SteerExecParams,
    sim_server::{ServerExit, SimServer},
    steer_ctrl::{GainOverrides, SteerCtrl, SteerCtrlInit}
};
use util::{
    module::State,
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gain scheduled PID steering controller for the driving simulator.
#[derive(Debug, StructOpt)]
#[structopt(name = "steer_exec")]
struct Args {
    /// Base proportional gain, overrides the parameter file
    #[structopt(allow_hyphen_values = true)]
    k_p: Option<f64>,

    /// Base integral gain, overrides the parameter file
    #[structopt(allow_hyphen_values = true)]
    k_i: Option<f64>,

    /// Base derivative gain, overrides the parameter file
    #[structopt(allow_hyphen_values = true)]
    k_d: Option<f64>,

    /// Enable tuning mode regardless of the parameter file
    #[structopt(long)]
    tuning: bool,

    /// SteerCtrl parameter file, relative to the params directory
    #[structopt(long, default_value = "steer_ctrl.toml")]
    params_file: String
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let args = Args::from_args();

    // Initialise session
    let session = Session::new(
        "steer_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Steering Controller Executable\n");
    info!("Session directory: {:?}", session.session_root);
    info!("CLI arguments: {:?}\n", args);

    // ---- LOAD PARAMETERS ----

    let exec_params: SteerExecParams = util::params::load(
        "steer_exec.toml"
    ).wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let init_data = SteerCtrlInit {
        params_file: args.params_file.clone(),
        gain_overrides: GainOverrides {
            k_p: args.k_p,
            k_i: args.k_i,
            k_d: args.k_d
        },
        force_tuning: args.tuning
    };

    let mut first_ctrl = Some(init_steer_ctrl(&init_data, &session)
        .wrap_err("Failed to initialise SteerCtrl")?);
    info!("SteerCtrl init complete\n");

    // ---- INITIALISE NETWORK ----

    let server = SimServer::bind(&exec_params)
        .wrap_err("Failed to initialise the SimServer")?;

    match server.local_addr() {
        Some(a) => info!("Waiting for the simulator on {}\n", a),
        None => info!("Waiting for the simulator on {}\n", exec_params.sim_endpoint)
    }

    // ---- MAIN LOOP ----

    // The first connection uses the already initialised module, later ones get a fresh one
    let exit = server.run(|| match first_ctrl.take() {
        Some(c) => Ok(c),
        None => init_steer_ctrl(&init_data, &session)
    }).wrap_err("SimServer failed")?;

    match exit {
        ServerExit::TuningComplete(summary) => {
            info!("Tuning run complete after {} samples", summary.num_samples);
            match summary.mean_sq_error {
                Some(mse) => info!("Mean squared CTE: {:.6}", mse),
                None => info!("Mean squared CTE: -")
            }
        },
        ServerExit::SessionLimit(n) => info!("Served {} simulator sessions", n)
    }

    // ---- SHUTDOWN ----

    info!("End of execution");
    session.exit();

    Ok(())
}

/// Build and initialise a new SteerCtrl.
fn init_steer_ctrl(
    init_data: &SteerCtrlInit,
    session: &Session
) -> Result<SteerCtrl, steer_lib::steer_ctrl::SteerCtrlError> {
    let mut ctrl = SteerCtrl::default();
    ctrl.init(init_data.clone(), session)?;
    Ok(ctrl)
}
