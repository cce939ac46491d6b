//! Wires the collector's transport endpoint to its [`RunControl`]: remote
//! start/end-of-run requests arrive as small JSON control messages inside
//! a [`Buffer`], decoded here and turned into `start_new_run`/
//! `end_current_run` calls. Commands are fire-and-forget, so
//! the outcome is logged rather than returned to the sender.

use std::collections::HashMap;
use std::sync::Arc;

use dqm_runcontrol::{Run, RunControl};
use dqm_transport::{Buffer, Transport};
use serde::Deserialize;
use tracing::{info, warn};

const START_RUN_COMMAND: &str = "run_control/start_run";
const END_RUN_COMMAND: &str = "run_control/end_run";

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    number: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    detector_name: String,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndRunRequest {
    #[serde(default)]
    parameters: HashMap<String, String>,
    #[serde(default)]
    password: Option<String>,
}

/// Registers the `run_control/start_run` and `run_control/end_run` command
/// handlers on `transport`, both driving `run_control`.
pub async fn register(transport: &dyn Transport, run_control: Arc<RunControl>) -> dqm_transport::Result<()> {
    let start_rc = run_control.clone();
    transport
        .create_command_handler(
            START_RUN_COMMAND,
            Arc::new(move |payload: Buffer| {
                let request: StartRunRequest = match payload.as_str().map(serde_json::from_str) {
                    Some(Ok(request)) => request,
                    Some(Err(error)) => {
                        warn!(%error, "malformed start_run command payload");
                        return;
                    }
                    None => {
                        warn!("start_run command payload was not text");
                        return;
                    }
                };
                let run = match Run::new(request.number, request.description, request.detector_name) {
                    Ok(run) => run,
                    Err(error) => {
                        warn!(%error, "rejected start_run command");
                        return;
                    }
                };
                let status = start_rc.start_new_run(run, request.password.as_deref());
                info!(%status, "start_run command processed");
            }),
        )
        .await?;

    let end_rc = run_control;
    transport
        .create_command_handler(
            END_RUN_COMMAND,
            Arc::new(move |payload: Buffer| {
                let request: EndRunRequest = match payload.as_str() {
                    Some(text) => match serde_json::from_str(text) {
                        Ok(request) => request,
                        Err(error) => {
                            warn!(%error, "malformed end_run command payload");
                            return;
                        }
                    },
                    None if payload.is_null() => EndRunRequest { parameters: HashMap::new(), password: None },
                    None => {
                        warn!("end_run command payload was not text");
                        return;
                    }
                };
                let status = end_rc.end_current_run(request.parameters, request.password.as_deref());
                info!(%status, "end_run command processed");
            }),
        )
        .await?;

    Ok(())
}
