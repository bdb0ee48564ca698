//! Process-start telemetry bootstrap. Delegates the actual subscriber construction to
//! `models::telemetry`, which both the controller and (in principle) any future sibling binary
//! share.

pub fn init() -> Result<(), models::telemetry::TelemetryConfigError> {
    models::telemetry::init_telemetry_from_env()
}
