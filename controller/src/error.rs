use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to configure telemetry: '{}'", source))]
    TelemetryConfiguration {
        source: models::telemetry::TelemetryConfigError,
    },

    #[snafu(display("Unable to load operator configuration: '{}'", source))]
    LoadConfig { source: models::config::ConfigError },

    #[snafu(display("Unable to create a Kubernetes client: '{}'", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Unable to register metrics: '{}'", source))]
    MetricsRegistration { source: prometheus::Error },

    #[snafu(display("Unable to build the alertmanager client: '{}'", source))]
    SilenceClientCreate { source: models::silence::SilenceError },
}

pub type Result<T> = std::result::Result<T, Error>;
