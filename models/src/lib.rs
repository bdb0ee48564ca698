pub mod clock;
pub mod config;
pub mod constants;
pub mod drain;
pub mod external;
pub mod health;
pub mod kubeclient;
pub mod metrics;
pub mod scaler;
pub mod silence;
pub mod telemetry;
pub mod upgradeconfig;

pub use clock::Clock;
pub use config::OperatorConfig;
pub use kubeclient::KubeClient;
pub use upgradeconfig::{Phase, UpgradeConfig, UpgradeConfigSpec, UpgradeConfigStatus, UpgradeHistory};
