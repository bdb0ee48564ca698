use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ScalerError {
    #[snafu(display("Unable to list machine sets: '{}'", source))]
    ListMachineSets { source: kube::Error },

    #[snafu(display("Unable to list machines: '{}'", source))]
    ListMachines { source: kube::Error },

    #[snafu(display("Unable to list nodes: '{}'", source))]
    ListNodes { source: kube::Error },

    #[snafu(display("No original (non-surge) worker machine set was found"))]
    NoOriginalMachineSet,

    #[snafu(display("Unable to create surge machine set '{}': '{}'", name, source))]
    CreateMachineSet { source: kube::Error, name: String },

    #[snafu(display("Unable to delete machine set '{}': '{}'", name, source))]
    DeleteMachineSet { source: kube::Error, name: String },

    #[snafu(display("Surge machine set '{}' did not become ready within the configured timeout", name))]
    ScaleTimeout { name: String },
}
