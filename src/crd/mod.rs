//! Custom Resource Definitions (CRDs) for the Azure infrastructure provider.
//!
//! - `AzureCluster` / `AzureClusterTemplate`: self-managed cluster infrastructure
//! - `AzureMachine` / `AzureMachineTemplate`: individual virtual machines
//! - `AzureManagedControlPlane` / `AzureManagedControlPlaneTemplate`: AKS control planes
//! - `AzureManagedMachinePool` / `AzureManagedMachinePoolTemplate`: AKS agent pools
//!
//! `capi` holds the read-only view of the owning Cluster API `Cluster`.

mod azure_cluster;
mod azure_machine;
pub mod capi;
pub mod common;
mod managed_control_plane;
mod managed_machine_pool;

pub use azure_cluster::*;
pub use azure_machine::*;
pub use common::*;
pub use managed_control_plane::*;
pub use managed_machine_pool::*;
