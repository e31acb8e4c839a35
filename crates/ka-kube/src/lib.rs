//! ka Kube - Kubernetes integration for the ka addon controller
//!
//! This crate provides:
//! - The `Stack` custom resource and the controller reconciling it
//! - A component pipeline applying manifest bundles and chart releases
//! - Ledger storage drivers recording what is installed
//! - Post-processing hooks (node annotation for the wasm stacks)
//! - A GitHub-backed release lookup

pub mod charts;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod hooks;
pub mod manifests;
pub mod orchestrator;
pub mod pipeline;
pub mod releases;
pub mod retry;
pub mod storage;

pub use charts::{ChartBackend, ChartEvent, HelmCli, MockCharts};
pub use cluster::{ClusterApi, ClusterEvent, KubeCluster, MockCluster, ResolvedResource};
pub use config::ControllerConfig;
pub use controller::{KubeStackClient, ReconcileOutcome, Reconciler, StackClient, run};
pub use crd::{STACK_FINALIZER, Stack, StackSpec, StackStatus, StatusCode};
pub use error::{KubeError, Result};
pub use manifests::{HttpManifestSource, ManifestDocument, ManifestSource, StaticManifests};
pub use orchestrator::Orchestrator;
pub use pipeline::{Operation, Pipeline};
pub use releases::GithubReleases;
pub use retry::{RetryPolicy, retry_on_conflict};
pub use storage::{ConfigMapLedgerStore, LedgerStore, MockLedgerStore};
