//! ka Core - Stack and component model for the ka addon controller
//!
//! This crate provides the cluster-independent half of ka:
//! - `ComponentOverrides` / `MergePolicy`: sparse overrides merged onto defaults
//! - `ComponentDescriptor`: a fully resolved chart release or manifest bundle
//! - `StackManifest`: an ordered group of components, built by `stacks::build`
//! - `StateLedger`: which stacks and components are currently applied
//! - `ReleaseLookup`: where "latest" versions come from

pub mod apps;
pub mod component;
pub mod error;
pub mod ledger;
pub mod overrides;
pub mod releases;
pub mod stack;
pub mod stacks;

pub use component::{ChartApp, ChartSpec, ComponentDescriptor, HandlerKind, ManifestBundle};
pub use error::{CoreError, Result};
pub use ledger::{AppState, ComponentState, StateLedger};
pub use overrides::{ComponentOverrides, LATEST, MergePolicy, merge_preserving};
pub use releases::{FixedReleases, ReleaseLookup, latest_release, newest_tag};
pub use stack::{StackManifest, StackOverrides, StackRequest, parse_overrides};
