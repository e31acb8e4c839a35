//! Stack controller: per-resource state machine and the event loop
//!
//! One pass per `Stack` event:
//!
//! 1. Re-read the resource; gone means done
//! 2. Empty status: report `working`
//! 3. Deletion requested: uninstall (only while our finalizer is present),
//!    then release the finalizer
//! 4. Finalizer missing: add it and requeue; nothing destructive happens
//!    before it is recorded
//! 5. Otherwise install, reporting `success` or `failure`
//!
//! Each install/uninstall runs under the configured deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use serde_json::json;

use crate::charts::HelmCli;
use crate::cluster::KubeCluster;
use crate::config::ControllerConfig;
use crate::crd::{Stack, StackStatus};
use crate::error::{KubeError, Result};
use crate::manifests::HttpManifestSource;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{Operation, Pipeline};
use crate::releases::{GITHUB_API, GithubReleases};
use crate::storage::ConfigMapLedgerStore;

/// Reads and updates `Stack` resources
#[async_trait]
pub trait StackClient: Send + Sync {
    /// Current state of the resource, `None` once it is gone
    async fn get(&self, name: &str) -> Result<Option<Stack>>;

    /// Replace the reported status, returning the updated resource
    async fn update_status(&self, stack: &Stack, status: &StackStatus) -> Result<Stack>;

    /// Replace the finalizer list; conflicts when `stack` is stale
    async fn set_finalizers(&self, stack: &Stack, finalizers: Vec<String>) -> Result<()>;
}

/// [`StackClient`] over the API server
#[derive(Clone)]
pub struct KubeStackClient {
    api: Api<Stack>,
}

impl KubeStackClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl StackClient for KubeStackClient {
    async fn get(&self, name: &str) -> Result<Option<Stack>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn update_status(&self, stack: &Stack, status: &StackStatus) -> Result<Stack> {
        // explicit nulls clear fields a previous pass reported
        let patch = json!({
            "status": {
                "statusCode": status.status_code,
                "reasonOfFailure": status.reason_of_failure,
            }
        });
        Ok(self
            .api
            .patch_status(&stack.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn set_finalizers(&self, stack: &Stack, finalizers: Vec<String>) -> Result<()> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": stack.resource_version(),
            }
        });
        self.api
            .patch(&stack.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// What to do after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Wait for the next change
    Done,
    Requeue(Duration),
    /// Run again right away (finalizer just added)
    RequeueNow,
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Done => Action::await_change(),
            ReconcileOutcome::Requeue(after) => Action::requeue(after),
            ReconcileOutcome::RequeueNow => Action::requeue(Duration::ZERO),
        }
    }
}

/// Drives one `Stack` towards its desired state
pub struct Reconciler {
    orchestrator: Orchestrator,
    stacks: Arc<dyn StackClient>,
    config: ControllerConfig,
}

impl Reconciler {
    pub fn new(
        orchestrator: Orchestrator,
        stacks: Arc<dyn StackClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            orchestrator,
            stacks,
            config,
        }
    }

    /// Run one pass for the named stack
    pub async fn reconcile_stack(&self, name: &str) -> Result<ReconcileOutcome> {
        let stack = match self.stacks.get(name).await {
            Ok(Some(stack)) => stack,
            Ok(None) => {
                tracing::debug!(stack = name, "stack gone");
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => {
                tracing::error!(stack = name, error = %e, "failed to get stack");
                return Ok(ReconcileOutcome::Requeue(self.config.requeue_after_fetch_error));
            }
        };

        // later writes need the resourceVersion the status update produced
        let stack = if stack.status_code().is_none() {
            self.stacks
                .update_status(&stack, &StackStatus::working())
                .await?
        } else {
            stack
        };

        if stack.is_deleting() {
            return self.process_deletion(&stack).await;
        }

        if !stack.has_finalizer() {
            self.stacks
                .set_finalizers(&stack, stack.finalizers_with_ours())
                .await?;
            tracing::debug!(stack = name, "finalizer added");
            return Ok(ReconcileOutcome::RequeueNow);
        }

        self.process_install(&stack).await
    }

    async fn process_install(&self, stack: &Stack) -> Result<ReconcileOutcome> {
        match self.run_pass(stack, Operation::Install).await {
            Ok(()) => {
                self.stacks
                    .update_status(stack, &StackStatus::success())
                    .await?;
                Ok(ReconcileOutcome::Done)
            }
            Err(e) => self.pass_failed(stack, Operation::Install, e).await,
        }
    }

    async fn process_deletion(&self, stack: &Stack) -> Result<ReconcileOutcome> {
        if !stack.has_finalizer() {
            tracing::info!(stack = %stack.name_any(), "finalizer already removed");
            return Ok(ReconcileOutcome::Done);
        }

        match self.run_pass(stack, Operation::Uninstall).await {
            Ok(()) => {
                self.stacks
                    .set_finalizers(stack, stack.finalizers_without_ours())
                    .await?;
                Ok(ReconcileOutcome::Done)
            }
            Err(e) => self.pass_failed(stack, Operation::Uninstall, e).await,
        }
    }

    async fn run_pass(&self, stack: &Stack, operation: Operation) -> Result<()> {
        let request = stack.request()?;
        let timeout = self.config.reconcile_timeout;
        let pass = async {
            match operation {
                Operation::Install => self.orchestrator.add(&request).await,
                Operation::Uninstall => self.orchestrator.remove(&request).await,
            }
        };
        tokio::time::timeout(timeout, pass)
            .await
            .map_err(|_| KubeError::Cancelled(timeout))?
    }

    async fn pass_failed(
        &self,
        stack: &Stack,
        operation: Operation,
        error: KubeError,
    ) -> Result<ReconcileOutcome> {
        let name = stack.name_any();
        if error.is_cancelled() {
            tracing::warn!(stack = %name, %operation, error = %error, "pass cancelled, will retry");
            return Ok(ReconcileOutcome::Requeue(self.config.requeue_after_failure));
        }

        tracing::error!(stack = %name, %operation, error = %error, "failed to {operation} app");
        let reason = format!("{error}\nFailed to {operation} app");
        self.stacks
            .update_status(stack, &StackStatus::failure(reason))
            .await?;

        // the request itself is wrong; the next spec edit triggers a new pass
        if !error.is_retryable() {
            return Ok(ReconcileOutcome::Done);
        }
        Ok(ReconcileOutcome::Requeue(self.config.requeue_after_failure))
    }
}

async fn reconcile(stack: Arc<Stack>, reconciler: Arc<Reconciler>) -> Result<Action> {
    let name = stack.name_any();
    tracing::info!(stack = %name, "reconciling stack");
    Ok(reconciler.reconcile_stack(&name).await?.into())
}

fn error_policy(stack: Arc<Stack>, error: &KubeError, reconciler: Arc<Reconciler>) -> Action {
    tracing::warn!(stack = %stack.name_any(), error = %error, "reconcile failed");
    Action::requeue(reconciler.config.requeue_after_failure)
}

/// Wire up the real backends and run until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    let cluster = Arc::new(KubeCluster::new(client.clone(), config.field_manager.clone()).await?);
    let manifests = Arc::new(HttpManifestSource::new(config.http_timeout)?);
    let releases = GithubReleases::new(config.http_timeout, config.github_token.clone()).map_err(
        |e| KubeError::Fetch {
            url: GITHUB_API.to_string(),
            message: e.to_string(),
        },
    )?;
    let store = ConfigMapLedgerStore::new(
        client.clone(),
        config.ledger_namespace.clone(),
        config.ledger_name.clone(),
    );

    let pipeline = Pipeline::new(
        cluster.clone(),
        Arc::new(HelmCli::new(config.helm_bin.clone())),
        manifests,
    );
    let orchestrator = Orchestrator::new(
        pipeline,
        Arc::new(store),
        Arc::new(releases),
        cluster,
        config.conflict_retry,
    );
    let reconciler = Arc::new(Reconciler::new(
        orchestrator,
        Arc::new(KubeStackClient::new(client.clone())),
        config,
    ));

    tracing::info!("starting stack controller");
    Controller::new(Api::<Stack>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => tracing::debug!(stack = %object.name, "reconciled"),
                Err(e) => tracing::warn!(error = %e, "controller error"),
            }
        })
        .await;
    tracing::info!("stack controller stopped");
    Ok(())
}
