//! Chart release backend
//!
//! [`HelmCli`] drives the `helm` executable: the repository is registered,
//! then every chart of the component is upgraded-or-installed in order with
//! its values piped in as JSON. Uninstall walks the charts backwards.

use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use ka_core::{ChartApp, ChartSpec};
use tokio::io::AsyncWriteExt;

use crate::error::{KubeError, Result};

/// Installs and removes chart releases
#[async_trait]
pub trait ChartBackend: Send + Sync {
    /// Install or upgrade every chart of `app`, in order
    async fn deploy(&self, app: &ChartApp) -> Result<()>;

    /// Remove every chart of `app`, in reverse order
    async fn uninstall(&self, app: &ChartApp) -> Result<()>;
}

/// [`ChartBackend`] shelling out to `helm`
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm_bin: String,
}

impl HelmCli {
    pub fn new(helm_bin: impl Into<String>) -> Self {
        Self {
            helm_bin: helm_bin.into(),
        }
    }

    async fn run(&self, release: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String> {
        tracing::debug!(release, args = %args.join(" "), "running helm");
        let chart_error = |message: String| KubeError::Chart {
            release: release.to_string(),
            message,
        };

        let mut child = tokio::process::Command::new(&self.helm_bin)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a pass that hits its deadline must not leave helm running
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| chart_error(format!("failed to spawn {}: {e}", self.helm_bin)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|e| chart_error(format!("failed to write values: {e}")))?;
            // closing stdin lets helm finish reading the values
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| chart_error(format!("failed to wait for helm: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(chart_error(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl ChartBackend for HelmCli {
    async fn deploy(&self, app: &ChartApp) -> Result<()> {
        if !app.repo_url.is_empty() {
            self.run(&app.repo_name, &repo_add_args(app), None).await?;
            self.run(
                &app.repo_name,
                &["repo".to_string(), "update".to_string(), app.repo_name.clone()],
                None,
            )
            .await?;
        }

        for chart in &app.charts {
            let values = serde_json::to_vec(&chart.args.clone().unwrap_or_default())?;
            self.run(&chart.release_name, &upgrade_args(chart), Some(&values))
                .await?;
            tracing::info!(
                release = %chart.release_name,
                namespace = %chart.namespace,
                chart = chart.location(),
                "chart release deployed"
            );
        }
        Ok(())
    }

    async fn uninstall(&self, app: &ChartApp) -> Result<()> {
        for chart in app.charts.iter().rev() {
            match self
                .run(&chart.release_name, &uninstall_args(chart), None)
                .await
            {
                Ok(_) => {
                    tracing::info!(release = %chart.release_name, "chart release removed");
                }
                // helm releases older than --ignore-not-found still report this
                Err(KubeError::Chart { message, .. }) if is_release_not_found(&message) => {
                    tracing::debug!(release = %chart.release_name, "chart release already gone");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// helm's wording for an uninstall of a release it does not know
fn is_release_not_found(stderr: &str) -> bool {
    stderr.contains("release: not found")
}

fn repo_add_args(app: &ChartApp) -> Vec<String> {
    vec![
        "repo".to_string(),
        "add".to_string(),
        app.repo_name.clone(),
        app.repo_url.clone(),
        "--force-update".to_string(),
    ]
}

fn upgrade_args(chart: &ChartSpec) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        chart.release_name.clone(),
        chart.location().to_string(),
        "--namespace".to_string(),
        chart.namespace.clone(),
    ];
    if chart.create_namespace {
        args.push("--create-namespace".to_string());
    }
    if let Some(version) = chart.pinned_version() {
        args.push("--version".to_string());
        args.push(version.to_string());
    }
    args.push("--values".to_string());
    args.push("-".to_string());
    args
}

fn uninstall_args(chart: &ChartSpec) -> Vec<String> {
    vec![
        "uninstall".to_string(),
        chart.release_name.clone(),
        "--namespace".to_string(),
        chart.namespace.clone(),
        "--ignore-not-found".to_string(),
    ]
}

/// A call seen by [`MockCharts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartEvent {
    Deploy(String),
    Uninstall(String),
}

#[derive(Default)]
struct MockChartsState {
    events: Vec<ChartEvent>,
    failing_releases: Vec<String>,
}

/// In-memory [`ChartBackend`] for testing
#[derive(Clone, Default)]
pub struct MockCharts {
    state: Arc<RwLock<MockChartsState>>,
}

impl MockCharts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call touching this release fail
    pub fn fail_release(&self, release: impl Into<String>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_releases
            .push(release.into());
    }

    pub fn clear_failures(&self) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_releases
            .clear();
    }

    /// Release calls so far, in order
    pub fn events(&self) -> Vec<ChartEvent> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .clone()
    }

    fn record(&self, chart: &ChartSpec, event: ChartEvent) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.failing_releases.contains(&chart.release_name) {
            return Err(KubeError::Chart {
                release: chart.release_name.clone(),
                message: "injected failure".to_string(),
            });
        }
        state.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl ChartBackend for MockCharts {
    async fn deploy(&self, app: &ChartApp) -> Result<()> {
        for chart in &app.charts {
            self.record(chart, ChartEvent::Deploy(chart.release_name.clone()))?;
        }
        Ok(())
    }

    async fn uninstall(&self, app: &ChartApp) -> Result<()> {
        for chart in app.charts.iter().rev() {
            self.record(chart, ChartEvent::Uninstall(chart.release_name.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chart(release: &str, version: &str) -> ChartSpec {
        ChartSpec {
            name: format!("istio/{release}"),
            version: version.to_string(),
            release_name: release.to_string(),
            namespace: "istio-system".to_string(),
            create_namespace: true,
            args: None,
            chart_ref: None,
        }
    }

    fn app() -> ChartApp {
        ChartApp {
            repo_url: "https://istio-release.storage.googleapis.com/charts".to_string(),
            repo_name: "istio".to_string(),
            charts: vec![chart("istio-base", "1.22.4"), chart("istiod", "1.22.4")],
        }
    }

    #[test]
    fn test_upgrade_args_pin_version() {
        let args = upgrade_args(&chart("istio-base", "1.22.4"));
        assert_eq!(
            args,
            [
                "upgrade",
                "--install",
                "istio-base",
                "istio/istio-base",
                "--namespace",
                "istio-system",
                "--create-namespace",
                "--version",
                "1.22.4",
                "--values",
                "-",
            ]
        );
    }

    #[test]
    fn test_upgrade_args_latest_and_oci() {
        let mut spec = chart("spin-operator", "latest");
        spec.create_namespace = false;
        spec.chart_ref = Some("oci://ghcr.io/spinkube/charts/spin-operator".to_string());

        let args = upgrade_args(&spec);
        assert!(!args.contains(&"--version".to_string()));
        assert!(!args.contains(&"--create-namespace".to_string()));
        assert_eq!(args[3], "oci://ghcr.io/spinkube/charts/spin-operator");
    }

    #[test]
    fn test_repo_and_uninstall_args() {
        let app = app();
        assert_eq!(
            repo_add_args(&app),
            [
                "repo",
                "add",
                "istio",
                "https://istio-release.storage.googleapis.com/charts",
                "--force-update",
            ]
        );
        assert_eq!(
            uninstall_args(&app.charts[1]),
            ["uninstall", "istiod", "--namespace", "istio-system", "--ignore-not-found"]
        );
    }

    #[tokio::test]
    async fn test_mock_uninstalls_in_reverse() {
        let charts = MockCharts::new();
        charts.deploy(&app()).await.unwrap();
        charts.uninstall(&app()).await.unwrap();
        assert_eq!(
            charts.events(),
            [
                ChartEvent::Deploy("istio-base".into()),
                ChartEvent::Deploy("istiod".into()),
                ChartEvent::Uninstall("istiod".into()),
                ChartEvent::Uninstall("istio-base".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_failure_stops_deploy() {
        let charts = MockCharts::new();
        charts.fail_release("istiod");
        let err = charts.deploy(&app()).await.unwrap_err();
        assert!(matches!(err, KubeError::Chart { ref release, .. } if release == "istiod"));
        assert_eq!(charts.events(), [ChartEvent::Deploy("istio-base".into())]);
    }

    #[test]
    fn test_only_missing_releases_are_tolerated() {
        assert!(is_release_not_found(
            "Error: uninstall: Release not loaded: istiod: release: not found"
        ));
        assert!(!is_release_not_found(
            "Error: namespaces \"istio-system\" not found"
        ));
        assert!(!is_release_not_found(
            "Error: Kubernetes cluster unreachable: context \"kind\" not found"
        ));
    }

    #[cfg(unix)]
    fn stub_helm(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("helm");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_deploy_kills_helm() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("finished");
        let helm = HelmCli::new(stub_helm(
            dir.path(),
            &format!("sleep 1\ntouch '{}'", marker.display()),
        ));

        let deploy = tokio::time::timeout(Duration::from_millis(200), helm.deploy(&app())).await;
        assert!(deploy.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_uninstall_surfaces_other_helm_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let helm = HelmCli::new(stub_helm(
            dir.path(),
            "echo 'Error: namespaces \"istio-system\" not found' >&2\nexit 1",
        ));

        let err = helm.uninstall(&app()).await.unwrap_err();
        assert!(matches!(err, KubeError::Chart { ref release, .. } if release == "istiod"));
    }

    #[tokio::test]
    async fn test_missing_helm_binary_is_a_chart_error() {
        let helm = HelmCli::new("/nonexistent/helm-binary");
        let err = helm.deploy(&app()).await.unwrap_err();
        assert!(matches!(err, KubeError::Chart { ref release, .. } if release == "istio"));
    }
}
