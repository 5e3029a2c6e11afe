//! Implementation of the `rofl deploy` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rofl_deploy::deployment::{TemplateDescriptor, UserAppData};
use rofl_deploy::{
    AuthToken, Collaborators, DeployConfig, DeploymentFailure, DeploymentOrchestrator,
    DeploymentRequest, DeploymentStage, DeploymentStatus, Network,
};
use serde::de::DeserializeOwned;
use tracing::warn;

/// Arguments for the deploy command.
pub struct DeployArgs {
    /// Template file.
    pub template: PathBuf,
    /// App file.
    pub app: PathBuf,
    /// Target network.
    pub network: Network,
    /// Bearer token.
    pub token: String,
}

async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

async fn load_request(args: DeployArgs) -> Result<DeploymentRequest> {
    let template: TemplateDescriptor = read_yaml(&args.template).await?;
    let app: UserAppData = read_yaml(&args.app).await?;
    Ok(DeploymentRequest {
        auth_token: AuthToken::new(args.token),
        template,
        app,
        network: args.network,
    })
}

fn progress_line(status: &DeploymentStatus) -> String {
    let last = DeploymentStage::ALL.len() - 1;
    format!("[{}/{last}] {status}", status.stage().index())
}

fn failure_notes(failure: &DeploymentFailure) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(app_id) = &failure.app_id {
        notes.push(format!("App {app_id} is registered on-chain but not deployed."));
    }
    if failure.cause.is_timeout() {
        notes.push(format!(
            "The {} stage timed out; its timeout can be raised in the config file.",
            failure.stage
        ));
    }
    notes
}

pub async fn run(config: &DeployConfig, args: DeployArgs) -> Result<()> {
    let request = load_request(args).await?;
    let orchestrator =
        DeploymentOrchestrator::new(Collaborators::http(config)?, config.pipeline_settings());

    println!(
        "Deploying template '{}' to {}",
        request.template.id, request.network
    );
    let handle = orchestrator.spawn(request);
    println!("Deployment: {}", handle.id());

    let mut status = handle.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            let current = status.borrow_and_update().clone();
            println!("  {}", progress_line(&current));
            if current.is_terminal() || status.changed().await.is_err() {
                break;
            }
        }
    });

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling deployment");
            cancel.cancel();
        }
    });

    let result = handle.wait().await;
    progress.await.context("progress reporter failed")?;

    match result {
        Ok(outcome) => {
            println!();
            println!("App deployed!");
            println!("  App ID: {}", outcome.app_id);
            println!("  Image: {}", outcome.build.oci_reference);
            for receipt in &outcome.receipts {
                println!("  {} tx: {}", receipt.call, receipt.hash);
            }
            Ok(())
        }
        Err(failure) => {
            for note in failure_notes(&failure) {
                eprintln!("{note}");
            }
            Err(failure.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rofl_deploy::{AppId, DeployError};

    use super::*;

    const TEMPLATE: &str = r"
id: hello-world
manifest:
  name: hello-world
  version: 0.1.0
  resources:
    memory: 512
    cpus: 1
  deployments:
    default:
      network: testnet
      policy:
        endorsements:
          - any: {}
compose:
  services:
    app:
      image: ghcr.io/example/hello:latest
";

    const APP: &str = r"
metadata:
  name: my-app
  author: dev@example.com
  description: test
  version: 1.0.0
  homepage: ''
secrets:
  API_KEY: sk_live_123
offer:
  provider: oasis1qprovider
  offer: '0000000000000001'
  term: month
";

    #[tokio::test]
    async fn loads_request_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.yaml");
        let app = dir.path().join("app.yaml");
        std::fs::write(&template, TEMPLATE).unwrap();
        std::fs::write(&app, APP).unwrap();

        let request = load_request(DeployArgs {
            template,
            app,
            network: Network::Mainnet,
            token: "token".to_owned(),
        })
        .await
        .unwrap();

        assert_eq!(request.template.id, "hello-world");
        assert_eq!(request.template.compose.service_names(), vec!["app"]);
        assert_eq!(request.app.metadata.name, "my-app");
        assert_eq!(request.app.secrets["API_KEY"].expose(), "sk_live_123");
        assert_eq!(request.app.offer.term_count, 1);
        assert_eq!(request.network, Network::Mainnet);
    }

    #[test]
    fn progress_counts_stages() {
        let status = DeploymentStatus::Running {
            stage: DeploymentStage::Building,
        };
        assert_eq!(progress_line(&status), "[3/7] building");

        let done = DeploymentStatus::Running {
            stage: DeploymentStage::Done,
        };
        assert_eq!(progress_line(&done), "[7/7] done");
    }

    #[test]
    fn timeout_failure_points_at_config() {
        let failure = DeploymentFailure::new(
            DeploymentStage::AwaitingBuild,
            DeployError::BuildTimeout {
                elapsed: Duration::from_secs(297),
                attempts: 100,
            },
            Some(AppId::new("rofl1qqq")),
        );

        let notes = failure_notes(&failure);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("rofl1qqq"));
        assert!(notes[1].contains("awaiting_build"));
    }

    #[test]
    fn early_failure_has_no_notes() {
        let failure = DeploymentFailure::new(
            DeploymentStage::Creating,
            DeployError::SignatureDeclined,
            None,
        );
        assert!(failure_notes(&failure).is_empty());
    }

    #[tokio::test]
    async fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("missing.yaml");

        let err = load_request(DeployArgs {
            template: template.clone(),
            app: dir.path().join("app.yaml"),
            network: Network::Testnet,
            token: String::new(),
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("missing.yaml"));
    }
}
