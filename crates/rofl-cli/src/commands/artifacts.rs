//! Implementation of the `rofl artifacts` commands.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rofl_deploy::artifacts::{ArtifactClient, ArtifactStore};
use rofl_deploy::{AuthToken, DeployConfig};

pub async fn upload(config: &DeployConfig, id: &str, file: &Path, token: &str) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let size = bytes.len();

    let client = ArtifactClient::new(config)?;
    client
        .upload(id, bytes, &AuthToken::new(token))
        .await
        .with_context(|| format!("failed to upload artifact '{id}'"))?;

    println!("Uploaded {id} ({size} bytes)");
    Ok(())
}

pub async fn download(config: &DeployConfig, id: &str, file: &Path, token: &str) -> Result<()> {
    let client = ArtifactClient::new(config)?;
    let Some(bytes) = client
        .download(id, &AuthToken::new(token))
        .await
        .with_context(|| format!("failed to download artifact '{id}'"))?
    else {
        bail!("Artifact '{id}' not found");
    };

    tokio::fs::write(file, &bytes)
        .await
        .with_context(|| format!("failed to write {}", file.display()))?;
    println!("Downloaded {id} to {} ({} bytes)", file.display(), bytes.len());
    Ok(())
}
