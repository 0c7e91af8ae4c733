use std::path::Path;

use tracing::info;

use crate::PlatformError;

/// Download a `.tar.gz` archive and unpack it into `dest`.
pub(crate) async fn download_and_extract(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), PlatformError> {
    info!(%url, dest = %dest.display(), "installing runner agent");
    tokio::fs::create_dir_all(dest).await?;

    let bytes = download(http, url).await?;
    let archive = dest.join("runner.tar.gz");
    tokio::fs::write(&archive, &bytes).await?;

    let status = tokio::process::Command::new("tar")
        .arg("xzf")
        .arg(&archive)
        .arg("-C")
        .arg(dest)
        .status()
        .await?;
    let _ = tokio::fs::remove_file(&archive).await;

    if !status.success() {
        return Err(PlatformError::Install(format!("tar exited with {status}")));
    }
    Ok(())
}

/// Download a single executable to `dest`.
pub(crate) async fn download_binary(
    http: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<(), PlatformError> {
    info!(%url, dest = %dest.display(), "installing runner agent");
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = download(http, url).await?;
    tokio::fs::write(dest, &bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

async fn download(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, PlatformError> {
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(PlatformError::Install(format!(
            "GET {url} returned {}",
            resp.status()
        )));
    }
    Ok(resp.bytes().await?.to_vec())
}

/// Run a setup command to completion, failing on non-zero exit.
pub(crate) async fn run_setup(
    mut cmd: tokio::process::Command,
    what: &str,
) -> Result<(), PlatformError> {
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(PlatformError::Install(format!(
            "{what} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
