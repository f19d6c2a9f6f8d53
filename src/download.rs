//! Artifact download with checksum verification and progress tracking
//!
//! A checksum mismatch on a fresh download is fatal: the file is deleted and
//! [`FormulaError::Integrity`] is returned, never retried. A stale cached file
//! that fails verification is simply downloaded again.

use crate::error::{FormulaError, Result};
use crate::resolver::Artifact;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// One file to fetch into the cache.
#[derive(Debug, Clone)]
pub struct Download<'a> {
    pub label: &'a str,
    pub url: &'a str,
    pub filename: &'a str,
    pub sha256: &'a str,
    /// Registry token for OCI blob downloads
    pub bearer: Option<&'a str>,
}

impl<'a> Download<'a> {
    pub fn artifact(label: &'a str, artifact: &'a Artifact) -> Self {
        Self {
            label,
            url: &artifact.url,
            filename: &artifact.filename,
            sha256: &artifact.sha256,
            bearer: None,
        }
    }
}

/// SHA256 hex digest of a file
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(file_path)
        .await
        .with_context(|| format!("Failed to open {}", file_path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify `path` against `expected`, as an [`FormulaError::Integrity`] failure.
pub async fn verify_file(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("checksum ok: {}", path.display());
        Ok(())
    } else {
        Err(FormulaError::Integrity {
            artifact: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Download into `cache` unless a verified copy is already there.
pub async fn fetch(
    client: &reqwest::Client,
    cache: &Path,
    download: &Download<'_>,
    show_progress: bool,
) -> Result<PathBuf> {
    fs::create_dir_all(cache)
        .await
        .with_context(|| format!("Failed to create cache directory: {}", cache.display()))?;

    let output_path = cache.join(download.filename);

    if output_path.exists() {
        if verify_file(&output_path, download.sha256).await.is_ok() {
            tracing::info!("using cached {}", output_path.display());
            return Ok(output_path);
        }
        tracing::warn!("cached {} failed verification, downloading again", output_path.display());
        fs::remove_file(&output_path).await?;
    }

    let pb = if show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .context("Invalid progress template")?
                .progress_chars("#>-"),
        );
        pb.set_message(format!("⬇ {}", download.label));
        Some(pb)
    } else {
        None
    };

    let mut request = client.get(download.url);
    if let Some(token) = download.bearer {
        request = request.bearer_auth(token);
    }
    let mut response = request.send().await?.error_for_status()?;

    if let Some(pb) = &pb
        && let Some(total) = response.content_length()
    {
        pb.set_length(total);
    }

    let partial = cache.join(format!("{}.incomplete", download.filename));
    let file = fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let written = match stream_to_file(&mut response, file, pb.as_ref()).await {
        Ok(()) => verify_file(&partial, download.sha256).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        fs::remove_file(&partial).await?;
        if let Some(pb) = &pb {
            pb.abandon_with_message(format!("✗ {}", download.label));
        }
        return Err(e);
    }

    fs::rename(&partial, &output_path).await?;
    if let Some(pb) = &pb {
        pb.finish_with_message(format!("✓ {}", download.label));
    }

    Ok(output_path)
}

async fn stream_to_file(
    response: &mut reqwest::Response,
    mut file: fs::File,
    pb: Option<&ProgressBar>,
) -> Result<()> {
    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(pb) = pb {
            pb.set_position(downloaded);
        }
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello\n")
    const HELLO_SHA: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[tokio::test]
    async fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, "hello\n").unwrap();
        assert_eq!(sha256_file(&path).await.unwrap(), HELLO_SHA);
    }

    #[tokio::test]
    async fn test_verify_mismatch_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, "tampered\n").unwrap();

        match verify_file(&path, HELLO_SHA).await.unwrap_err() {
            FormulaError::Integrity { expected, actual, .. } => {
                assert_eq!(expected, HELLO_SHA);
                assert_ne!(actual, HELLO_SHA);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cached_file_skips_network() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.run"), "hello\n").unwrap();

        // Unroutable URL: only the cache can satisfy this
        let download = Download {
            label: "hello",
            url: "http://127.0.0.1:9/hello.run",
            filename: "hello.run",
            sha256: HELLO_SHA,
            bearer: None,
        };
        let path = fetch(&reqwest::Client::new(), temp.path(), &download, false)
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("hello.run"));
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_no_partial_file() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Promise more bytes than are sent, then hang up
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\nhel")
                .await
                .unwrap();
        });

        let temp = TempDir::new().unwrap();
        let url = format!("http://{addr}/hello.run");
        let download = Download {
            label: "hello",
            url: &url,
            filename: "hello.run",
            sha256: HELLO_SHA,
            bearer: None,
        };
        assert!(fetch(&reqwest::Client::new(), temp.path(), &download, false)
            .await
            .is_err());
        assert!(!temp.path().join("hello.run.incomplete").exists());
        assert!(!temp.path().join("hello.run").exists());
    }
}
