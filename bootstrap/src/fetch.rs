//! HTTP and local-file fetch helpers for the bootstrap interpreter: URL
//! detection, downloading, and locating the main program file. Grounded on
//! `nitro.go`'s `downloadFile` / `isURL` / `getOrLocateMainFile`.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{BootstrapError, BootstrapResult};
use crate::pathsafe;

/// Mirrors `nitro.go`'s `isURL`: a candidate counts as a URL only once it
/// parses with both a scheme and a host, so a bare relative path like
/// `hello.txt` is never mistaken for one.
pub fn is_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => !url.scheme().is_empty() && url.host().is_some(),
        Err(_) => false,
    }
}

/// Downloads `url` to `dest` under `cwd`. `dest` is treated as a directory
/// when empty or slash-terminated, in which case the remote path's base
/// name supplies the file name. Skips the request entirely if the resolved
/// destination already exists, matching the original's idempotent re-run.
pub async fn download_file(
    client: &reqwest::Client,
    cwd: &Path,
    url: &str,
    dest: &str,
) -> BootstrapResult<PathBuf> {
    println!("Downloading {url}");

    let parsed = Url::parse(url).map_err(BootstrapError::UrlParse)?;
    let base_name = parsed
        .path_segments()
        .and_then(|mut segs| segs.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("");

    let dest_is_dir = dest.is_empty() || dest.ends_with('/');
    let mut resolved = pathsafe::resolve(cwd, dest)?;

    if dest_is_dir {
        if base_name.is_empty() {
            return Err(BootstrapError::NoFileName(url.to_string()));
        }
        resolved = resolved.join(base_name);
    }

    if resolved.exists() {
        println!("Download skipped: {} already exists.", resolved.display());
        return Ok(resolved);
    }

    if let Some(parent) = resolved.parent() {
        if parent != cwd {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    tokio::fs::write(&resolved, &bytes).await?;

    println!(
        "Downloaded {}: {}",
        resolved.display(),
        humansize::format_size(bytes.len() as u64, humansize::BINARY)
    );

    Ok(resolved)
}

/// Fetches or locates the main program file, returning its on-disk path and,
/// when it was fetched over HTTP, the URL it came from — the fallback base
/// a bare `GET` resolves against when no `FROM` directive set one (spec.md
/// §4.6). Ported from `getOrLocateMainFile`, which also requires a local
/// path argument to live directly in `cwd` (no subdirectory component).
pub async fn get_or_locate_main_file(
    client: &reqwest::Client,
    cwd: &Path,
    url_or_path: &str,
) -> BootstrapResult<(PathBuf, Option<Url>)> {
    if is_url(url_or_path) {
        let path = download_file(client, cwd, url_or_path, "").await?;
        let url = Url::parse(url_or_path).map_err(BootstrapError::UrlParse)?;
        return Ok((path, Some(url)));
    }

    let candidate = Path::new(url_or_path);
    if !candidate.exists() {
        return Err(BootstrapError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("error locating main file: {url_or_path}"),
        )));
    }

    if let Some(dir) = candidate.parent() {
        if !dir.as_os_str().is_empty() && dir != Path::new(".") {
            return Err(BootstrapError::Directive(
                "locate main file".to_string(),
                format!(
                    "expected main file to be {:?}, got {:?}",
                    candidate.file_name().unwrap_or_default(),
                    candidate
                ),
            ));
        }
    }

    Ok((cwd.join(candidate), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_url_rejects_bare_paths() {
        assert!(!is_url("hello.txt"));
        assert!(!is_url("assets/hello.txt"));
    }

    #[test]
    fn is_url_accepts_http_urls() {
        assert!(is_url("https://example.com/hello.txt"));
    }

    #[tokio::test]
    async fn get_or_locate_main_file_rejects_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sub");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        let file = nested.join("main.py");
        tokio::fs::write(&file, "print('hi')").await.unwrap();

        let client = reqwest::Client::new();
        let err = get_or_locate_main_file(&client, dir.path(), file.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Directive(_, _)));
    }
}
