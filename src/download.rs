use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tokio::io::AsyncWriteExt;

use crate::cli::ImportArgs;
use crate::storage::{StoragePaths, file_present_nonempty};

/// Resolves the gazetteer CSV to load, downloading and unpacking the
/// archive when needed. `None` means no gazetteer source is configured.
pub async fn ensure_gazetteer(
    paths: &StoragePaths,
    opts: &ImportArgs,
) -> anyhow::Result<Option<PathBuf>> {
    paths.ensure_dirs().context("create data directories")?;
    let out_csv = paths.gazetteer_csv();

    if let Some(file) = opts.gazetteer_file.as_ref() {
        let file = PathBuf::from(file);
        if !file_present_nonempty(&file) {
            return Err(anyhow!("Gazetteer file {} is missing or empty", file.display()));
        }
        if is_zip(&file) {
            extract_first_csv_from_zip(&file, &out_csv)
                .with_context(|| format!("extract {}", file.display()))?;
            return Ok(Some(out_csv));
        }
        return Ok(Some(file));
    }

    if !opts.force_download && file_present_nonempty(&out_csv) {
        tracing::info!("Reusing gazetteer at {}", out_csv.display());
        return Ok(Some(out_csv));
    }

    let Some(url) = opts.gazetteer_url.as_deref() else {
        tracing::warn!("No gazetteer configured (--gazetteer-file / --gazetteer-url); search will fall back to text matching");
        return Ok(None);
    };
    if opts.offline {
        return Err(anyhow!(
            "Missing gazetteer at {} (run without --offline to download from {}).",
            out_csv.display(),
            url
        ));
    }

    let zip_path = paths.gazetteer_zip();
    ensure_download(url, &zip_path, opts.force_download).await?;
    extract_first_csv_from_zip(&zip_path, &out_csv).context("extract gazetteer archive")?;
    Ok(Some(out_csv))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

async fn ensure_download(url: &str, dest: &Path, force: bool) -> anyhow::Result<()> {
    if !force && file_present_nonempty(dest) {
        return Ok(());
    }

    let tmp = tmp_path(dest);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    tracing::info!("Downloading {} -> {}", url, dest.display());

    let client = reqwest::Client::new();
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    if !resp.status().is_success() {
        return Err(anyhow!("Download failed ({}): {}", resp.status(), url));
    }

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("create {}", tmp.display()))?;

    let mut downloaded: u64 = 0;
    let mut stream = resp.bytes_stream();
    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("read body chunk from {url}"))?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;

        if downloaded % (10 * 1024 * 1024) < chunk.len() as u64 {
            tracing::info!("... downloaded {} MB", downloaded / (1024 * 1024));
        }
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("rename {} -> {}", tmp.display(), dest.display()))?;

    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let fname = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    dest.with_file_name(format!("{fname}.part"))
}

/// Copies the first `.csv` entry of the archive to `out_csv`, preferring
/// the locality register (`SIMC`) when the archive bundles several.
fn extract_first_csv_from_zip(zip_path: &Path, out_csv: &Path) -> anyhow::Result<()> {
    use std::io::{Read, Write};

    let f =
        std::fs::File::open(zip_path).with_context(|| format!("open {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(f).context("read zip archive")?;

    let mut chosen_index: Option<usize> = None;
    for i in 0..archive.len() {
        let name = archive.by_index(i)?.name().to_ascii_lowercase();
        if !name.ends_with(".csv") {
            continue;
        }
        if name.contains("simc") {
            chosen_index = Some(i);
            break;
        }
        if chosen_index.is_none() {
            chosen_index = Some(i);
        }
    }
    let idx =
        chosen_index.ok_or_else(|| anyhow!("no .csv file found in {}", zip_path.display()))?;

    let mut zf = archive.by_index(idx)?;
    let mut buf = Vec::new();
    zf.read_to_end(&mut buf)?;

    if let Some(parent) = out_csv.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::fs::File::create(out_csv)?;
    out.write_all(&buf)?;
    out.flush()?;

    Ok(())
}
