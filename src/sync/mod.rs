use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::SyncError;
use crate::layout;
use crate::listing::USER_AGENT;
use crate::manifest::Manifest;
use crate::plan::UpdatePlan;
use crate::progress::{DownloadProgress, ProgressCallback, emit_progress};
use crate::resolver;
use crate::state::{self, ManagedState};
use crate::util::format_speed;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// What a run changed on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub removed: Vec<String>,
    pub downloaded: Vec<String>,
}

#[derive(Clone)]
pub struct SyncExecutor {
    client: Client,
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncExecutor {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("sync: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Apply `plan` to the managed folder under `root`.
    ///
    /// Removals run first, then downloads in plan order. The first failed
    /// download aborts the run. The managed set is persisted once at the end,
    /// including when the run was aborted.
    pub async fn execute(
        &self,
        root: &Path,
        repository_url: &str,
        folder: &str,
        manifest: &Manifest,
        plan: &UpdatePlan,
        mut progress: ProgressCallback<'_>,
    ) -> Result<SyncReport, SyncError> {
        let base_url = resolver::resolve_base(repository_url).map(|info| info.folder_url(folder));
        if base_url.is_none() {
            let needs_base = plan
                .downloads()
                .filter_map(|name| manifest.entry(name))
                .any(|entry| entry.explicit_url().is_none());
            if needs_base {
                return Err(SyncError::InvalidRepoUrl(repository_url.trim().to_owned()));
            }
        }

        let state_path = layout::managed_state_path(root);
        let mut managed = state::load(&state_path).await;
        let mut report = SyncReport::default();

        let outcome = self
            .apply(
                &layout::mods_dir(root),
                base_url.as_deref(),
                manifest,
                plan,
                &mut managed,
                &mut report,
                &mut progress,
            )
            .await;

        let persisted = state::save(&state_path, &managed).await;
        match (outcome, persisted) {
            (Ok(()), Ok(())) => {
                info!(
                    "sync: removed {} and downloaded {} files",
                    report.removed.len(),
                    report.downloaded.len()
                );
                Ok(report)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), Err(persist_err)) => Err(persist_err),
            (Err(err), Err(persist_err)) => {
                error!("sync: {persist_err}");
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        mods_dir: &Path,
        base_url: Option<&str>,
        manifest: &Manifest,
        plan: &UpdatePlan,
        managed: &mut ManagedState,
        report: &mut SyncReport,
        progress: &mut ProgressCallback<'_>,
    ) -> Result<(), SyncError> {
        for filename in &plan.to_remove {
            remove_file(mods_dir, filename).await?;
            managed.remove(filename);
            report.removed.push(filename.clone());
        }

        let total = plan.download_count();
        let mut index = 0;
        for filename in plan.downloads() {
            let Some(entry) = manifest.entry(filename) else {
                warn!("sync: {filename} is planned but missing from the manifest; skipping");
                continue;
            };
            index += 1;
            let url = match (entry.explicit_url(), base_url) {
                (Some(url), _) => url.to_owned(),
                (None, Some(base)) => format!("{base}{}", urlencoding::encode(filename)),
                (None, None) => {
                    return Err(SyncError::download(filename, "no download URL available"));
                }
            };
            info!("sync: downloading {index}/{total}: {filename}");
            self.download_file(&url, mods_dir, filename, index, total, progress)
                .await?;
            managed.insert(filename.to_owned());
            report.downloaded.push(filename.to_owned());
        }
        Ok(())
    }

    /// Stream `url` into `mods_dir/filename`, reporting progress at most every 100ms.
    ///
    /// A failed transfer leaves whatever was written so far on disk.
    async fn download_file(
        &self,
        url: &str,
        mods_dir: &Path,
        filename: &str,
        index: usize,
        total: usize,
        progress: &mut ProgressCallback<'_>,
    ) -> Result<u64, SyncError> {
        let started = Instant::now();
        emit_progress(progress, DownloadProgress::starting(index, total, filename));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::download(filename, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| SyncError::download(filename, format!("status error: {e}")))?;

        fs::create_dir_all(mods_dir)
            .await
            .map_err(|e| SyncError::download(filename, format!("failed to create mods dir: {e}")))?;
        let dest = mods_dir.join(filename);
        let mut file = File::create(&dest)
            .await
            .map_err(|e| SyncError::download(filename, format!("failed to create file: {e}")))?;

        let total_bytes = response.content_length().unwrap_or(0);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| SyncError::download(filename, format!("stream error: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::download(filename, format!("write error: {e}")))?;
            downloaded += chunk.len() as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                let elapsed = started.elapsed().as_secs_f64();
                let bytes_per_second = if elapsed > 0.0 {
                    downloaded as f64 / elapsed
                } else {
                    0.0
                };
                emit_progress(
                    progress,
                    DownloadProgress {
                        index,
                        total,
                        filename: filename.to_owned(),
                        bytes_so_far: downloaded,
                        total_bytes,
                        bytes_per_second,
                    },
                );
                last_report = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| SyncError::download(filename, format!("flush error: {e}")))?;

        if total_bytes > 0 && downloaded < total_bytes {
            return Err(SyncError::download(
                filename,
                format!("incomplete: received {downloaded} of {total_bytes} bytes"),
            ));
        }

        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        debug!(
            "sync: {filename} finished, {downloaded} bytes at {}",
            format_speed(downloaded as f64 / elapsed)
        );
        Ok(downloaded)
    }
}

/// Delete `mods_dir/filename`; a file that is already gone is not an error.
pub async fn remove_file(mods_dir: &Path, filename: &str) -> Result<(), SyncError> {
    let target = mods_dir.join(filename);
    match fs::remove_file(&target).await {
        Ok(()) => {
            info!("sync: removed {filename}");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("sync: {filename} already absent");
            Ok(())
        }
        Err(err) => Err(SyncError::io(
            format!("failed to delete {}", target.display()),
            err,
        )),
    }
}
