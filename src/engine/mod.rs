use std::path::PathBuf;
use std::thread;

use log::{debug, error, info};
use tokio::runtime::Builder;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::layout;
use crate::listing::{self, ListingClient};
use crate::manifest::Manifest;
use crate::plan::{self, UpdatePlan};
use crate::progress::{DownloadProgress, ProgressCell, ProgressReader};
use crate::resolver;
use crate::sync::{SyncExecutor, SyncReport};

pub mod state;

use state::{SyncOutcome, SyncState};

const MANIFEST_DOCUMENT: &str = "manifest.json";

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub root: PathBuf,
    /// Remote subfolder to mirror, e.g. `mods` or `server`.
    pub folder: String,
    pub self_prefix: String,
}

impl EngineOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folder: listing::MODS_FOLDER.to_owned(),
            self_prefix: layout::SELF_PREFIX.to_owned(),
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_self_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.self_prefix = prefix.into();
        self
    }
}

/// A computed plan together with the manifest it was computed from.
#[derive(Clone, Debug)]
pub struct PreparedSync {
    pub repository_url: String,
    pub manifest: Manifest,
    pub plan: UpdatePlan,
}

#[derive(Clone)]
pub struct SyncEngine {
    options: EngineOptions,
    listing: ListingClient,
    executor: SyncExecutor,
}

impl SyncEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            listing: ListingClient::new(),
            executor: SyncExecutor::new(),
        }
    }

    /// Retrieve the remote manifest for the configured folder.
    ///
    /// Providers with a listing API are listed directly; the others must publish
    /// a `manifest.json` document inside the folder.
    pub async fn fetch_manifest(&self, repository_url: &str) -> Result<Manifest, SyncError> {
        let resolved = resolver::resolve(repository_url)
            .ok_or_else(|| SyncError::InvalidRepoUrl(repository_url.trim().to_owned()))?;
        let folder = &self.options.folder;
        if listing::supports_listing(resolved.base.provider) {
            let entries = self.listing.list_folder(repository_url, folder).await?;
            return Ok(Manifest::from_listing(entries));
        }
        let url = format!("{}{MANIFEST_DOCUMENT}", resolved.base.folder_url(folder));
        self.listing.fetch_manifest_document(&url).await
    }

    pub async fn check(&self, repository_url: &str) -> Result<PreparedSync, SyncError> {
        let manifest = self.fetch_manifest(repository_url).await?;
        let plan = plan::compute(
            &layout::mods_dir(&self.options.root),
            &manifest,
            &self.options.self_prefix,
        );
        Ok(PreparedSync {
            repository_url: repository_url.trim().to_owned(),
            manifest,
            plan,
        })
    }

    pub async fn apply(
        &self,
        prepared: &PreparedSync,
        progress: &ProgressCell,
    ) -> Result<SyncReport, SyncError> {
        let mut publish = |update: DownloadProgress| progress.publish(update);
        self.executor
            .execute(
                &self.options.root,
                &prepared.repository_url,
                &self.options.folder,
                &prepared.manifest,
                &prepared.plan,
                Some(&mut publish),
            )
            .await
    }

    /// One full pass: fetch, plan, and apply when anything changed.
    pub async fn run(
        &self,
        repository_url: &str,
        updates: &mpsc::UnboundedSender<SyncState>,
        progress: &ProgressCell,
    ) -> SyncOutcome {
        let outcome = match self.run_inner(repository_url, updates, progress).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("engine: sync failed: {err}");
                SyncOutcome::Failed(err.to_string())
            }
        };
        let state = match &outcome {
            SyncOutcome::UpToDate => SyncState::UpToDate,
            SyncOutcome::Updated(report) => SyncState::Completed(report.clone()),
            SyncOutcome::Failed(message) => SyncState::Error(message.clone()),
        };
        updates.send(state).ok();
        outcome
    }

    async fn run_inner(
        &self,
        repository_url: &str,
        updates: &mpsc::UnboundedSender<SyncState>,
        progress: &ProgressCell,
    ) -> Result<SyncOutcome, SyncError> {
        updates
            .send(SyncState::Fetching {
                folder: self.options.folder.clone(),
            })
            .ok();
        let manifest = self.fetch_manifest(repository_url).await?;
        info!(
            "engine: remote {}/ lists {} files",
            self.options.folder,
            manifest.len()
        );

        updates.send(SyncState::Computing).ok();
        let plan = plan::compute(
            &layout::mods_dir(&self.options.root),
            &manifest,
            &self.options.self_prefix,
        );
        if !plan.has_changes() {
            info!("engine: local folder is up to date");
            return Ok(SyncOutcome::UpToDate);
        }
        info!(
            "engine: adding {}, updating {}, removing {}",
            plan.to_add.len(),
            plan.to_update.len(),
            plan.to_remove.len()
        );

        updates.send(SyncState::Applying { plan: plan.clone() }).ok();
        let prepared = PreparedSync {
            repository_url: repository_url.trim().to_owned(),
            manifest,
            plan,
        };
        let report = self.apply(&prepared, progress).await?;
        Ok(SyncOutcome::Updated(report))
    }
}

/// A run executing on its own worker thread.
pub struct SyncHandle {
    pub updates: mpsc::UnboundedReceiver<SyncState>,
    pub progress: ProgressReader,
    worker: thread::JoinHandle<SyncOutcome>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> SyncOutcome {
        self.worker
            .join()
            .unwrap_or_else(|_| SyncOutcome::Failed("sync worker panicked".into()))
    }
}

/// Start one run on a dedicated background thread with its own runtime.
pub fn spawn_sync(engine: SyncEngine, repository_url: String) -> std::io::Result<SyncHandle> {
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (cell, reader) = ProgressCell::new();
    let worker = thread::Builder::new()
        .name("modpack-sync".into())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let message = format!("failed to start async runtime: {err}");
                    error!("engine: {message}");
                    updates_tx.send(SyncState::Error(message.clone())).ok();
                    return SyncOutcome::Failed(message);
                }
            };
            debug!("engine: worker started for {repository_url}");
            runtime.block_on(engine.run(&repository_url, &updates_tx, &cell))
        })?;
    Ok(SyncHandle {
        updates: updates_rx,
        progress: reader,
        worker,
    })
}
