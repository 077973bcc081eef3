use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use serde::Serialize;

use crate::error::SyncError;
use crate::listing::has_plugin_extension;
use crate::manifest::{Manifest, ModEntry};

pub mod digest;

use digest::{ExpectedDigest, file_digest};

/// Reconciliation between a manifest and the managed folder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    pub to_add: Vec<String>,
    pub to_update: Vec<String>,
    pub to_remove: Vec<String>,
}

impl UpdatePlan {
    pub fn has_changes(&self) -> bool {
        !self.to_add.is_empty() || !self.to_update.is_empty() || !self.to_remove.is_empty()
    }

    pub fn download_count(&self) -> usize {
        self.to_add.len() + self.to_update.len()
    }

    /// Filenames to fetch, additions first.
    pub fn downloads(&self) -> impl Iterator<Item = &str> {
        self.to_add
            .iter()
            .chain(self.to_update.iter())
            .map(String::as_str)
    }
}

/// Diff `manifest` against the plugin files directly inside `mods_dir`.
///
/// Files whose name starts with `exclude_self_prefix` (case-insensitive) are
/// never scheduled for removal. An empty prefix excludes nothing.
pub fn compute(mods_dir: &Path, manifest: &Manifest, exclude_self_prefix: &str) -> UpdatePlan {
    let mut plan = UpdatePlan::default();

    for entry in &manifest.mods {
        let path = mods_dir.join(&entry.filename);
        if !path.exists() {
            plan.to_add.push(entry.filename.clone());
            continue;
        }
        match is_stale(&path, entry) {
            Ok(false) => {}
            Ok(true) => plan.to_update.push(entry.filename.clone()),
            Err(err) => {
                warn!("plan: {err}; scheduling for update");
                plan.to_update.push(entry.filename.clone());
            }
        }
    }

    match removable_files(mods_dir, exclude_self_prefix) {
        Ok(local) => {
            plan.to_remove = local
                .into_iter()
                .filter(|name| !manifest.contains(name))
                .collect();
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("plan: {} does not exist yet", mods_dir.display());
        }
        Err(err) => {
            warn!(
                "plan: failed to list {} ({err}); skipping removals this run",
                mods_dir.display()
            );
        }
    }

    debug!(
        "plan: add={} update={} remove={}",
        plan.to_add.len(),
        plan.to_update.len(),
        plan.to_remove.len()
    );
    plan
}

/// Whether an existing local file differs from its declared digest.
///
/// Entries without a declared hash are assumed current.
fn is_stale(path: &Path, entry: &ModEntry) -> Result<bool, SyncError> {
    let Some(declared) = entry.declared_hash() else {
        return Ok(false);
    };
    let expected = ExpectedDigest::parse(declared).ok_or_else(|| SyncError::HashCompute {
        filename: entry.filename.clone(),
        reason: format!("unsupported hash algorithm in {declared:?}"),
    })?;
    let actual = file_digest(path, expected.algorithm).map_err(|e| SyncError::HashCompute {
        filename: entry.filename.clone(),
        reason: e.to_string(),
    })?;
    Ok(!expected.matches(&actual))
}

/// Plugin files in `dir` the tool may delete, sorted by name.
fn removable_files(dir: &Path, exclude_self_prefix: &str) -> io::Result<Vec<String>> {
    let prefix = exclude_self_prefix.to_ascii_lowercase();
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_file = fs::metadata(entry.path())
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !has_plugin_extension(&name) {
            continue;
        }
        if !prefix.is_empty() && name.to_ascii_lowercase().starts_with(&prefix) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const SELF_PREFIX: &str = "modpack-sync";

    fn sha256_hex(bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        Sha256::digest(bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn assert_invariants(plan: &UpdatePlan, manifest: &Manifest) {
        let add: HashSet<_> = plan.to_add.iter().collect();
        let update: HashSet<_> = plan.to_update.iter().collect();
        let remove: HashSet<_> = plan.to_remove.iter().collect();
        assert!(add.is_disjoint(&update));
        assert!(add.is_disjoint(&remove));
        assert!(update.is_disjoint(&remove));
        assert!(plan.to_remove.iter().all(|name| !manifest.contains(name)));
    }

    #[test]
    fn adds_missing_and_removes_unlisted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.jar", b"bee");
        write(dir.path(), "c.jar", b"sea");
        let manifest = Manifest::new(vec![
            ModEntry::new("a.jar"),
            ModEntry::new("b.jar").with_hash(format!("sha256:{}", sha256_hex(b"bee"))),
        ]);

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert_eq!(plan.to_add, vec!["a.jar"]);
        assert!(plan.to_update.is_empty());
        assert_eq!(plan.to_remove, vec!["c.jar"]);
        assert_invariants(&plan, &manifest);
    }

    #[test]
    fn hash_mismatch_schedules_update() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.jar", b"old");
        write(dir.path(), "d.jar", b"same");
        let manifest = Manifest::new(vec![
            ModEntry::new("b.jar").with_hash(sha256_hex(b"new")),
            ModEntry::new("d.jar").with_hash(sha256_hex(b"same").to_uppercase()),
        ]);

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_update, vec!["b.jar"]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn present_without_hash_is_current() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.jar", b"anything");
        let manifest = Manifest::from_filenames(["a.jar"]);

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert!(!plan.has_changes());
    }

    #[test]
    fn unreadable_or_unknown_hash_is_scheduled_for_update() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder.jar")).unwrap();
        write(dir.path(), "odd.jar", b"x");
        let manifest = Manifest::new(vec![
            ModEntry::new("folder.jar").with_hash("sha256:00"),
            ModEntry::new("odd.jar").with_hash("crc32:1234"),
        ]);

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert_eq!(plan.to_update, vec!["folder.jar", "odd.jar"]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn never_removes_own_artifact_or_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ModPack-Sync-1.2.0.jar", b"me");
        write(dir.path(), "notes.txt", b"keep");
        write(dir.path(), "UPPER.JAR", b"old");
        fs::create_dir(dir.path().join("nested.jar")).unwrap();
        let manifest = Manifest::default();

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert_eq!(plan.to_remove, vec!["UPPER.JAR"]);
    }

    #[test]
    fn empty_prefix_protects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "x.jar", b"x");
        let plan = compute(dir.path(), &Manifest::default(), "");
        assert_eq!(plan.to_remove, vec!["x.jar"]);
    }

    #[test]
    fn missing_directory_only_adds() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::from_filenames(["a.jar", "b.jar"]);
        let plan = compute(&dir.path().join("mods"), &manifest, SELF_PREFIX);
        assert_eq!(plan.to_add, vec!["a.jar", "b.jar"]);
        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.downloads().collect::<Vec<_>>(), ["a.jar", "b.jar"]);
    }

    #[test]
    fn plan_sets_stay_disjoint_across_mixed_states() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("a.jar", "a"), ("b.jar", "b"), ("c.jar", "c"), ("e.jar", "e")] {
            write(dir.path(), name, body.as_bytes());
        }
        let manifest = Manifest::new(vec![
            ModEntry::new("a.jar").with_hash(sha256_hex(b"a")),
            ModEntry::new("b.jar").with_hash(sha256_hex(b"not b")),
            ModEntry::new("c.jar"),
            ModEntry::new("d.jar").with_hash(sha256_hex(b"d")),
        ]);

        let plan = compute(dir.path(), &manifest, SELF_PREFIX);

        assert_eq!(plan.to_add, vec!["d.jar"]);
        assert_eq!(plan.to_update, vec!["b.jar"]);
        assert_eq!(plan.to_remove, vec!["e.jar"]);
        assert_eq!(plan.download_count(), 2);
        assert_invariants(&plan, &manifest);
    }
}
