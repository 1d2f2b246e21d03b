//! Turns a manifest into a verified, capability-audited lockfile.
//!
//! A pass is synchronous: every dependency is fetched, stored and diffed in
//! declaration order. Nothing touches the lockfile until [`Resolution::commit`].

use crate::archive::{is_archive, read_normalized_archive};
use crate::capability::{CapabilityChange, diff_capabilities, render_report};
use crate::error::{Error, Result};
use crate::lockfile::Lockfile;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::object::ObjectKind;
use crate::package::{PackageRef, ResolvedPackage, Source};
use crate::store::ContentStore;
use crate::transport::{FetchResult, TransportRegistry, fetch_with_verification};
use std::path::Path;
use tracing::{debug, info, warn};

/// Version recorded for path and tar sources that carry no manifest.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// How pinned lockfile entries are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveMode {
    /// Fetch every dependency afresh.
    #[default]
    Update,
    /// Reuse the pinned content id of any dependency whose source is unchanged.
    Locked,
}

/// A package that could not be marked resolved because its cached content
/// failed verification.
#[derive(Debug)]
pub struct PackageFailure {
    pub package: String,
    pub error: Error,
}

/// Outcome of one resolve pass, not yet persisted.
#[derive(Debug)]
pub struct Resolution {
    /// Newly resolved packages, keyed by name.
    pub lockfile: Lockfile,
    /// Capability differences against the previous lockfile.
    pub changes: Vec<CapabilityChange>,
    /// Packages whose cached content failed verification.
    pub failures: Vec<PackageFailure>,
    /// Lockfile on disk at the start of the pass, if any.
    pub previous: Option<Lockfile>,
}

impl Resolution {
    /// True when no capability changed and the result may be written without asking.
    pub fn is_auto_approved(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when every declared package resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of capability changes and failures.
    pub fn report(&self) -> String {
        let mut out = render_report(&self.changes);
        if !self.failures.is_empty() {
            out.push_str(&format!(
                "{} package(s) failed verification:\n",
                self.failures.len()
            ));
            for failure in &self.failures {
                out.push_str(&format!("  {}: {}\n", failure.package, failure.error));
            }
        }
        out
    }

    /// Write the lockfile if the pass is complete and either auto-approved or
    /// `approved` by the caller. Returns whether it was written; otherwise the
    /// file at `lockfile_path` is left untouched.
    pub fn commit(&self, lockfile_path: &Path, approved: bool) -> Result<bool> {
        if !self.is_complete() {
            warn!(
                failures = self.failures.len(),
                "not writing lockfile: packages failed verification"
            );
            return Ok(false);
        }
        if !self.is_auto_approved() && !approved {
            warn!(
                changes = self.changes.len(),
                "not writing lockfile: capability changes rejected"
            );
            return Ok(false);
        }

        self.lockfile.save(lockfile_path)?;
        info!(
            path = %lockfile_path.display(),
            packages = self.lockfile.packages.len(),
            "lockfile written"
        );
        Ok(true)
    }
}

enum Outcome {
    Resolved(ResolvedPackage),
    Failed(Error),
}

/// Orchestrates manifest, transports and store for a single pass.
pub struct Resolver<'a> {
    registry: &'a TransportRegistry,
    store: &'a ContentStore,
    mode: ResolveMode,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a TransportRegistry, store: &'a ContentStore) -> Self {
        Self {
            registry,
            store,
            mode: ResolveMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fetch, store and describe one dependency. Relative path sources are
    /// looked up under `base_dir`.
    pub fn resolve_single_package(
        &self,
        package: &PackageRef,
        base_dir: &Path,
    ) -> Result<ResolvedPackage> {
        match self.resolve_entry(package, base_dir, None)? {
            Outcome::Resolved(resolved) => Ok(resolved),
            Outcome::Failed(error) => Err(error),
        }
    }

    /// Run a full pass over the manifest at `manifest_path`, diffing against
    /// the lockfile at `lockfile_path` if it exists.
    ///
    /// Any fetch error aborts the pass. A cached object that fails
    /// verification is recorded in [`Resolution::failures`] instead.
    pub fn resolve(&self, manifest_path: &Path, lockfile_path: &Path) -> Result<Resolution> {
        let manifest = Manifest::load(manifest_path)?;
        let previous = Lockfile::load_optional(lockfile_path)?;
        let base_dir = match manifest_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        info!(
            manifest = %manifest_path.display(),
            dependencies = manifest.all_dependencies().count(),
            first = previous.is_none(),
            mode = ?self.mode,
            "resolving"
        );

        let mut resolved = Vec::new();
        let mut failures = Vec::new();
        for package in manifest.all_dependencies() {
            let pinned = previous
                .as_ref()
                .and_then(|lockfile| lockfile.packages.get(&package.name));
            match self.resolve_entry(package, base_dir, pinned)? {
                Outcome::Resolved(p) => resolved.push(p),
                Outcome::Failed(error) => {
                    warn!(package = %package.name, %error, "verification failed");
                    failures.push(PackageFailure {
                        package: package.name.clone(),
                        error,
                    });
                }
            }
        }

        let mut changes = Vec::new();
        if let Some(previous) = &previous {
            for package in &resolved {
                if let Some(old) = previous.packages.get(&package.name) {
                    changes.extend(diff_capabilities(
                        &package.name,
                        &old.capabilities,
                        &package.capabilities,
                    ));
                }
            }
        }

        info!(
            resolved = resolved.len(),
            changes = changes.len(),
            failures = failures.len(),
            "resolution complete"
        );

        Ok(Resolution {
            lockfile: Lockfile::from_packages(resolved),
            changes,
            failures,
            previous,
        })
    }

    fn resolve_entry(
        &self,
        package: &PackageRef,
        base_dir: &Path,
        pinned: Option<&ResolvedPackage>,
    ) -> Result<Outcome> {
        let url = package.source.rebased(base_dir).canonical_url();

        if self.mode == ResolveMode::Locked
            && let Some(pinned) = pinned.filter(|p| p.source == package.source)
        {
            let id = &pinned.content_id;
            if self.store.exists(id) {
                if !self.store.verify(id)? {
                    return Ok(Outcome::Failed(Error::integrity_check_failed(
                        &package.name,
                        id.to_hex(),
                        "stored object does not match its id",
                    )));
                }
                debug!(package = %package.name, %id, "reusing pinned content");
                return Ok(Outcome::Resolved(ResolvedPackage {
                    capabilities: package.capabilities.clone(),
                    ..pinned.clone()
                }));
            }

            let fetched = fetch_with_verification(self.registry, &url, id)?;
            self.store
                .store_kind(&fetched.content_id, &fetched.content, object_kind(&fetched))?;
            return Ok(Outcome::Resolved(assemble(package, &fetched)));
        }

        let fetched = self.registry.fetch(&url)?;
        let id = &fetched.content_id;
        let kind = object_kind(&fetched);
        if self.store.exists(id) && !self.store.verify(id)? {
            // Fail this pass, but leave good bytes behind for the next one
            self.store.repair(id, &fetched.content, kind)?;
            return Ok(Outcome::Failed(Error::integrity_check_failed(
                &package.name,
                id.to_hex(),
                "stored object does not match its id",
            )));
        }
        self.store.store_kind(id, &fetched.content, kind)?;
        debug!(package = %package.name, %id, "stored");
        Ok(Outcome::Resolved(assemble(package, &fetched)))
    }
}

fn assemble(package: &PackageRef, fetched: &FetchResult) -> ResolvedPackage {
    let (version, dependencies) = match introspect(&fetched.content) {
        Some(manifest) => {
            let version = if manifest.version.is_empty() {
                fallback_version(&package.source)
            } else {
                manifest.version.clone()
            };
            let names = manifest.all_dependencies().map(|d| d.name.clone()).collect();
            (version, names)
        }
        None => (fallback_version(&package.source), Vec::new()),
    };

    ResolvedPackage {
        name: package.name.clone(),
        version,
        content_id: fetched.content_id,
        source: package.source.clone(),
        capabilities: package.capabilities.clone(),
        dependencies,
    }
}

/// Directory fetches are archives; anything else is stored as a blob.
fn object_kind(fetched: &FetchResult) -> ObjectKind {
    match fetched.metadata.get("kind").map(String::as_str) {
        Some("directory") => ObjectKind::Archive,
        _ => ObjectKind::Blob,
    }
}

fn fallback_version(source: &Source) -> String {
    match source {
        Source::Git { reference, .. } => reference.value().to_string(),
        Source::Path { .. } | Source::Tar { .. } => DEFAULT_VERSION.to_string(),
    }
}

/// The dependency's own root manifest, if it ships one that parses.
fn introspect(content: &[u8]) -> Option<Manifest> {
    if !is_archive(content) {
        return None;
    }
    let entries = read_normalized_archive(content).ok()?;
    let entry = entries.iter().find(|e| e.path == MANIFEST_FILE)?;
    let text = std::str::from_utf8(&entry.content).ok()?;
    match Manifest::parse(text) {
        Ok(manifest) => Some(manifest),
        Err(error) => {
            debug!(%error, "ignoring unparsable dependency manifest");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::hash::ContentId;
    use crate::lockfile::LOCKFILE_FILE;
    use crate::package::GitRef;
    use crate::process::fake::FakeRunner;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CRYPTO: &str = "https://github.com/acme/crypto.git";

    struct Workspace {
        _temp: TempDir,
        dir: std::path::PathBuf,
        store: ContentStore,
        registry: TransportRegistry,
        runner: Arc<FakeRunner>,
    }

    impl Workspace {
        fn new(runner: FakeRunner) -> Self {
            let temp = TempDir::new().unwrap();
            let dir = temp.path().join("app");
            fs::create_dir_all(&dir).unwrap();
            let store = ContentStore::init(temp.path().join("store")).unwrap();
            let runner = Arc::new(runner);
            let registry = TransportRegistry::with_defaults(runner.clone());
            Self {
                _temp: temp,
                dir,
                store,
                registry,
                runner,
            }
        }

        fn manifest(&self) -> std::path::PathBuf {
            self.dir.join(MANIFEST_FILE)
        }

        fn lockfile(&self) -> std::path::PathBuf {
            self.dir.join(LOCKFILE_FILE)
        }

        fn write_manifest(&self, text: &str) {
            fs::write(self.manifest(), text).unwrap();
        }

        fn resolve(&self, mode: ResolveMode) -> Result<Resolution> {
            Resolver::new(&self.registry, &self.store)
                .with_mode(mode)
                .resolve(&self.manifest(), &self.lockfile())
        }

        fn resolve_single(&self, package: &PackageRef) -> ResolvedPackage {
            Resolver::new(&self.registry, &self.store)
                .resolve_single_package(package, &self.dir)
                .unwrap()
        }
    }

    fn crypto_manifest(data_path: &str) -> String {
        format!(
            "name \"app\"\nversion \"1.0.0\"\ndependency crypto {{\n    git \"{}\" tag=\"v2.1.0\"\n    capability fs path=\"{}\"\n}}\n",
            CRYPTO, data_path
        )
    }

    fn crypto_runner() -> FakeRunner {
        FakeRunner::new().with_repo(CRYPTO, "v2.1.0", &[("src/lib.rs", "pub fn encrypt() {}\n")])
    }

    #[test]
    fn test_first_resolution_then_capability_change() {
        let ws = Workspace::new(crypto_runner());
        ws.write_manifest(&crypto_manifest("./data"));

        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.previous.is_none());
        assert!(first.changes.is_empty());
        assert!(first.is_auto_approved());
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        let lockfile = Lockfile::load(&ws.lockfile()).unwrap();
        let crypto = &lockfile.packages["crypto"];
        assert_eq!(crypto.content_id.as_bytes().len(), 32);
        assert_eq!(crypto.version, "v2.1.0");
        assert_eq!(
            crypto.capabilities,
            vec![Capability::new("fs").with_param("path", "./data")]
        );
        assert!(ws.store.verify(&crypto.content_id).unwrap());

        ws.write_manifest(&crypto_manifest("./different-data"));
        let second = ws.resolve(ResolveMode::Update).unwrap();
        assert_eq!(
            second.changes,
            vec![CapabilityChange::Modified {
                package: "crypto".into(),
                old: Capability::new("fs").with_param("path", "./data"),
                new: Capability::new("fs").with_param("path", "./different-data"),
            }]
        );
        assert!(!second.is_auto_approved());
        assert!(second.report().contains("crypto: ~"));

        let before = fs::read(ws.lockfile()).unwrap();
        assert!(!second.commit(&ws.lockfile(), false).unwrap());
        assert_eq!(fs::read(ws.lockfile()).unwrap(), before);

        assert!(second.commit(&ws.lockfile(), true).unwrap());
        let updated = Lockfile::load(&ws.lockfile()).unwrap();
        assert_eq!(
            updated.packages["crypto"].capabilities[0].params["path"],
            "./different-data"
        );
    }

    #[test]
    fn test_missing_path_aborts_and_keeps_lockfile() {
        let ws = Workspace::new(FakeRunner::new());
        let existing = "{\"version\":1,\"packages\":{}}\n";
        fs::write(ws.lockfile(), existing).unwrap();
        ws.write_manifest("dependency gone { path \"./missing-dir\" }\n");

        assert!(matches!(
            ws.resolve(ResolveMode::Update),
            Err(Error::ContentNotFound { .. })
        ));
        assert_eq!(fs::read_to_string(ws.lockfile()).unwrap(), existing);
    }

    #[test]
    fn test_missing_manifest() {
        let ws = Workspace::new(FakeRunner::new());
        assert!(matches!(
            ws.resolve(ResolveMode::Update),
            Err(Error::ManifestNotFound { .. })
        ));
    }

    #[test]
    fn test_one_failed_fetch_aborts_pass() {
        let ws = Workspace::new(crypto_runner());
        fs::create_dir_all(ws.dir.join("vendor/utils")).unwrap();
        fs::write(ws.dir.join("vendor/utils/lib.rs"), "x\n").unwrap();
        ws.write_manifest(&format!(
            "{}dependency utils {{ path \"./vendor/utils\" }}\ndependency blob {{ tar \"https://example.com/blob.tar.gz\" }}\n",
            crypto_manifest("./data")
        ));

        assert!(matches!(
            ws.resolve(ResolveMode::Update),
            Err(Error::ProcessFailed { .. })
        ));
        assert!(!ws.lockfile().exists());
    }

    #[test]
    fn test_relative_path_source_and_introspection() {
        let ws = Workspace::new(FakeRunner::new());
        let utils = ws.dir.join("vendor/utils");
        fs::create_dir_all(&utils).unwrap();
        fs::write(utils.join("lib.rs"), "pub fn util() {}\n").unwrap();
        fs::write(
            utils.join(MANIFEST_FILE),
            "name \"utils\"\nversion \"0.3.1\"\ndependency log { path \"../log\" }\n",
        )
        .unwrap();
        fs::write(ws.dir.join("notes.txt"), "plain file\r\n").unwrap();
        ws.write_manifest(
            "dependency utils { path \"./vendor/utils\" }\ndev-dependency notes { path \"notes.txt\" }\n",
        );

        let resolution = ws.resolve(ResolveMode::Update).unwrap();
        let utils = &resolution.lockfile.packages["utils"];
        assert_eq!(utils.version, "0.3.1");
        assert_eq!(utils.dependencies, vec!["log".to_string()]);
        assert_eq!(
            utils.source,
            Source::Path {
                path: "./vendor/utils".into()
            }
        );

        let notes = &resolution.lockfile.packages["notes"];
        assert_eq!(notes.version, DEFAULT_VERSION);
        assert_eq!(notes.content_id, ContentId::hash(b"plain file\n"));
        assert_eq!(ws.store.retrieve(&notes.content_id).unwrap(), b"plain file\n");
    }

    #[test]
    fn test_removed_package_is_not_a_change() {
        let ws = Workspace::new(crypto_runner());
        fs::write(ws.dir.join("a.txt"), "a\n").unwrap();
        ws.write_manifest(&format!(
            "{}dependency a {{ path \"a.txt\"; capability net host=\"x\" }}\n",
            crypto_manifest("./data")
        ));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        ws.write_manifest(&crypto_manifest("./data"));
        let second = ws.resolve(ResolveMode::Update).unwrap();
        assert!(second.changes.is_empty());
        assert!(second.commit(&ws.lockfile(), false).unwrap());
        assert!(!Lockfile::load(&ws.lockfile()).unwrap().packages.contains_key("a"));
    }

    #[test]
    fn test_resolve_single_package() {
        let ws = Workspace::new(crypto_runner());
        let package = PackageRef {
            name: "crypto".into(),
            source: Source::Git {
                url: CRYPTO.into(),
                reference: GitRef::Tag("v2.1.0".into()),
            },
            capabilities: vec![],
        };
        let resolved = ws.resolve_single(&package);
        assert!(ws.store.exists(&resolved.content_id));
        assert_eq!(resolved.version, "v2.1.0");
        assert!(resolved.dependencies.is_empty());
    }

    #[test]
    fn test_locked_mode_reuses_store_without_fetching() {
        let ws = Workspace::new(crypto_runner());
        ws.write_manifest(&crypto_manifest("./data"));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());
        let fetches = ws.runner.calls().len();

        let locked = ws.resolve(ResolveMode::Locked).unwrap();
        assert_eq!(ws.runner.calls().len(), fetches);
        assert_eq!(locked.lockfile, first.lockfile);
        assert!(locked.is_complete());
    }

    #[test]
    fn test_locked_mode_reports_corrupt_object() {
        let ws = Workspace::new(crypto_runner());
        fs::write(ws.dir.join("a.txt"), "a\n").unwrap();
        ws.write_manifest(&format!(
            "{}dependency a {{ path \"a.txt\" }}\n",
            crypto_manifest("./data")
        ));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        let crypto_id = first.lockfile.packages["crypto"].content_id;
        fs::write(ws.store.object_path(&crypto_id), b"garbage").unwrap();

        let locked = ws.resolve(ResolveMode::Locked).unwrap();
        assert_eq!(locked.failures.len(), 1);
        assert_eq!(locked.failures[0].package, "crypto");
        assert!(matches!(
            locked.failures[0].error,
            Error::IntegrityCheckFailed { .. }
        ));
        assert!(locked.lockfile.packages.contains_key("a"));
        assert!(locked.report().contains("failed verification"));

        let before = fs::read(ws.lockfile()).unwrap();
        assert!(!locked.commit(&ws.lockfile(), true).unwrap());
        assert_eq!(fs::read(ws.lockfile()).unwrap(), before);
    }

    #[test]
    fn test_corrupt_cache_fails_once_then_recovers() {
        let ws = Workspace::new(crypto_runner());
        fs::write(ws.dir.join("a.txt"), "a\n").unwrap();
        ws.write_manifest(&format!(
            "{}dependency a {{ path \"a.txt\" }}\n",
            crypto_manifest("./data")
        ));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        let a_id = first.lockfile.packages["a"].content_id;
        fs::write(ws.store.object_path(&a_id), b"garbage").unwrap();

        let broken = ws.resolve(ResolveMode::Update).unwrap();
        assert_eq!(broken.failures.len(), 1);
        assert_eq!(broken.failures[0].package, "a");
        assert!(matches!(
            broken.failures[0].error,
            Error::IntegrityCheckFailed { .. }
        ));
        assert!(broken.lockfile.packages.contains_key("crypto"));
        assert!(!broken.lockfile.packages.contains_key("a"));
        let before = fs::read(ws.lockfile()).unwrap();
        assert!(!broken.commit(&ws.lockfile(), true).unwrap());
        assert_eq!(fs::read(ws.lockfile()).unwrap(), before);

        let recovered = ws.resolve(ResolveMode::Update).unwrap();
        assert!(recovered.is_complete());
        assert!(ws.store.verify(&a_id).unwrap());
        assert_eq!(recovered.lockfile, first.lockfile);
    }

    #[test]
    fn test_single_file_with_archive_magic_is_stored_as_file() {
        let ws = Workspace::new(FakeRunner::new());
        fs::write(ws.dir.join("notes.txt"), "LDGA notes about the format\n").unwrap();
        ws.write_manifest("dependency notes { path \"notes.txt\" }\n");

        let resolution = ws.resolve(ResolveMode::Update).unwrap();
        let id = resolution.lockfile.packages["notes"].content_id;
        let dest = ws.dir.join("out.txt");
        ws.store.materialize(&id, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"LDGA notes about the format\n");
    }

    #[test]
    fn test_locked_mode_refetches_missing_object() {
        let ws = Workspace::new(crypto_runner());
        ws.write_manifest(&crypto_manifest("./data"));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        let id = first.lockfile.packages["crypto"].content_id;
        fs::remove_file(ws.store.object_path(&id)).unwrap();

        let locked = ws.resolve(ResolveMode::Locked).unwrap();
        assert!(locked.is_complete());
        assert!(ws.store.exists(&id));
    }

    #[test]
    fn test_locked_mode_detects_upstream_change() {
        let ws = Workspace::new(crypto_runner());
        ws.write_manifest(&crypto_manifest("./data"));
        let first = ws.resolve(ResolveMode::Update).unwrap();
        assert!(first.commit(&ws.lockfile(), false).unwrap());

        let mut lockfile = Lockfile::load(&ws.lockfile()).unwrap();
        let pinned = lockfile.packages.get_mut("crypto").unwrap();
        pinned.content_id = ContentId::hash(b"something else");
        lockfile.save(&ws.lockfile()).unwrap();

        assert!(matches!(
            ws.resolve(ResolveMode::Locked),
            Err(Error::IntegrityCheckFailed { .. })
        ));
    }
}
