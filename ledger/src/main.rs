mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use is_terminal::IsTerminal;
use ledger_core::{
    ContentStore, FileTransport, LOCKFILE_FILE, Lockfile, MANIFEST_FILE, ResolveMode, Resolver,
    SystemRunner, Transport, TransportRegistry,
};
use output::{
    GcOutput, HashOutput, MaterializeOutput, OutputWriter, ResolveOutput, VerifiedPackage,
    VerifyOutput, VerifyStatus,
};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Ledger - content-addressed dependency resolution
#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Pin dependencies by content hash and audit capability changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Content store directory (defaults to LEDGER_STORE env var or .ledger/store beside the manifest)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Manifest file
    #[arg(short, long, global = true, default_value = MANIFEST_FILE)]
    manifest: PathBuf,

    /// Lockfile (defaults to ledger.lock beside the manifest)
    #[arg(short, long, global = true)]
    lockfile: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the manifest and update the lockfile
    Resolve {
        /// Approve capability changes without prompting
        #[arg(long)]
        yes: bool,

        /// Reuse pinned content for dependencies whose source is unchanged
        #[arg(long)]
        locked: bool,
    },

    /// Check every pinned package against the content store
    Verify,

    /// Extract a pinned package to a directory
    Materialize {
        /// Package name from the lockfile
        package: String,

        /// Destination path (must not exist)
        dest: PathBuf,
    },

    /// Print the content id of a file or directory
    Hash {
        /// Path to hash
        path: PathBuf,
    },

    /// Remove stored objects not pinned by the lockfile
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

/// Paths resolved from flags, environment and defaults.
struct Paths {
    manifest: PathBuf,
    lockfile: PathBuf,
    store: PathBuf,
}

impl Paths {
    fn from_cli(cli: &Cli) -> Self {
        let manifest_dir = match cli.manifest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // --store > LEDGER_STORE > .ledger/store beside the manifest
        let store = cli
            .store
            .clone()
            .or_else(|| std::env::var_os("LEDGER_STORE").map(PathBuf::from))
            .unwrap_or_else(|| manifest_dir.join(".ledger").join("store"));

        let lockfile = cli
            .lockfile
            .clone()
            .unwrap_or_else(|| manifest_dir.join(LOCKFILE_FILE));

        Self {
            manifest: cli.manifest.clone(),
            lockfile,
            store,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);
    let paths = Paths::from_cli(&cli);
    debug!(
        manifest = %paths.manifest.display(),
        lockfile = %paths.lockfile.display(),
        store = %paths.store.display(),
        "paths"
    );

    let result = match cli.command {
        Commands::Resolve { yes, locked } => cmd_resolve(&paths, &output, yes, locked),
        Commands::Verify => cmd_verify(&paths, &output),
        Commands::Materialize { package, dest } => {
            cmd_materialize(&paths, &output, &package, &dest)
        }
        Commands::Hash { path } => cmd_hash(&output, &path),
        Commands::Gc { dry_run } => cmd_gc(&paths, &output, dry_run),
    };

    match result {
        Ok(code) => std::process::exit(i32::from(code)),
        Err(error) => {
            output.write_error(&error, 1);
            std::process::exit(1);
        }
    }
}

fn open_store(path: &Path) -> Result<ContentStore> {
    ContentStore::open(path).with_context(|| format!("Failed to open store at {}", path.display()))
}

fn load_lockfile(path: &Path) -> Result<Lockfile> {
    Lockfile::load(path).with_context(|| format!("Failed to load lockfile {}", path.display()))
}

fn cmd_resolve(paths: &Paths, output: &OutputWriter, yes: bool, locked: bool) -> Result<u8> {
    let store = ContentStore::open_or_init(&paths.store)
        .with_context(|| format!("Failed to open store at {}", paths.store.display()))?;
    let registry = TransportRegistry::with_defaults(Arc::new(SystemRunner));
    let mode = if locked {
        ResolveMode::Locked
    } else {
        ResolveMode::Update
    };

    let resolution = Resolver::new(&registry, &store)
        .with_mode(mode)
        .resolve(&paths.manifest, &paths.lockfile)
        .with_context(|| format!("Failed to resolve {}", paths.manifest.display()))?;

    let approved = if resolution.is_auto_approved() || !resolution.is_complete() {
        false
    } else if yes {
        true
    } else if !output.is_json() && io::stdin().is_terminal() {
        eprint!("{}", resolution.report());
        confirm("Approve these capability changes?")?
    } else {
        false
    };

    let written = resolution
        .commit(&paths.lockfile, approved)
        .with_context(|| format!("Failed to write lockfile {}", paths.lockfile.display()))?;

    let data = ResolveOutput::new(&resolution, written);
    output.write(&data, || {
        let mut text = String::new();
        for package in &data.packages {
            text.push_str(&format!(
                "{} {} {} ({} {})\n",
                package.content_id,
                package.name,
                package.version,
                package.source_type,
                package.source
            ));
        }
        text.push_str(&resolution.report());
        if written {
            text.push_str(&format!("Wrote {}\n", paths.lockfile.display()));
        } else {
            text.push_str(&format!(
                "Lockfile unchanged: {}\n",
                paths.lockfile.display()
            ));
        }
        text
    })?;

    Ok(data.result_code)
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn cmd_verify(paths: &Paths, output: &OutputWriter) -> Result<u8> {
    let store = open_store(&paths.store)?;
    let lockfile = load_lockfile(&paths.lockfile)?;

    let mut packages = Vec::new();
    for package in lockfile.packages.values() {
        let status = if !store.exists(&package.content_id) {
            VerifyStatus::Missing
        } else if store
            .verify(&package.content_id)
            .with_context(|| format!("Failed to verify {}", package.name))?
        {
            VerifyStatus::Ok
        } else {
            VerifyStatus::Corrupt
        };
        packages.push(VerifiedPackage {
            name: package.name.clone(),
            content_id: package.content_id,
            status,
        });
    }

    let success = packages.iter().all(|p| p.status == VerifyStatus::Ok);
    let data = VerifyOutput {
        success,
        result_code: if success { 0 } else { 1 },
        packages,
    };
    output.write(&data, || {
        data.packages
            .iter()
            .map(|p| {
                let status = match p.status {
                    VerifyStatus::Ok => "ok",
                    VerifyStatus::Missing => "MISSING",
                    VerifyStatus::Corrupt => "CORRUPT",
                };
                format!("{} {} {}\n", p.content_id, p.name, status)
            })
            .collect()
    })?;

    Ok(data.result_code)
}

fn cmd_materialize(paths: &Paths, output: &OutputWriter, package: &str, dest: &Path) -> Result<u8> {
    let store = open_store(&paths.store)?;
    let lockfile = load_lockfile(&paths.lockfile)?;

    let pinned = lockfile
        .packages
        .get(package)
        .with_context(|| format!("Package {} is not in {}", package, paths.lockfile.display()))?;

    store
        .materialize(&pinned.content_id, dest)
        .with_context(|| format!("Failed to materialize {} to {}", package, dest.display()))?;

    let data = MaterializeOutput {
        success: true,
        result_code: 0,
        package: package.to_string(),
        content_id: pinned.content_id,
        destination: dest.display().to_string(),
    };
    output.write(&data, || {
        format!(
            "Materialized {} ({}) to {}\n",
            data.package, data.content_id, data.destination
        )
    })?;

    Ok(0)
}

fn cmd_hash(output: &OutputWriter, path: &Path) -> Result<u8> {
    let url = format!("file://{}", path.display());
    let fetched = FileTransport::new()
        .fetch(&url)
        .with_context(|| format!("Failed to hash {}", path.display()))?;

    let data = HashOutput {
        success: true,
        result_code: 0,
        content_id: fetched.content_id,
        path: path.display().to_string(),
        kind: fetched.metadata.get("kind").cloned().unwrap_or_default(),
    };
    output.write(&data, || format!("{} {}\n", data.content_id, data.path))?;

    Ok(0)
}

fn cmd_gc(paths: &Paths, output: &OutputWriter, dry_run: bool) -> Result<u8> {
    let store = open_store(&paths.store)?;
    let lockfile = load_lockfile(&paths.lockfile)?;
    let roots: HashSet<_> = lockfile.content_ids().copied().collect();

    let stats = store
        .gc(&roots, dry_run)
        .with_context(|| "Failed to run garbage collection")?;

    let data = GcOutput::new(&stats, dry_run);
    output.write(&data, || {
        if dry_run {
            format!(
                "Dry run - no objects deleted\nWould delete {} objects\nWould free {} bytes\n",
                stats.objects_deleted, stats.bytes_freed
            )
        } else {
            format!(
                "Deleted {} objects\nFreed {} bytes\nKept {} objects\n",
                stats.objects_deleted, stats.bytes_freed, stats.objects_kept
            )
        }
    })?;

    Ok(0)
}
