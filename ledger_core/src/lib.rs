//! # Ledger Core
//!
//! Content-addressed dependency resolution with capability auditing.
//!
//! Dependencies declared in a manifest are fetched from git, local paths or
//! tarballs, normalized into a deterministic byte form, hashed with BLAKE3 and
//! stored immutably. The resulting pins are written to a JSON lockfile, but
//! only after every change to a package's capability grants has been approved.
//!
//! ## Features
//!
//! - Byte-identical content ids for the same tree from any source
//! - Content store with atomic writes, verification and garbage collection
//! - Pluggable transports dispatched by URL scheme
//! - Capability diffing between resolutions
//!
//! ## Example
//!
//! ```no_run
//! use ledger_core::{ContentStore, Resolver, SystemRunner, TransportRegistry};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::open_or_init(".ledger/store")?;
//! let registry = TransportRegistry::with_defaults(Arc::new(SystemRunner));
//!
//! let resolution = Resolver::new(&registry, &store)
//!     .resolve(Path::new("ledger.kdl"), Path::new("ledger.lock"))?;
//!
//! print!("{}", resolution.report());
//! if !resolution.commit(Path::new("ledger.lock"), false)? {
//!     println!("lockfile left unchanged");
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod capability;
mod error;
mod gc;
mod hash;
mod lockfile;
mod manifest;
mod object;
mod package;
mod process;
mod resolver;
mod store;
mod transport;
mod walk;

pub use archive::{
    ArchiveEntry, create_normalized_archive, is_archive, normalize_archive, read_normalized_archive,
};
pub use capability::{
    Capability, CapabilityChange, ChangeType, capabilities_equal, diff_capabilities, render_report,
};
pub use error::{Error, Result};
pub use gc::GcStats;
pub use hash::{Algorithm, CONTENT_ID_SIZE, ContentId};
pub use lockfile::{LOCKFILE_FILE, LOCKFILE_VERSION, Lockfile};
pub use manifest::{MANIFEST_FILE, Manifest};
pub use object::{CompressionType, ObjectHeader, ObjectKind};
pub use package::{GitRef, PackageRef, ResolvedPackage, Source};
pub use process::{ProcessOutput, ProcessRunner, SystemRunner};
pub use resolver::{DEFAULT_VERSION, PackageFailure, Resolution, ResolveMode, Resolver};
pub use store::ContentStore;
pub use transport::{
    FetchResult, FileTransport, GitTransport, GitUrl, TarTransport, Transport, TransportRegistry,
    fetch_with_verification,
};
