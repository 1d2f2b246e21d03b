//! Boundary to external tools (`git`, `curl`, `tar`).
//!
//! Transports only see stdout bytes and the exit status, so the system
//! implementation can be swapped for an in-process one without touching them.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Captured result of one external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `-1` when terminated by a signal.
    pub status: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Returns true if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external programs on behalf of a transport.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, optionally inside `cwd`, and capture its output.
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ProcessOutput>;

    /// Run and fail `ProcessFailed` on a non-zero exit status.
    fn run_checked(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ProcessOutput> {
        let output = self.run(program, args, cwd)?;
        if !output.success() {
            return Err(Error::process_failed(
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output)
    }
}

/// Spawns real processes through `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ProcessOutput> {
        debug!(program, ?args, "spawning process");

        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        // Keep git from prompting for credentials on a terminal
        command.env("GIT_TERMINAL_PROMPT", "0");

        let output = command.output()?;
        Ok(ProcessOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! A scripted runner that imitates `git`, `curl`, and `tar` on the filesystem.

    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Files a fake clone or extraction writes: relative path to bytes.
    pub type FakeTree = Vec<(String, Vec<u8>)>;

    #[derive(Default)]
    pub struct FakeRunner {
        /// Trees keyed by `"<url>#<ref name>"` for git and by URL for tarballs.
        trees: Mutex<HashMap<String, FakeTree>>,
        /// Every invocation as `program arg arg ...`.
        calls: Mutex<Vec<String>>,
        /// Downloaded artifact path to the URL it came from.
        downloads: Mutex<HashMap<PathBuf, String>>,
        /// Clone destination to the URL it came from.
        clones: Mutex<HashMap<PathBuf, String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serve `files` for a git clone of `url` at `reference` (tag, branch, or commit).
        pub fn with_repo(self, url: &str, reference: &str, files: &[(&str, &str)]) -> Self {
            self.trees.lock().unwrap().insert(
                format!("{}#{}", url, reference),
                files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                    .collect(),
            );
            self
        }

        /// Serve `files` as the extracted contents of the tarball at `url`.
        pub fn with_tarball(self, url: &str, files: &[(&str, &str)]) -> Self {
            self.trees.lock().unwrap().insert(
                url.to_string(),
                files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                    .collect(),
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn write_tree(dest: &Path, tree: &FakeTree) {
            for (path, content) in tree {
                let full = dest.join(path);
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, content).unwrap();
            }
        }

        fn failure(message: &str) -> ProcessOutput {
            ProcessOutput {
                status: 128,
                stdout: Vec::new(),
                stderr: message.as_bytes().to_vec(),
            }
        }

        fn ok(stdout: &[u8]) -> ProcessOutput {
            ProcessOutput {
                status: 0,
                stdout: stdout.to_vec(),
                stderr: Vec::new(),
            }
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, args.join(" ")));

            let trees = self.trees.lock().unwrap();
            match (program, args) {
                // git clone [--quiet] [--depth 1 --branch <name>] <url> <dest>
                ("git", [first, ..]) if *first == "clone" => {
                    let dest = PathBuf::from(args[args.len() - 1]);
                    let url = args[args.len() - 2];
                    let branch = args
                        .iter()
                        .position(|a| *a == "--branch")
                        .map(|i| args[i + 1]);

                    fs::create_dir_all(dest.join(".git")).unwrap();
                    fs::write(dest.join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();
                    self.clones
                        .lock()
                        .unwrap()
                        .insert(dest.clone(), url.to_string());

                    match branch {
                        Some(name) => match trees.get(&format!("{}#{}", url, name)) {
                            Some(tree) => {
                                Self::write_tree(&dest, tree);
                                Ok(Self::ok(b""))
                            }
                            None => Ok(Self::failure("fatal: Remote branch not found")),
                        },
                        None => Ok(Self::ok(b"")),
                    }
                }
                // git checkout --quiet <commit>, run inside the clone
                ("git", [first, .., commit]) if *first == "checkout" => {
                    let dest = cwd.unwrap().to_path_buf();
                    let url = self.clones.lock().unwrap().get(&dest).cloned().unwrap();
                    match trees.get(&format!("{}#{}", url, commit)) {
                        Some(tree) => {
                            Self::write_tree(&dest, tree);
                            Ok(Self::ok(b""))
                        }
                        None => Ok(Self::failure("error: pathspec did not match")),
                    }
                }
                ("git", [first, ..]) if *first == "rev-parse" => {
                    Ok(Self::ok(b"0123456789abcdef0123456789abcdef01234567\n"))
                }
                // curl -fsSL -o <file> <url>
                ("curl", _) => {
                    let url = args[args.len() - 1];
                    let out = args
                        .iter()
                        .position(|a| *a == "-o")
                        .map(|i| PathBuf::from(args[i + 1]))
                        .unwrap();
                    if !trees.contains_key(url) {
                        return Ok(Self::failure("curl: (22) The requested URL returned error: 404"));
                    }
                    fs::write(&out, b"fake tarball").unwrap();
                    self.downloads.lock().unwrap().insert(out, url.to_string());
                    Ok(Self::ok(b""))
                }
                // tar -xf <file> -C <dir>
                ("tar", _) => {
                    let file = PathBuf::from(args[1]);
                    let dir = PathBuf::from(args[3]);
                    let url = self.downloads.lock().unwrap().get(&file).cloned().unwrap();
                    Self::write_tree(&dir, &trees[&url]);
                    Ok(Self::ok(b""))
                }
                _ => Ok(Self::failure("unexpected invocation")),
            }
        }
    }
}
