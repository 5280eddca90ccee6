//! Filesystem confinement for snippet processes.
//!
//! On Linux the child restricts itself with Landlock between `fork` and
//! `exec`: it may read and execute beneath an allow-list of system paths and
//! read/write only its own working directory. Everything else, including the
//! host's home directories and `/etc`, is denied with `EACCES`. On kernels
//! with Landlock ABI 4 or newer TCP bind and connect are denied as well.
//! `PR_SET_NO_NEW_PRIVS` is set first so setuid binaries cannot lift the
//! restriction.
//!
//! The rule set is prepared in the parent (paths are opened there) so the
//! child only issues raw syscalls, which are async-signal-safe.

use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// A prepared rule set; apply it to each command before spawning.
pub struct Confinement {
    #[cfg(target_os = "linux")]
    inner: linux::Ruleset,
}

impl Confinement {
    /// Open every path that will be allowed. Missing paths are skipped.
    ///
    /// Fails if the kernel cannot confine processes at all.
    pub fn prepare(readable: &[PathBuf], writable: &[PathBuf]) -> io::Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self {
                inner: linux::Ruleset::prepare(readable, writable)?,
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = (readable, writable);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "process confinement is only available on Linux",
            ))
        }
    }

    /// Install the restriction as a pre-exec hook on `command`.
    ///
    /// The `Confinement` must outlive the spawn: the child uses its open
    /// path descriptors.
    pub fn apply(&self, command: &mut Command) {
        #[cfg(target_os = "linux")]
        self.inner.apply(command);
        #[cfg(not(target_os = "linux"))]
        let _ = command;
    }
}

/// Where an interpreter lives, so it can be allowed alongside system paths.
///
/// Returns the binary's directory and, for `<prefix>/bin`, the prefix too.
pub fn interpreter_dirs(interpreter: &str) -> Vec<PathBuf> {
    let Some(binary) = resolve(interpreter) else {
        return Vec::new();
    };
    let binary = std::fs::canonicalize(&binary).unwrap_or(binary);
    let mut dirs = Vec::new();
    if let Some(dir) = binary.parent() {
        dirs.push(dir.to_path_buf());
        if dir.file_name().is_some_and(|n| n == "bin")
            && let Some(prefix) = dir.parent()
            && prefix != Path::new("/")
        {
            dirs.push(prefix.to_path_buf());
        }
    }
    dirs
}

fn resolve(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        return Some(PathBuf::from(program));
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::OpenOptions;
    use std::io;
    use std::os::fd::{AsRawFd, OwnedFd, RawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::PathBuf;

    use tokio::process::Command;
    use tracing::debug;

    // Same numbers on every architecture.
    const SYS_LANDLOCK_CREATE_RULESET: libc::c_long = 444;
    const SYS_LANDLOCK_ADD_RULE: libc::c_long = 445;
    const SYS_LANDLOCK_RESTRICT_SELF: libc::c_long = 446;

    const LANDLOCK_CREATE_RULESET_VERSION: u32 = 1 << 0;
    const LANDLOCK_RULE_PATH_BENEATH: libc::c_int = 1;

    const ACCESS_FS_EXECUTE: u64 = 1 << 0;
    const ACCESS_FS_WRITE_FILE: u64 = 1 << 1;
    const ACCESS_FS_READ_FILE: u64 = 1 << 2;
    const ACCESS_FS_READ_DIR: u64 = 1 << 3;
    /// Every filesystem right of ABI 1 (bits 0 to 12).
    const ACCESS_FS_ALL: u64 = (1 << 13) - 1;
    const ACCESS_FS_FILE: u64 = ACCESS_FS_EXECUTE | ACCESS_FS_WRITE_FILE | ACCESS_FS_READ_FILE;
    const ACCESS_FS_READ: u64 = ACCESS_FS_EXECUTE | ACCESS_FS_READ_FILE | ACCESS_FS_READ_DIR;

    const ACCESS_NET_BIND_TCP: u64 = 1 << 0;
    const ACCESS_NET_CONNECT_TCP: u64 = 1 << 1;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct RulesetAttr {
        handled_access_fs: u64,
        handled_access_net: u64,
    }

    #[repr(C, packed)]
    struct PathBeneathAttr {
        allowed_access: u64,
        parent_fd: i32,
    }

    pub(super) struct Ruleset {
        attr: RulesetAttr,
        attr_size: usize,
        rules: Vec<(OwnedFd, u64)>,
    }

    impl Ruleset {
        pub(super) fn prepare(readable: &[PathBuf], writable: &[PathBuf]) -> io::Result<Self> {
            let abi = abi_version()?;
            let (attr, attr_size) = if abi >= 4 {
                (
                    RulesetAttr {
                        handled_access_fs: ACCESS_FS_ALL,
                        handled_access_net: ACCESS_NET_BIND_TCP | ACCESS_NET_CONNECT_TCP,
                    },
                    std::mem::size_of::<RulesetAttr>(),
                )
            } else {
                (
                    RulesetAttr {
                        handled_access_fs: ACCESS_FS_ALL,
                        handled_access_net: 0,
                    },
                    std::mem::size_of::<u64>(),
                )
            };

            let mut rules = Vec::new();
            let grants = readable
                .iter()
                .map(|p| (p, ACCESS_FS_READ))
                .chain(writable.iter().map(|p| (p, ACCESS_FS_ALL)));
            for (path, access) in grants {
                let file = match OpenOptions::new()
                    .read(true)
                    .custom_flags(libc::O_PATH | libc::O_CLOEXEC)
                    .open(path)
                {
                    Ok(file) => file,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %path.display(), "Skipping missing sandbox path");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                // Directory-only rights are rejected on files
                let access = if file.metadata()?.is_dir() {
                    access
                } else {
                    access & ACCESS_FS_FILE
                };
                rules.push((OwnedFd::from(file), access));
            }

            Ok(Self {
                attr,
                attr_size,
                rules,
            })
        }

        pub(super) fn apply(&self, command: &mut Command) {
            let attr = self.attr;
            let attr_size = self.attr_size;
            let rules: Vec<(RawFd, u64)> = self
                .rules
                .iter()
                .map(|(fd, access)| (fd.as_raw_fd(), *access))
                .collect();
            // SAFETY: the hook only issues prctl, landlock and close syscalls,
            // all async-signal-safe, and reads memory allocated before fork.
            unsafe {
                command.pre_exec(move || restrict_self(&attr, attr_size, &rules));
            }
        }
    }

    fn abi_version() -> io::Result<i64> {
        // SAFETY: a null attribute with size 0 only queries the ABI version.
        let abi = unsafe {
            libc::syscall(
                SYS_LANDLOCK_CREATE_RULESET,
                std::ptr::null::<RulesetAttr>(),
                0usize,
                LANDLOCK_CREATE_RULESET_VERSION,
            )
        };
        if abi < 1 {
            let cause = io::Error::last_os_error();
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("Landlock is not available on this kernel: {cause}"),
            ));
        }
        Ok(abi as i64)
    }

    /// Runs in the forked child.
    fn restrict_self(
        attr: &RulesetAttr,
        attr_size: usize,
        rules: &[(RawFd, u64)],
    ) -> io::Result<()> {
        // SAFETY: plain syscalls on values owned by this stack frame.
        unsafe {
            let one: libc::c_ulong = 1;
            let zero: libc::c_ulong = 0;
            if libc::prctl(libc::PR_SET_NO_NEW_PRIVS, one, zero, zero, zero) != 0 {
                return Err(io::Error::last_os_error());
            }

            let ruleset = libc::syscall(
                SYS_LANDLOCK_CREATE_RULESET,
                attr as *const RulesetAttr,
                attr_size,
                0u32,
            );
            if ruleset < 0 {
                return Err(io::Error::last_os_error());
            }
            let ruleset = ruleset as libc::c_int;

            for &(fd, access) in rules {
                let beneath = PathBeneathAttr {
                    allowed_access: access,
                    parent_fd: fd,
                };
                let added = libc::syscall(
                    SYS_LANDLOCK_ADD_RULE,
                    ruleset,
                    LANDLOCK_RULE_PATH_BENEATH,
                    &beneath as *const PathBeneathAttr,
                    0u32,
                );
                if added != 0 {
                    let err = io::Error::last_os_error();
                    libc::close(ruleset);
                    return Err(err);
                }
            }

            let restricted = libc::syscall(SYS_LANDLOCK_RESTRICT_SELF, ruleset, 0u32);
            let err = io::Error::last_os_error();
            libc::close(ruleset);
            if restricted != 0 {
                return Err(err);
            }
        }
        Ok(())
    }
}
