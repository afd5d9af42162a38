//! Spreadsheets through a headless LibreOffice.
//!
//! Each call gets a private scratch directory holding the LibreOffice user
//! profile, the export target and the process log. A profile cannot be
//! shared between concurrent `soffice` instances, so one per call keeps
//! parallel conversions independent.
//!
//! The child process is owned by a [`ProcessGuard`]; whichever way
//! `render` returns, the guard kills and reaps a process that is still
//! running. `soffice` is a launcher that forks the real office process, so
//! on Unix the child leads its own process group and the guard signals the
//! whole group.

use super::{write_atomic, RenderSummary, Renderer};
use crate::error::ToPdfError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How much of the process log is quoted in an error.
const LOG_TAIL_BYTES: usize = 2048;

/// Renderer that delegates spreadsheets to LibreOffice.
#[derive(Debug, Clone)]
pub struct ExternalTabularRenderer {
    program: PathBuf,
    timeout: Duration,
}

impl ExternalTabularRenderer {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn failure(&self, detail: impl Into<String>) -> ToPdfError {
        ToPdfError::ExternalProcessFailure {
            program: self.program_name(),
            detail: detail.into(),
        }
    }
}

/// Owns a running child process and terminates it on drop.
struct ProcessGuard {
    child: Option<Child>,
    /// Process group led by the child; workers it forked are members.
    group: Option<u32>,
    program: String,
}

impl ProcessGuard {
    fn new(child: Child, program: String) -> Self {
        let group = cfg!(unix).then(|| child.id());
        Self {
            child: Some(child),
            group,
            program,
        }
    }

    /// SIGKILL every process left in the child's group.
    #[cfg(unix)]
    fn kill_group(&mut self) {
        let Some(pgid) = self.group.take() else {
            return;
        };
        let Ok(pgid) = libc::pid_t::try_from(pgid) else {
            return;
        };
        // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc == 0 {
            debug!("Killed process group {} of {}", pgid, self.program);
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) {
        self.group = None;
    }

    /// Wait for the process to exit, giving up after `timeout`.
    fn wait_timeout(&mut self, timeout: Duration) -> Result<ExitStatus, ToPdfError> {
        let deadline = Instant::now() + timeout;
        loop {
            let Some(child) = self.child.as_mut() else {
                return Err(ToPdfError::Internal("process already reaped".into()));
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    self.child = None;
                    // Leftover workers would outlive the export.
                    self.kill_group();
                    return Ok(status);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ToPdfError::ExternalProcessFailure {
                        program: self.program.clone(),
                        detail: format!("cannot poll process: {e}"),
                    })
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ToPdfError::ExternalProcessTimeout {
                    program: self.program.clone(),
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        // Group first, while the leader is unreaped and its pgid still ours.
        if let Some(child) = self.child.as_ref() {
            warn!("Terminating {} (pid {})", self.program, child.id());
        }
        self.kill_group();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Last few KiB of the process log, for error messages.
fn log_tail(path: &Path) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    let start = bytes.len().saturating_sub(LOG_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

impl Renderer for ExternalTabularRenderer {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    fn render(&self, input: &Path, output: &Path) -> Result<RenderSummary, ToPdfError> {
        if !input.exists() {
            return Err(ToPdfError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        let scratch = tempfile::Builder::new()
            .prefix("topdf-soffice-")
            .tempdir()
            .map_err(|e| ToPdfError::Internal(format!("scratch dir: {e}")))?;
        let profile = scratch.path().join("profile");
        let outdir = scratch.path().join("out");
        let log_path = scratch.path().join("soffice.log");
        std::fs::create_dir_all(&outdir)
            .map_err(|e| ToPdfError::Internal(format!("scratch dir: {e}")))?;
        let log = File::create(&log_path)
            .map_err(|e| ToPdfError::Internal(format!("process log: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("--headless")
            .arg("--norestore")
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&outdir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        debug!("Running {:?}", cmd);

        let started = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| self.failure(format!("cannot start: {e}")))?;
        let mut guard = ProcessGuard::new(child, self.program_name());
        let status = guard.wait_timeout(self.timeout)?;
        drop(guard);

        if !status.success() {
            return Err(self.failure(format!("{status}: {}", log_tail(&log_path))));
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = outdir.join(format!("{stem}.pdf"));
        let bytes = std::fs::read(&produced).map_err(|_| {
            self.failure(format!("no PDF was produced: {}", log_tail(&log_path)))
        })?;
        if !bytes.starts_with(b"%PDF-") {
            return Err(self.failure("export is not a PDF file"));
        }
        write_atomic(output, &bytes)?;

        info!(
            "libreoffice: exported {} in {}ms",
            input.display(),
            started.elapsed().as_millis()
        );
        Ok(RenderSummary {
            pages: None,
            blocks: 0,
        })
    }
}
