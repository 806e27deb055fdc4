// Per-step log file: `<diag>/<run-id>/<NN>-<step-id>.log`.
// Every line is masked and prefixed with a UTC timestamp.

use crate::secret_masker::SecretMasker;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct StepLogger {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    secret_masker: SecretMasker,
    total_lines: u64,
    /// Set after the first failed open or write so the error is reported
    /// only once.
    broken: bool,
}

impl StepLogger {
    /// `index` is the 1-based position of the step in the run; the file is
    /// created on the first write.
    pub fn new(run_directory: &Path, index: usize, step_id: &str, secret_masker: SecretMasker) -> Self {
        Self {
            path: run_directory.join(Self::file_name(index, step_id)),
            writer: None,
            secret_masker,
            total_lines: 0,
            broken: false,
        }
    }

    pub fn file_name(index: usize, step_id: &str) -> String {
        format!("{:02}-{}.log", index, step_id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    pub fn write(&mut self, message: &str) {
        if self.writer.is_none() && !self.broken {
            self.open();
        }

        let masked = self.secret_masker.mask_secrets(message);
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let mut failed = None;
        for line in masked.lines() {
            if let Err(e) = writeln!(writer, "{} {}", timestamp, line) {
                failed = Some(e);
                break;
            }
            self.total_lines += 1;
        }
        if let Some(e) = failed {
            self.fail("write", e);
        }
    }

    /// Flush and close the file.
    pub fn end(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                self.fail("flush", e);
            }
        }
    }

    /// Stop writing after an I/O error; later lines are dropped.
    fn fail(&mut self, action: &str, error: std::io::Error) {
        self.writer = None;
        if !self.broken {
            self.broken = true;
            tracing::error!("Failed to {} step log {:?}: {}", action, self.path, error);
        }
    }

    fn open(&mut self) {
        let opened = self
            .path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| File::create(&self.path));
        match opened {
            Ok(file) => self.writer = Some(BufWriter::new(file)),
            Err(e) => {
                self.broken = true;
                tracing::error!("Failed to create step log {:?}: {}", self.path, e);
            }
        }
    }
}

impl Drop for StepLogger {
    fn drop(&mut self) {
        self.end();
    }
}
