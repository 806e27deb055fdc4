// CommandSettings: command line of `newsletter-runner`. Directory and file
// options fall back to NEWSLETTER_RUNNER_* environment variables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use newsletter_common::constants::{defaults, variables, DEFINITION_FILE_NAME, DOTENV_FILE_NAME};
use newsletter_common::{HostContext, HostSettings, JobDefinition};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "newsletter-runner", version, about = "Runs the weekly newsletter job")]
pub struct CommandSettings {
    /// Runner root; work, artifact and diagnostic directories live below it.
    #[arg(long, global = true, env = variables::ROOT)]
    pub root: Option<PathBuf>,

    /// Job definition file [default: <root>/newsletter.yml, else built-in].
    #[arg(long, global = true, env = variables::DEFINITION)]
    pub definition: Option<PathBuf>,

    /// Dotenv file with secrets [default: <root>/.env when present].
    #[arg(long, global = true, env = variables::ENV_FILE)]
    pub env_file: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub artifacts_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub diag_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the job once, as a manual dispatch.
    Run(RunArgs),
    /// Run the job at every scheduled instant until interrupted.
    Schedule {
        /// Wait for the next scheduled instant, run it and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print the next scheduled instants.
    Next {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Check the job definition and print it with defaults applied.
    Validate,
    /// Inspect or prune the artifact store.
    #[command(subcommand)]
    Artifacts(ArtifactsCommand),
}

#[derive(Debug, Default, clap::Args)]
pub struct RunArgs {
    /// Dispatch input, repeatable.
    #[arg(short = 'i', long = "input", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub inputs: Vec<(String, String)>,

    /// Shorthand for `--input test_mode=true`.
    #[arg(long)]
    pub test_mode: bool,
}

#[derive(Debug, Subcommand)]
pub enum ArtifactsCommand {
    /// List stored artifacts, oldest first.
    List,
    /// Delete artifacts whose retention has elapsed.
    Prune,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

impl RunArgs {
    /// Inputs as supplied; the last occurrence of a key wins.
    pub fn input_map(&self) -> BTreeMap<String, String> {
        let mut inputs: BTreeMap<String, String> = self.inputs.iter().cloned().collect();
        if self.test_mode {
            inputs
                .entry(defaults::TEST_MODE_INPUT.to_string())
                .or_insert_with(|| "true".to_string());
        }
        inputs
    }
}

impl CommandSettings {
    pub fn host_settings(&self) -> Result<HostSettings> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Unable to resolve the current directory")?,
        };
        let mut settings = HostSettings::for_root(&root);
        let under_root = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        };
        if let Some(work) = &self.work_dir {
            settings.work = under_root(work);
        }
        if let Some(artifacts) = &self.artifacts_dir {
            settings.artifacts = under_root(artifacts);
        }
        if let Some(diag) = &self.diag_dir {
            settings.diag = under_root(diag);
        }
        Ok(settings)
    }

    /// Definition file in effect, if any.
    pub fn definition_path(&self, host: &HostContext) -> Option<PathBuf> {
        match &self.definition {
            Some(path) => Some(host.resolve(path)),
            None => {
                let default = host.resolve(Path::new(DEFINITION_FILE_NAME));
                default.is_file().then_some(default)
            }
        }
    }

    /// An explicit definition must exist; without one the root's
    /// `newsletter.yml` is used, and failing that the built-in job.
    pub fn load_definition(&self, host: &HostContext) -> Result<JobDefinition> {
        match self.definition_path(host) {
            Some(path) => JobDefinition::load(&path),
            None => Ok(JobDefinition::default()),
        }
    }

    pub fn env_file(&self, host: &HostContext) -> Result<Option<PathBuf>> {
        match &self.env_file {
            Some(path) => {
                let path = host.resolve(path);
                if !path.is_file() {
                    bail!("Env file {:?} does not exist", path);
                }
                Ok(Some(path))
            }
            None => {
                let default = host.resolve(Path::new(DOTENV_FILE_NAME));
                Ok(default.is_file().then_some(default))
            }
        }
    }
}
