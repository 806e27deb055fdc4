// Job definition: a YAML document shaped like a single-job workflow.
//
// Every field has a default, so an empty document (or no file at all)
// describes the weekly newsletter job.

use crate::constants::{self, bot_env, defaults};
use crate::error::JobError;
use crate::template::{self, CREDENTIAL_CONTEXT, INPUTS_CONTEXT, SECRETS_CONTEXT};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct JobDefinition {
    pub name: String,
    pub on: TriggerConfig,
    pub timeout_minutes: u32,
    /// Leave the workspace on disk after the run (debugging aid).
    pub keep_workspace: bool,
    pub checkout: CheckoutConfig,
    pub runtime: RuntimeConfig,
    pub dependencies: DependencyConfig,
    pub credential: Option<CredentialConfig>,
    pub bot: BotConfig,
    pub artifact: ArtifactConfig,
}

impl Default for JobDefinition {
    fn default() -> Self {
        Self {
            name: defaults::JOB_NAME.to_string(),
            on: TriggerConfig::default(),
            timeout_minutes: constants::DEFAULT_TIMEOUT_MINUTES,
            keep_workspace: false,
            checkout: CheckoutConfig::default(),
            runtime: RuntimeConfig::default(),
            dependencies: DependencyConfig::default(),
            credential: Some(CredentialConfig::default()),
            bot: BotConfig::default(),
            artifact: ArtifactConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct TriggerConfig {
    pub schedule: Vec<ScheduleEntry>,
    /// `None` disables manual dispatch.
    pub workflow_dispatch: Option<DispatchConfig>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            schedule: vec![ScheduleEntry {
                cron: defaults::SCHEDULE.to_string(),
            }],
            workflow_dispatch: Some(DispatchConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub inputs: BTreeMap<String, InputSpec>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let mut inputs = BTreeMap::new();
        inputs.insert(
            defaults::TEST_MODE_INPUT.to_string(),
            InputSpec {
                description: "Run in test mode".to_string(),
                required: false,
                default: Some(defaults::TEST_MODE_DEFAULT.to_string()),
                input_type: InputType::String,
                options: Vec::new(),
            },
        );
        Self { inputs }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    String,
    Boolean,
    Choice,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputSpec {
    pub description: String,
    pub required: bool,
    #[serde(deserialize_with = "scalar_as_string")]
    pub default: Option<String>,
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub options: Vec<String>,
}

impl InputSpec {
    /// Check a supplied value against the declared type. Values are never
    /// rewritten; `"TRUE"` passes a boolean input as-is.
    pub fn check(&self, name: &str, value: &str) -> Result<(), JobError> {
        let reason = match self.input_type {
            InputType::String => None,
            InputType::Boolean => {
                let lower = value.to_ascii_lowercase();
                (lower != "true" && lower != "false").then(|| "expected 'true' or 'false'".to_string())
            }
            InputType::Choice => (!self.options.iter().any(|o| o == value))
                .then(|| format!("expected one of [{}]", self.options.join(", "))),
        };
        match reason {
            Some(reason) => Err(JobError::InvalidInput {
                name: name.to_string(),
                value: value.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// YAML authors write `default: false`; keep the scalar's text.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
        serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
        serde_yaml::Value::String(s) => Ok(Some(s)),
        other => Err(D::Error::custom(format!(
            "input default must be a scalar, got {:?}",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CheckoutConfig {
    /// Local directory copied into the workspace; relative to the runner root.
    pub source: PathBuf,
    /// Git URL cloned (shallow) instead of copying `source`.
    pub repository: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    /// Glob patterns matched against each path component while copying.
    pub exclude: Vec<String>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            repository: None,
            git_ref: None,
            exclude: [
                ".git",
                ".env",
                ".venv",
                "__pycache__",
                defaults::CREDENTIAL_FILE,
                defaults::ARTIFACT_PATH,
                constants::path::WORK_DIRECTORY,
                constants::path::ARTIFACTS_DIRECTORY,
                constants::path::DIAG_DIRECTORY,
                "target",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuntimeConfig {
    pub interpreter: String,
    /// Version prefix the interpreter must report; empty skips the check.
    pub version: String,
    pub virtualenv: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: defaults::INTERPRETER.to_string(),
            version: defaults::INTERPRETER_VERSION.to_string(),
            virtualenv: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct DependencyConfig {
    pub manifest: String,
    /// Arguments placed between the interpreter and `install`.
    pub installer: Vec<String>,
    pub upgrade_installer: bool,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            manifest: defaults::DEPENDENCY_MANIFEST.to_string(),
            installer: vec!["-m".to_string(), "pip".to_string()],
            upgrade_installer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CredentialConfig {
    pub secret: String,
    pub file: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            secret: defaults::CREDENTIAL_SECRET.to_string(),
            file: defaults::CREDENTIAL_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct BotConfig {
    /// Executable to run; defaults to the provisioned interpreter.
    pub program: Option<String>,
    /// Script passed as first argument; empty means none.
    pub script: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        let env = [
            (bot_env::OPENAI_API_KEY, "${{ secrets.OPENAI_API_KEY }}"),
            (bot_env::GMAIL_USER, "${{ secrets.GMAIL_USER }}"),
            (bot_env::GMAIL_APP_PASSWORD, "${{ secrets.GMAIL_APP_PASSWORD }}"),
            (bot_env::GOOGLE_SHEETS_CREDS_PATH, "${{ credential.path }}"),
            (bot_env::TEST_MODE, "${{ inputs.test_mode }}"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            program: None,
            script: defaults::BOT_SCRIPT.to_string(),
            args: Vec::new(),
            env,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IfNoFilesFound {
    #[default]
    Warn,
    Error,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArtifactConfig {
    pub name: String,
    pub path: String,
    pub retention_days: u32,
    pub if_no_files_found: IfNoFilesFound,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            name: defaults::ARTIFACT_NAME.to_string(),
            path: defaults::ARTIFACT_PATH.to_string(),
            retention_days: defaults::ARTIFACT_RETENTION_DAYS,
            if_no_files_found: IfNoFilesFound::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading / validation
// ---------------------------------------------------------------------------

impl JobDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read job definition {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid job definition {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // an empty document deserializes as null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let definition: Self = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_minutes) * 60)
    }

    /// Structural checks that need no external crate. Cron syntax and
    /// artifact names are checked by their owners.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::InvalidDefinition("'name' must not be empty".into()));
        }
        if self.timeout_minutes == 0 {
            return Err(JobError::InvalidDefinition(
                "'timeout-minutes' must be greater than zero".into(),
            ));
        }
        if self.runtime.interpreter.trim().is_empty() {
            return Err(JobError::InvalidDefinition(
                "'runtime.interpreter' must not be empty".into(),
            ));
        }
        if self.artifact.retention_days == 0
            || self.artifact.retention_days > constants::MAX_RETENTION_DAYS
        {
            return Err(JobError::InvalidRetention {
                days: self.artifact.retention_days,
                max: constants::MAX_RETENTION_DAYS,
            });
        }
        if let Some(credential) = &self.credential {
            let file = Path::new(&credential.file);
            if credential.file.is_empty() || file.is_absolute() || file.components().count() != 1 {
                return Err(JobError::InvalidDefinition(format!(
                    "'credential.file' must be a plain file name, got '{}'",
                    credential.file
                )));
            }
        }

        if let Some(dispatch) = &self.on.workflow_dispatch {
            for (name, spec) in &dispatch.inputs {
                if spec.input_type == InputType::Choice && spec.options.is_empty() {
                    return Err(JobError::InvalidDefinition(format!(
                        "choice input '{}' declares no options",
                        name
                    )));
                }
                if let Some(default) = &spec.default {
                    spec.check(name, default)?;
                }
            }
        }

        let declared_inputs = self.declared_inputs();
        for value in self.bot.env.values() {
            for reference in template::references(value)? {
                match reference.context.as_str() {
                    INPUTS_CONTEXT if !declared_inputs.contains_key(&reference.name) => {
                        return Err(JobError::InvalidExpression {
                            expression: value.clone(),
                            reason: format!("input '{}' is not declared", reference.name),
                        });
                    }
                    CREDENTIAL_CONTEXT if reference.name != "path" || self.credential.is_none() => {
                        return Err(JobError::InvalidExpression {
                            expression: value.clone(),
                            reason: "only 'credential.path' is available, and only when a credential is configured".into(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Declared dispatch inputs; empty when manual dispatch is disabled.
    pub fn declared_inputs(&self) -> BTreeMap<String, InputSpec> {
        self.on
            .workflow_dispatch
            .as_ref()
            .map(|d| d.inputs.clone())
            .unwrap_or_default()
    }

    /// Every secret the job needs: the credential secret plus each
    /// `secrets.X` referenced from the bot environment.
    pub fn referenced_secrets(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some(credential) = &self.credential {
            names.insert(credential.secret.clone());
        }
        for value in self.bot.env.values() {
            if let Ok(refs) = template::references(value) {
                names.extend(
                    refs.into_iter()
                        .filter(|r| r.context == SECRETS_CONTEXT)
                        .map(|r| r.name),
                );
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_describes_weekly_newsletter() {
        let def = JobDefinition::default();
        assert_eq!(def.on.schedule[0].cron, "0 9 * * 1");
        let inputs = def.declared_inputs();
        assert_eq!(inputs["test_mode"].default.as_deref(), Some("false"));
        assert_eq!(def.artifact.retention_days, 30);
        assert_eq!(def.artifact.path, "newsletter_*.html");
        assert_eq!(def.artifact.if_no_files_found, IfNoFilesFound::Warn);
        assert_eq!(def.dependencies.manifest, "requirements.txt");
        assert_eq!(def.bot.env.len(), 5);
        assert!(def.validate().is_ok());
        assert_eq!(def.timeout(), Duration::from_secs(360 * 60));
    }

    #[test]
    fn referenced_secrets_cover_contract() {
        let names: Vec<String> = JobDefinition::default().referenced_secrets().into_iter().collect();
        assert_eq!(
            names,
            vec![
                "GMAIL_APP_PASSWORD",
                "GMAIL_USER",
                "GOOGLE_SHEETS_CREDS",
                "OPENAI_API_KEY"
            ]
        );
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(JobDefinition::from_yaml("").unwrap(), JobDefinition::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
name: staging-newsletter
on:
  schedule:
    - cron: "30 6 * * 1-5"
  workflow-dispatch:
    inputs:
      test_mode:
        default: true
        type: boolean
runtime:
  version: "3.12"
  virtualenv: false
artifact:
  retention-days: 7
  if-no-files-found: error
"#;
        let def = JobDefinition::from_yaml(yaml).unwrap();
        assert_eq!(def.name, "staging-newsletter");
        assert_eq!(def.on.schedule[0].cron, "30 6 * * 1-5");
        let input = &def.declared_inputs()["test_mode"];
        assert_eq!(input.default.as_deref(), Some("true"));
        assert_eq!(input.input_type, InputType::Boolean);
        assert_eq!(def.runtime.interpreter, "python");
        assert!(!def.runtime.virtualenv);
        assert_eq!(def.artifact.retention_days, 7);
        assert_eq!(def.artifact.if_no_files_found, IfNoFilesFound::Error);
        assert_eq!(def.artifact.name, "newsletter");
    }

    #[test]
    fn sample_file_spells_out_the_defaults() {
        let sample = include_str!("../../../newsletter.yml");
        assert_eq!(JobDefinition::from_yaml(sample).unwrap(), JobDefinition::default());
    }

    #[test]
    fn yaml_round_trip_preserves_definition() {
        let def = JobDefinition::default();
        let parsed = JobDefinition::from_yaml(&def.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn rejects_out_of_range_retention() {
        let err = JobDefinition::from_yaml("artifact:\n  retention-days: 91\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JobError>(),
            Some(JobError::InvalidRetention { days: 91, max: 90 })
        ));
    }

    #[test]
    fn rejects_undeclared_input_reference() {
        let yaml = "bot:\n  env:\n    TEST_MODE: \"${{ inputs.dry_run }}\"\n";
        let err = JobDefinition::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("dry_run") || format!("{:#}", err).contains("dry_run"));
    }

    #[test]
    fn rejects_credential_path_in_directory() {
        let yaml = "credential:\n  file: ../service_account.json\n";
        assert!(JobDefinition::from_yaml(yaml).is_err());
    }

    #[test]
    fn input_type_checks() {
        let boolean = InputSpec {
            input_type: InputType::Boolean,
            ..InputSpec::default()
        };
        assert!(boolean.check("x", "TRUE").is_ok());
        assert!(boolean.check("x", "maybe").is_err());

        let choice = InputSpec {
            input_type: InputType::Choice,
            options: vec!["a".into(), "b".into()],
            ..InputSpec::default()
        };
        assert!(choice.check("x", "b").is_ok());
        assert!(choice.check("x", "c").is_err());

        // strings pass through untouched
        assert!(InputSpec::default().check("x", "anything at all").is_ok());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsletter.yml");
        std::fs::write(&path, "keep-workspace: true\n").unwrap();
        assert!(JobDefinition::load(&path).unwrap().keep_workspace);
        assert!(JobDefinition::load(&dir.path().join("missing.yml")).is_err());
    }
}
