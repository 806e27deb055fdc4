// run-bot: run the newsletter bot in the workspace with its environment
// contract rendered from secrets, inputs and the credential path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use newsletter_common::constants::steps;
use newsletter_common::template::{self, CREDENTIAL_CONTEXT, INPUTS_CONTEXT, SECRETS_CONTEXT};
use newsletter_common::{JobError, VarUtil};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::run_process;
use crate::execution_context::{ExecutionContext, JobStep};

pub struct RunBotStep;

#[async_trait]
impl JobStep for RunBotStep {
    fn id(&self) -> &str {
        steps::RUN_BOT
    }

    fn display_name(&self) -> &str {
        "Run newsletter bot"
    }

    async fn run_async(&self, context: &mut ExecutionContext) -> Result<()> {
        let definition = context.definition();
        let workspace = context.workspace_directory();

        if definition.credential.is_some() {
            let global = context.global();
            match global.credential.as_ref() {
                Some(credential) if credential.exists() => {}
                Some(credential) => anyhow::bail!(
                    "Credential file '{}' is missing",
                    credential.path().display()
                ),
                None => anyhow::bail!("Credential file has not been written"),
            }
        }

        let (bot_env, unset_secrets) = render_environment(context)?;
        for name in &unset_secrets {
            context.warning(&format!(
                "Secret '{}' is not set; the bot receives an empty value",
                name
            ));
        }
        for name in bot_env.keys() {
            context.debug(&format!("Bot environment: {}", name));
        }
        let environment = VarUtil::merge_env(&context.environment(), &bot_env);

        let program = match &definition.bot.program {
            Some(program) => program.clone(),
            None => context
                .global()
                .interpreter
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .context("No interpreter has been provisioned")?,
        };
        let mut arguments = Vec::new();
        if !definition.bot.script.is_empty() {
            arguments.push(definition.bot.script.clone());
        }
        arguments.extend(definition.bot.args.iter().cloned());

        run_process(context, &workspace, &program, &arguments, &environment, true)
            .await
            .context("Newsletter bot failed")?;
        Ok(())
    }
}

/// Render every `bot.env` template. Returns the variables and the names of
/// referenced secrets that were not set.
fn render_environment(
    context: &ExecutionContext,
) -> Result<(HashMap<String, String>, BTreeSet<String>)> {
    let definition = context.definition();
    let global = context.global();
    let secrets = Arc::clone(&global.secrets);
    let declared = definition.declared_inputs();
    let credential_path = global
        .credential
        .as_ref()
        .map(|c| c.path().to_string_lossy().to_string());

    let mut unset = BTreeSet::new();
    let mut rendered = HashMap::new();
    for (key, value) in &definition.bot.env {
        let value = template::render(value, |reference| {
            let name = reference.name.as_str();
            match reference.context.as_str() {
                SECRETS_CONTEXT => Ok(match secrets.expose(name) {
                    Some(secret) => secret.to_string(),
                    None => {
                        unset.insert(name.to_string());
                        String::new()
                    }
                }),
                INPUTS_CONTEXT => Ok(global
                    .trigger
                    .input(name)
                    .map(str::to_string)
                    .or_else(|| declared.get(name).and_then(|spec| spec.default.clone()))
                    .unwrap_or_default()),
                CREDENTIAL_CONTEXT => credential_path.clone().ok_or_else(|| {
                    JobError::InvalidExpression {
                        expression: format!("${{{{ credential.{} }}}}", name),
                        reason: "no credential file has been written".to_string(),
                    }
                }),
                other => Err(JobError::InvalidExpression {
                    expression: other.to_string(),
                    reason: "unrecognized context".to_string(),
                }),
            }
        })
        .with_context(|| format!("Unable to evaluate bot variable '{}'", key))?;
        rendered.insert(key.clone(), value);
    }
    Ok((rendered, unset))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::credential::CredentialFile;
    use crate::execution_context::tests::make_test_context;
    use newsletter_common::{BotConfig, JobDefinition, SecretStore, TriggerEvent};
    use std::collections::BTreeMap;

    const BOT: &str = r#"
echo "TEST_MODE=$TEST_MODE"
echo "USER=$GMAIL_USER"
echo "KEY=$OPENAI_API_KEY"
test -f "$GOOGLE_SHEETS_CREDS_PATH" && echo "creds present"
"#;

    fn prepare(dir: &std::path::Path, inputs: &[(&str, &str)]) -> ExecutionContext {
        let root = make_test_context(dir);
        let workspace = root.workspace_directory();
        std::fs::write(workspace.join("bot.sh"), BOT).unwrap();
        let credential = CredentialFile::create(&workspace.join("service_account.json"), "{}").unwrap();

        let mut secrets = SecretStore::new();
        secrets.insert("GMAIL_USER", "news@example.com".into(), root.secret_masker());

        let inputs: BTreeMap<String, String> = inputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        {
            let mut global = root.global_mut();
            global.definition = Arc::new(JobDefinition {
                bot: BotConfig {
                    program: Some("sh".into()),
                    script: "bot.sh".into(),
                    ..BotConfig::default()
                },
                ..JobDefinition::default()
            });
            global.secrets = Arc::new(secrets);
            global.credential = Some(credential);
            global.trigger = TriggerEvent::workflow_dispatch(inputs);
        }
        root
    }

    #[tokio::test]
    async fn passes_contract_environment() {
        let dir = tempfile::tempdir().unwrap();
        let root = prepare(dir.path(), &[("test_mode", "true")]);

        let mut step = root.create_step_context(5, steps::RUN_BOT, "Run bot");
        RunBotStep.run_async(&mut step).await.unwrap();

        let lines = step.log_lines();
        assert!(lines.iter().any(|l| l == "TEST_MODE=true"));
        assert!(lines.iter().any(|l| l == "USER=***"));
        assert!(lines.iter().any(|l| l == "KEY="));
        assert!(lines.iter().any(|l| l == "creds present"));
        assert!(root
            .global()
            .warnings
            .iter()
            .any(|w| w.contains("OPENAI_API_KEY")));
    }

    #[tokio::test]
    async fn unset_input_uses_declared_default() {
        let dir = tempfile::tempdir().unwrap();
        let root = prepare(dir.path(), &[]);

        let mut step = root.create_step_context(5, steps::RUN_BOT, "Run bot");
        RunBotStep.run_async(&mut step).await.unwrap();
        assert!(step.log_lines().iter().any(|l| l == "TEST_MODE=false"));
    }

    #[tokio::test]
    async fn refuses_to_start_without_credential_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = prepare(dir.path(), &[]);
        std::fs::remove_file(root.workspace_directory().join("service_account.json")).unwrap();

        let mut step = root.create_step_context(5, steps::RUN_BOT, "Run bot");
        let err = RunBotStep.run_async(&mut step).await.unwrap_err();
        assert!(err.to_string().contains("is missing"));
        assert!(!step.log_lines().iter().any(|l| l.starts_with("TEST_MODE")));
    }

    #[tokio::test]
    async fn bot_exit_code_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let root = prepare(dir.path(), &[]);
        std::fs::write(root.workspace_directory().join("bot.sh"), "exit 4\n").unwrap();

        let mut step = root.create_step_context(5, steps::RUN_BOT, "Run bot");
        assert!(RunBotStep.run_async(&mut step).await.is_err());
    }
}
