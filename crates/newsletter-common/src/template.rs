// `${{ context.name }}` placeholders used in the bot environment block.
//
// Only simple property references are supported: `secrets.X`, `inputs.x`
// and `credential.path`. Anything else between `${{` and `}}` is an error.

use crate::error::JobError;
use once_cell::sync::Lazy;
use regex::Regex;

static EXPRESSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_-]*)\s*\}\}")
        .expect("expression regex is valid")
});

pub const SECRETS_CONTEXT: &str = "secrets";
pub const INPUTS_CONTEXT: &str = "inputs";
pub const CREDENTIAL_CONTEXT: &str = "credential";

/// A `context.name` pair found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub context: String,
    pub name: String,
}

/// List the references in `input`, rejecting malformed or unknown expressions.
pub fn references(input: &str) -> Result<Vec<Reference>, JobError> {
    let mut found = Vec::new();
    for captures in EXPRESSION_REGEX.captures_iter(input) {
        let context = &captures[1];
        if !matches!(context, SECRETS_CONTEXT | INPUTS_CONTEXT | CREDENTIAL_CONTEXT) {
            return Err(JobError::InvalidExpression {
                expression: captures[0].to_string(),
                reason: format!("unrecognized context '{}'", context),
            });
        }
        found.push(Reference {
            context: context.to_string(),
            name: captures[2].to_string(),
        });
    }

    let leftover = EXPRESSION_REGEX.replace_all(input, "");
    if leftover.contains("${{") {
        return Err(JobError::InvalidExpression {
            expression: input.to_string(),
            reason: "expected '${{ context.name }}'".to_string(),
        });
    }
    Ok(found)
}

/// Substitute every placeholder in `input` with the value `lookup` returns.
pub fn render<F>(input: &str, mut lookup: F) -> Result<String, JobError>
where
    F: FnMut(&Reference) -> Result<String, JobError>,
{
    // validates the whole string before any lookup runs
    let refs = references(input)?;
    if refs.is_empty() {
        return Ok(input.to_string());
    }

    let mut output = String::with_capacity(input.len());
    let mut last = 0;
    for (m, reference) in EXPRESSION_REGEX.find_iter(input).zip(refs.iter()) {
        output.push_str(&input[last..m.start()]);
        output.push_str(&lookup(reference)?);
        last = m.end();
    }
    output.push_str(&input[last..]);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_references() {
        let refs = references("${{ secrets.GMAIL_USER }}:${{inputs.test_mode}}").unwrap();
        assert_eq!(
            refs,
            vec![
                Reference {
                    context: "secrets".into(),
                    name: "GMAIL_USER".into()
                },
                Reference {
                    context: "inputs".into(),
                    name: "test_mode".into()
                },
            ]
        );
        assert!(references("plain").unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_context_and_malformed() {
        assert!(matches!(
            references("${{ github.sha }}"),
            Err(JobError::InvalidExpression { .. })
        ));
        assert!(matches!(
            references("${{ secrets.A || 'x' }}"),
            Err(JobError::InvalidExpression { .. })
        ));
        assert!(references("${{ secrets.A").is_err());
    }

    #[test]
    fn renders_with_lookup() {
        let rendered = render("mode=${{ inputs.test_mode }}!", |r| {
            assert_eq!(r.context, "inputs");
            Ok("true".to_string())
        })
        .unwrap();
        assert_eq!(rendered, "mode=true!");
    }

    #[test]
    fn lookup_errors_propagate() {
        let err = render("${{ secrets.X }}", |r| Err(JobError::MissingSecret(r.name.clone())));
        assert!(matches!(err, Err(JobError::MissingSecret(name)) if name == "X"));
    }
}
