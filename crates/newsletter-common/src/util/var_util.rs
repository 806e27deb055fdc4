// Environment map helpers for child processes.

use newsletter_sdk::PathUtil;
use newsletter_sdk::path_util::PATH_VARIABLE;
use std::collections::HashMap;

pub struct VarUtil;

impl VarUtil {
    /// Environment variable names compare case-insensitively on Windows.
    pub fn env_var_keys_equal(a: &str, b: &str) -> bool {
        if cfg!(windows) {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }

    /// Merge `overrides` on top of `base`.
    pub fn merge_env(
        base: &HashMap<String, String>,
        overrides: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut merged = base.clone();
        for (key, value) in overrides {
            if cfg!(windows) {
                let existing = merged
                    .keys()
                    .find(|k| k.eq_ignore_ascii_case(key))
                    .cloned();
                if let Some(k) = existing {
                    merged.remove(&k);
                }
            }
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Prepend `directory` to the `PATH` held in `env`, seeding it from the
    /// process environment the first time.
    pub fn prepend_path(env: &mut HashMap<String, String>, directory: &str) {
        let current = env
            .get(PATH_VARIABLE)
            .cloned()
            .or_else(|| std::env::var(PATH_VARIABLE).ok())
            .unwrap_or_default();
        env.insert(
            PATH_VARIABLE.to_string(),
            PathUtil::prepend_path_value(directory, &current),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win() {
        let base: HashMap<String, String> =
            [("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())].into();
        let overrides: HashMap<String, String> = [("B".to_string(), "3".to_string())].into();
        let merged = VarUtil::merge_env(&base, &overrides);
        assert_eq!(merged["A"], "1");
        assert_eq!(merged["B"], "3");
    }

    #[cfg(unix)]
    #[test]
    fn prepend_path_uses_job_value() {
        let mut env = HashMap::new();
        env.insert(PATH_VARIABLE.to_string(), "/usr/bin".to_string());
        VarUtil::prepend_path(&mut env, "/work/.venv/bin");
        assert_eq!(env[PATH_VARIABLE], "/work/.venv/bin:/usr/bin");
    }
}
