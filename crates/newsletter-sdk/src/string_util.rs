pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// True: `"1"`, `"true"`, `"yes"`; false: `"0"`, `"false"`, `"no"` (case-insensitive).
    /// Returns `None` for anything else.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    /// Replace characters that are invalid in file names with `_`.
    pub fn format_into_safe_filename(name: &str) -> String {
        const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
        name.chars()
            .map(|ch| {
                if INVALID.contains(&ch) || (ch as u32) < 0x20 {
                    '_'
                } else {
                    ch
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_conversion() {
        assert_eq!(StringUtil::convert_to_bool("TRUE"), Some(true));
        assert_eq!(StringUtil::convert_to_bool(" 0 "), Some(false));
        assert_eq!(StringUtil::convert_to_bool("maybe"), None);
        assert_eq!(StringUtil::convert_to_bool(""), None);
    }

    #[test]
    fn safe_filename() {
        assert_eq!(
            StringUtil::format_into_safe_filename("run/bot:step"),
            "run_bot_step"
        );
    }
}
