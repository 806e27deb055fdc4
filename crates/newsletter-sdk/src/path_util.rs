/// PATH environment variable name (platform-specific).
#[cfg(target_os = "windows")]
pub const PATH_VARIABLE: &str = "Path";
#[cfg(not(target_os = "windows"))]
pub const PATH_VARIABLE: &str = "PATH";

pub struct PathUtil;

impl PathUtil {
    /// Prepend `path` to `current_path` and return the result, without touching
    /// the process environment. An entry already in first position is not repeated.
    pub fn prepend_path_value(path: &str, current_path: &str) -> String {
        if path.is_empty() {
            return current_path.to_string();
        }
        if current_path.is_empty() {
            return path.to_string();
        }

        let separator = Self::path_separator();
        if current_path.split(separator).next() == Some(path) {
            return current_path.to_string();
        }

        format!("{path}{separator}{current_path}")
    }

    /// The PATH list separator for the current platform.
    pub fn path_separator() -> char {
        if cfg!(windows) {
            ';'
        } else {
            ':'
        }
    }
}
