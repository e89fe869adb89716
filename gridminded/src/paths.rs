//! Cross-platform application paths

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, String> {
        let base = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(Self::with_base(base))
    }

    pub fn with_base(base: impl AsRef<Path>) -> Self {
        Self {
            config_dir: base.as_ref().join("gridmind"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_lives_under_app_dir() {
        let p = AppPaths::with_base("/tmp/cfg");
        assert_eq!(p.config_file(), PathBuf::from("/tmp/cfg/gridmind/config.json"));
    }
}
