use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the database path, honouring an explicit override before the
    /// platform data directory.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = db_override {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
            return Ok(Config { db_path });
        }

        let proj_dirs =
            ProjectDirs::from("", "", "luminacal").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("luminacal.db"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("cal.db");
        let config = Config::load(Some(db_path.clone())).unwrap();
        assert_eq!(config.db_path, db_path);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_bare_file_name_override() {
        let config = Config::load(Some(PathBuf::from("cal.db"))).unwrap();
        assert_eq!(config.db_path, PathBuf::from("cal.db"));
    }
}
