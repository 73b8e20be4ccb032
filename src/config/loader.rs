use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let relaychat_dir = home.join(".relaychat");

        if !relaychat_dir.exists() {
            fs::create_dir_all(&relaychat_dir).context("Failed to create .relaychat directory")?;
        }

        Self::load_or_init_at(&relaychat_dir.join("config.toml"))
    }

    /// Load `path`, writing a default config there first if it is missing.
    pub fn load_or_init_at(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_effective(path);
        }

        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.save()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse `path`, apply environment overrides and validate the result.
    pub fn load_effective(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse `path` without touching the environment.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_or_init_at(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn load_reads_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_model = \"mistral-large-latest\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.default_model, "mistral-large-latest");
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_model = [").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
