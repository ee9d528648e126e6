//! Configuration file location and loading.

use anyhow::{Context as _, Result};
use banshare_agent::AgentConfig;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name inside the per-user config directory.
pub const FILE_NAME: &str = "agent.toml";

/// Values given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces `server_url`.
    pub server: Option<String>,
    /// Replaces `token`.
    pub token: Option<String>,
}

/// Default config file path.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "banshare", "banshare")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join(FILE_NAME))
}

/// The explicit path if one was given, else the default.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    explicit.map_or_else(default_path, |p| Ok(p.to_path_buf()))
}

/// Load the agent configuration at `path` and apply `overrides`.
///
/// A missing file is fine when both the server and the token are overridden.
pub fn load(path: &Path, overrides: &Overrides) -> Result<AgentConfig> {
    let mut config = if path.exists() {
        AgentConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        match (&overrides.server, &overrides.token) {
            (Some(server), Some(token)) => AgentConfig::new(server, token),
            _ => anyhow::bail!(
                "No configuration at {}\n\n\
                 Create one with `banshare config init`, or pass both\n  \
                 --server <URL> (BANSHARE_SERVER)\n  \
                 --token <TOKEN> (BANSHARE_TOKEN)",
                path.display()
            ),
        }
    };

    if let Some(server) = &overrides.server {
        config.server_url.clone_from(server);
    }
    if let Some(token) = &overrides.token {
        config.token.clone_from(token);
    }
    config.validate()?;
    Ok(config)
}

/// Write the example configuration to `path`, creating parent directories.
pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AgentConfig::example())?;

    Ok(())
}

/// Token with all but the edges hidden.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_path(Some(Path::new("/etc/banshare/agent.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/banshare/agent.toml"));
    }

    #[test]
    fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);

        init(&path, false).unwrap();
        let config = load(&path, &Overrides::default()).unwrap();
        assert_eq!(config.jail, "sshd");
        assert_eq!(config.chunk_size, 1000);

        assert!(init(&path, false).is_err());
        init(&path, true).unwrap();
    }

    #[test]
    fn test_overrides_apply_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILE_NAME);
        init(&path, false).unwrap();

        let overrides = Overrides {
            server: Some("https://registry.example.net".into()),
            token: None,
        };
        let config = load(&path, &overrides).unwrap();
        assert_eq!(config.server_url, "https://registry.example.net");
        assert_eq!(config.token, "change-me");
    }

    #[test]
    fn test_missing_file_needs_server_and_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILE_NAME);

        let partial = Overrides {
            server: Some("http://127.0.0.1:5000".into()),
            token: None,
        };
        let err = load(&path, &partial).unwrap_err();
        assert!(err.to_string().contains("config init"));

        let full = Overrides {
            token: Some("secret".into()),
            ..partial
        };
        let config = load(&path, &full).unwrap();
        assert_eq!(config.token, "secret");
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, "server_url = \"http://x\"\ntoken = \"t\"\nchunk_size = 0\n").unwrap();

        let err = load(&path, &Overrides::default()).unwrap_err();
        assert!(format!("{err:#}").contains("chunk_size"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("abcdefghijkl"), "abcd...ijkl");
        assert_eq!(mask_token("short"), "****");
    }
}
