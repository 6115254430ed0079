use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clubranks", about = "Club leaderboards with daily streaks")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub scoring: ScoringConfig,
    pub pagination: PaginationConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
    pub bcrypt_cost: u32,
}

/// Tunables for the leaderboard engine. Handed to it at construction.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Delta applied when a score update does not name one.
    pub increment: i64,
    /// Minutes after a check-in before the next one is suggested.
    pub cooldown_minutes: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    pub leaderboard_limit: u32,
    pub messages_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            increment: 1,
            cooldown_minutes: 720,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            leaderboard_limit: 50,
            messages_limit: 50,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("clubranks.db"));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject durations chrono cannot represent.
    pub fn validate(&self) -> anyhow::Result<()> {
        if crate::auth::session::session_lifetime(self.auth.session_hours).is_none() {
            anyhow::bail!("auth.session_hours = {} is out of range", self.auth.session_hours);
        }
        let cooldown = self.scoring.cooldown_minutes;
        if cooldown < 0 || chrono::Duration::try_minutes(cooldown).is_none() {
            anyhow::bail!("scoring.cooldown_minutes = {cooldown} is out of range");
        }
        Ok(())
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".clubranks")
        })
    }

    /// Database location; `None` only before `load` has resolved it.
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.database.path.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_for(data_dir: PathBuf) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(data_dir),
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_hours, 24);
        assert_eq!(config.scoring.increment, 1);
        assert_eq!(config.scoring.cooldown_minutes, 720);
        assert_eq!(config.pagination.leaderboard_limit, 50);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn data_dir_defaults_to_home_dot_clubranks() {
        let cli = Cli {
            config: None,
            host: None,
            port: None,
            data_dir: None,
        };
        assert!(Config::data_dir(&cli).ends_with(".clubranks"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_for(tmp.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.db_path(), Some(&tmp.path().join("clubranks.db")));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[scoring]
increment = 5
cooldown_minutes = 60
"#,
        )
        .unwrap();

        let mut cli = cli_for(tmp.path().to_path_buf());
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.scoring,
            ScoringConfig {
                increment: 5,
                cooldown_minutes: 60
            }
        );
    }

    #[test]
    fn load_rejects_out_of_range_durations() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        let mut cli = cli_for(tmp.path().to_path_buf());
        cli.config = Some(config_path.clone());

        std::fs::write(&config_path, "[scoring]\ncooldown_minutes = 9223372036854775807\n").unwrap();
        let err = Config::load(&cli).unwrap_err();
        assert!(err.to_string().contains("cooldown_minutes"));

        std::fs::write(&config_path, "[auth]\nsession_hours = 9223372036854775807\n").unwrap();
        let err = Config::load(&cli).unwrap_err();
        assert!(err.to_string().contains("session_hours"));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "192.168.1.1"
port = 9000
"#,
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            host: Some("10.0.0.1".to_string()),
            port: Some(4000),
            data_dir: Some(tmp.path().to_path_buf()),
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 4000);
    }
}
