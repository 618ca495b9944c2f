use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: Option<ServerConfig>,
    pub credentials: Option<CredentialsConfig>,
    pub query: Option<QueryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub zotero_id: Option<String>,
    pub zotero_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    pub categories: Option<Vec<String>>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

/// Platform config directory path: `<config_dir>/paperscout/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paperscout").join("config.toml"))
}

/// Load config by cascading CWD `.paperscout.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".paperscout.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        server: Some(ServerConfig {
            base_url: overlay
                .server
                .as_ref()
                .and_then(|s| s.base_url.clone())
                .or_else(|| base.server.as_ref().and_then(|s| s.base_url.clone())),
        }),
        credentials: Some(CredentialsConfig {
            zotero_id: overlay
                .credentials
                .as_ref()
                .and_then(|c| c.zotero_id.clone())
                .or_else(|| base.credentials.as_ref().and_then(|c| c.zotero_id.clone())),
            zotero_key: overlay
                .credentials
                .as_ref()
                .and_then(|c| c.zotero_key.clone())
                .or_else(|| base.credentials.as_ref().and_then(|c| c.zotero_key.clone())),
        }),
        query: Some(QueryConfig {
            categories: overlay
                .query
                .as_ref()
                .and_then(|q| q.categories.clone())
                .or_else(|| base.query.as_ref().and_then(|q| q.categories.clone())),
            date_start: overlay
                .query
                .as_ref()
                .and_then(|q| q.date_start.clone())
                .or_else(|| base.query.as_ref().and_then(|q| q.date_start.clone())),
            date_end: overlay
                .query
                .as_ref()
                .and_then(|q| q.date_end.clone())
                .or_else(|| base.query.as_ref().and_then(|q| q.date_end.clone())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_round_trip_toml() {
        let config = ConfigFile {
            credentials: Some(CredentialsConfig {
                zotero_id: Some("12345".to_string()),
                zotero_key: Some("abcdef".to_string()),
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let creds = parsed.credentials.unwrap();
        assert_eq!(creds.zotero_id.unwrap(), "12345");
        assert_eq!(creds.zotero_key.unwrap(), "abcdef");
    }

    #[test]
    fn missing_sections_deserialize_as_none() {
        let toml_str = "[server]\nbase_url = \"http://localhost:5000\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert!(parsed.credentials.is_none());
        assert!(parsed.query.is_none());
        assert_eq!(
            parsed.server.unwrap().base_url.unwrap(),
            "http://localhost:5000"
        );
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            server: Some(ServerConfig {
                base_url: Some("http://base:5000".to_string()),
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            server: Some(ServerConfig {
                base_url: Some("http://overlay:5000".to_string()),
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(
            merged.server.unwrap().base_url.unwrap(),
            "http://overlay:5000"
        );
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            query: Some(QueryConfig {
                categories: Some(vec!["cs.AI".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(
            merged.query.unwrap().categories.unwrap(),
            vec!["cs.AI".to_string()]
        );
    }
}
