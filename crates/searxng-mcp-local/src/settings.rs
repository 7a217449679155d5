//! On-disk SearXNG settings used when provisioning a container.

use searxng_mcp_core::{Error, Result};
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "settings.yml";
/// Relative to the working directory; copied in preference to the built-in default.
pub const PROJECT_SETTINGS_PATH: &str = "config/settings.yml";

/// JSON output must stay enabled: the gateway only speaks `format=json`.
pub const DEFAULT_SETTINGS: &str = r#"general:
  debug: false
  instance_name: "SearXNG MCP"
  privacypolicy_url: false
  donation_url: false
  contact_url: false
  enable_metrics: false

search:
  safe_search: 0
  autocomplete: ""
  autocomplete_min: 4
  favicon_resolver: ""
  default_lang: "auto"
  formats:
    - html
    - json

server:
  port: 8080
  bind_address: "0.0.0.0"
  secret_key: "changeme"
  image_proxy: false
  http_protocol_version: "1.0"
  method: "POST"

categories_as_tabs:
  general:
  images:
  videos:
  news:
  map:
  music:
  it:
  science:
  files:
  social media:

engines:
  - name: google
    engine: google
    shortcut: go

  - name: bing
    engine: bing
    shortcut: bi

  - name: duckduckgo
    engine: duckduckgo
    shortcut: ddg

  - name: wikipedia
    engine: wikipedia
    shortcut: wp
    display_type: ["infobox"]
    categories: [general]
"#;

pub fn default_config_dir() -> PathBuf {
    if let Some(p) = std::env::var("SEARXNG_MCP_CONFIG_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
    {
        return PathBuf::from(p);
    }
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join("searxng-mcp")
}

/// Ensure `<config_dir>/settings.yml` exists and return its path.
///
/// An existing file is left alone. Otherwise `project_settings` is copied when it exists,
/// falling back to [`DEFAULT_SETTINGS`] if there is none or the copy fails.
pub async fn ensure_settings(config_dir: &Path, project_settings: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(config_dir).await.map_err(|e| {
        Error::Bootstrap(format!(
            "failed to create config directory {}: {e}",
            config_dir.display()
        ))
    })?;

    let path = config_dir.join(SETTINGS_FILE);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(path);
    }

    if tokio::fs::try_exists(project_settings).await.unwrap_or(false) {
        match tokio::fs::copy(project_settings, &path).await {
            Ok(_) => {
                tracing::info!(from = %project_settings.display(), to = %path.display(), "copied project settings");
                return Ok(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to copy project settings, writing default");
            }
        }
    }

    tracing::info!(path = %path.display(), "writing default searxng settings");
    tokio::fs::write(&path, DEFAULT_SETTINGS)
        .await
        .map_err(|e| Error::Bootstrap(format!("failed to create default settings: {e}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use searxng_mcp_core::Category;

    #[test]
    fn default_settings_enable_json_and_all_category_tabs() {
        assert!(DEFAULT_SETTINGS.contains("    - json"));
        for c in Category::all() {
            assert!(
                DEFAULT_SETTINGS.contains(&format!("  {}:\n", c.as_str())),
                "missing tab {c}"
            );
        }
    }

    #[tokio::test]
    async fn writes_default_when_nothing_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("searxng-mcp");
        let p = ensure_settings(&dir, &tmp.path().join("missing.yml"))
            .await
            .unwrap();
        assert_eq!(p, dir.join(SETTINGS_FILE));
        assert_eq!(std::fs::read_to_string(&p).unwrap(), DEFAULT_SETTINGS);
    }

    #[tokio::test]
    async fn prefers_project_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project.yml");
        std::fs::write(&project, "general:\n  debug: true\n").unwrap();
        let p = ensure_settings(&tmp.path().join("cfg"), &project)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(p).unwrap(),
            "general:\n  debug: true\n"
        );
    }

    #[tokio::test]
    async fn never_overwrites_existing_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().join(SETTINGS_FILE);
        std::fs::write(&existing, "custom: true\n").unwrap();
        let p = ensure_settings(tmp.path(), &tmp.path().join("missing.yml"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(p).unwrap(), "custom: true\n");
    }
}
