use crate::error::{Result, YaftiError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Action / Screen
// ---------------------------------------------------------------------------

/// A toggleable script shown on a screen and executed on the final screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Pre-selected when the screen is first shown.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub script: String,
}

impl Action {
    pub fn has_script(&self) -> bool {
        !self.script.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn default_title() -> String {
    "Yafti".to_string()
}

/// The loaded action catalog file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub screens: Vec<Screen>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: default_title(),
            screens: Vec::new(),
        }
    }
}

impl Config {
    /// Read, parse and validate the config file at `path`.
    ///
    /// Any failure is reported as `ConfigUnavailable` or `InvalidConfig`; the
    /// caller treats both as fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read_to_string(path).map_err(|e| YaftiError::ConfigUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let cfg = Self::from_yaml_str(&data).map_err(|e| match e {
            YaftiError::Yaml(e) => YaftiError::ConfigUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            other => other,
        })?;
        tracing::debug!(
            path = %path.display(),
            screens = cfg.screens.len(),
            "config loaded"
        );
        Ok(cfg)
    }

    /// Parse a config document. JSON documents are accepted as YAML.
    pub fn from_yaml_str(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        let errors: Vec<String> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(YaftiError::InvalidConfig(errors.join("; ")));
        }
        Ok(cfg)
    }

    pub fn screen(&self, index: usize) -> Result<&Screen> {
        self.screens
            .get(index)
            .ok_or(YaftiError::ScreenNotFound(index))
    }

    /// Every action across every screen, in catalog order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.screens.iter().flat_map(|s| s.actions.iter())
    }

    /// IDs of actions that start out selected, sorted and de-duplicated.
    pub fn default_action_ids(&self) -> Vec<String> {
        crate::selection::normalize_ids(
            self.actions()
                .filter(|a| a.default)
                .map(|a| a.id.clone())
                .collect(),
        )
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.screens.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "config defines no screens".into(),
            });
        }

        let mut seen = HashSet::new();
        for (idx, screen) in self.screens.iter().enumerate() {
            if screen.actions.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("screen {idx} ('{}') has no actions", screen.title),
                });
            }

            for action in &screen.actions {
                if action.id.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "action '{}' on screen {idx} has an empty id",
                            action.title
                        ),
                    });
                    continue;
                }
                // Later duplicates replace earlier ones in the catalog.
                if !seen.insert(action.id.as_str()) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "duplicate action id '{}' (the last definition wins)",
                            action.id
                        ),
                    });
                }
                if !action.has_script() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!("action '{}' has no script", action.id),
                    });
                }
            }
        }

        warnings
    }
}
