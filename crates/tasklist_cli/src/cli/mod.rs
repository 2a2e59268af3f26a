use clap::{Parser, Subcommand};
use tasklist_core::config::ConfigOverrides;
use tasklist_core::error::AppError;
use tasklist_core::model::{Filter, Priority};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: tasklist add "Buy milk" --priority high
    /// Example: tasklist add "File taxes" --due 2026-04-15
    Add {
        text: Option<String>,
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<String>,
    },
    /// Mark a task completed, or reopen a completed one
    ///
    /// Example: tasklist toggle 1734652800000
    Toggle {
        id: String,
    },
    /// Delete a task
    ///
    /// Example: tasklist delete 1734652800000
    Delete {
        id: String,
    },
    /// List tasks, highest priority first
    ///
    /// Example: tasklist list
    /// Example: tasklist list --filter pending
    List {
        #[arg(short, long, value_parser = parse_filter)]
        filter: Option<Filter>,
    },
    /// Switch the active filter and show the result
    ///
    /// Example: filter completed
    Filter {
        #[arg(value_parser = parse_filter)]
        filter: Filter,
    },
    /// Show completions over the last seven days
    ///
    /// Example: tasklist stats
    Stats,
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse::<Priority>().map_err(|err| err.message().to_string())
}

fn parse_filter(raw: &str) -> Result<Filter, String> {
    raw.parse::<Filter>().map_err(|err| err.message().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    Theme,
    DefaultPriority,
    DefaultFilter,
    SyncEnabled,
    SyncDelayMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let canonical_key =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match canonical_key.as_str() {
        "theme" => ConfigOverrideTarget::Theme,
        "default_priority" | "priority" => ConfigOverrideTarget::DefaultPriority,
        "default_filter" | "filter" => ConfigOverrideTarget::DefaultFilter,
        "sync_enabled" => ConfigOverrideTarget::SyncEnabled,
        "sync_delay_ms" => ConfigOverrideTarget::SyncDelayMs,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Fold every `--config-override` flag into one overrides set; later flags
/// win.
pub fn collect_overrides(raw_overrides: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();

    for raw in raw_overrides {
        let parsed = parse_config_override(raw).map_err(AppError::invalid_input)?;
        let value = parsed.value.as_str();
        match parsed.target {
            ConfigOverrideTarget::Theme => overrides.theme = Some(value.to_string()),
            ConfigOverrideTarget::DefaultPriority => {
                overrides.default_priority = Some(value.parse::<Priority>()?)
            }
            ConfigOverrideTarget::DefaultFilter => {
                overrides.default_filter = Some(value.parse::<Filter>()?)
            }
            ConfigOverrideTarget::SyncEnabled => {
                let enabled = value.parse::<bool>().map_err(|_| {
                    AppError::invalid_input("sync.enabled must be true or false")
                })?;
                overrides.sync_enabled = Some(enabled);
            }
            ConfigOverrideTarget::SyncDelayMs => {
                let delay_ms = value.parse::<u64>().map_err(|_| {
                    AppError::invalid_input("sync.delay_ms must be a whole number")
                })?;
                overrides.sync_delay_ms = Some(delay_ms);
            }
        }
    }

    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrideTarget, collect_overrides, parse_config_override};
    use tasklist_core::model::{Filter, Priority};

    #[test]
    fn parse_config_override_canonicalizes_field_names() {
        let parsed = parse_config_override(" THEME = Midnight ").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::Theme);
        assert_eq!(parsed.value, "Midnight");
    }

    #[test]
    fn parse_config_override_maps_dotted_sync_keys() {
        let parsed = parse_config_override("sync.delay-ms=250").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::SyncDelayMs);
        assert_eq!(parsed.value, "250");
    }

    #[test]
    fn parse_config_override_rejects_unknown_fields() {
        let err = parse_config_override("unknown.field=value").unwrap_err();
        assert!(err.contains("unknown config field"));
    }

    #[test]
    fn parse_config_override_rejects_missing_equals() {
        let err = parse_config_override("themenoir").unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn collect_overrides_folds_values() {
        let raw = vec![
            "default_priority=low".to_string(),
            "filter=pending".to_string(),
            "sync.enabled=false".to_string(),
            "default_priority=high".to_string(),
        ];

        let overrides = collect_overrides(&raw).unwrap();

        assert_eq!(overrides.default_priority, Some(Priority::High));
        assert_eq!(overrides.default_filter, Some(Filter::Pending));
        assert_eq!(overrides.sync_enabled, Some(false));
        assert_eq!(overrides.theme, None);
    }

    #[test]
    fn collect_overrides_rejects_bad_values() {
        let err = collect_overrides(&["sync.delay_ms=soon".to_string()]).unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = collect_overrides(&["priority=urgent".to_string()]).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }
}
