//! Runtime configuration of the standalone daemon, read from the environment.

use crate::models::tado::HomeId;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TOKEN_FILE: &str = "token.txt";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_REGISTER_DEBOUNCE_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    /// Tado OAuth refresh token obtained via browser login.
    pub tado_refresh_token: String,
    /// Where rotated refresh tokens are persisted.
    pub tado_refresh_token_file: PathBuf,
    pub poll_interval: Duration,
    pub register_debounce: Duration,
    /// Public URL remote webhooks deliver to. Webhooks are off when unset.
    pub webhook_callback_url: Option<String>,
    /// Read inbound webhook deliveries as JSON lines from stdin.
    pub webhook_stdin: bool,
    /// Only sync these homes. Empty means every home of the account.
    pub home_ids: Vec<HomeId>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tado_refresh_token_file =
            PathBuf::from(var("TADO_REFRESH_TOKEN_FILE").unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string()));
        // The file holds the most recently rotated token, so it wins over the variable.
        let tado_refresh_token = match std::fs::read_to_string(&tado_refresh_token_file) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => var("TADO_REFRESH_TOKEN").ok_or_else(|| {
                format!(
                    "Missing refresh token: set TADO_REFRESH_TOKEN or provide {}",
                    tado_refresh_token_file.display()
                )
            })?,
        };

        let poll_secs = parse_number(var("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be greater than zero".to_string());
        }
        let debounce_ms = parse_number(
            var("REGISTER_DEBOUNCE_MS"),
            "REGISTER_DEBOUNCE_MS",
            DEFAULT_REGISTER_DEBOUNCE_MS,
        )?;

        let webhook_stdin = var("WEBHOOK_STDIN")
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        let home_ids = match var("HOME_IDS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>()
                        .map(HomeId)
                        .map_err(|_| format!("HOME_IDS contains an invalid home id: {}", s))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Config {
            tado_refresh_token,
            tado_refresh_token_file,
            poll_interval: Duration::from_secs(poll_secs),
            register_debounce: Duration::from_millis(debounce_ms),
            webhook_callback_url: var("WEBHOOK_CALLBACK_URL"),
            webhook_stdin,
            home_ids,
        })
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64, String> {
    match value {
        Some(s) => s
            .parse::<u64>()
            .map_err(|_| format!("{} must be a non-negative integer, got {}", key, s)),
        None => Ok(default),
    }
}

/// Load `KEY=value` lines from `path` into the process environment.
/// Variables already set in the environment are kept.
pub fn load_env_file(path: &Path) -> Result<(), String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (index, line) in content.lines().enumerate() {
        let Some((key, value)) =
            parse_env_assignment(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(format!("invalid environment variable name: {:?}", key));
    }

    let raw = raw.trim();
    let value = match raw.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let rest = &raw[1..];
            let end = rest
                .find(quote)
                .ok_or_else(|| format!("unterminated {} quoted value", quote))?;
            let remainder = rest[end + 1..].trim();
            if !remainder.is_empty() && !remainder.starts_with('#') {
                return Err("unexpected characters after closing quote".to_string());
            }
            rest[..end].to_string()
        }
        _ => raw.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    const NO_FILE: (&str, &str) = ("TADO_REFRESH_TOKEN_FILE", "tests/data/does-not-exist.txt");

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let cfg = Config::from_lookup(lookup(&[NO_FILE, ("TADO_REFRESH_TOKEN", " abc ")])).unwrap();
        assert_eq!(cfg.tado_refresh_token, "abc");
        assert_eq!(cfg.poll_interval, Duration::from_secs(900));
        assert_eq!(cfg.register_debounce, Duration::from_millis(200));
        assert_eq!(cfg.webhook_callback_url, None);
        assert!(!cfg.webhook_stdin);
        assert!(cfg.home_ids.is_empty());
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = Config::from_lookup(lookup(&[NO_FILE])).unwrap_err();
        assert!(err.contains("TADO_REFRESH_TOKEN"));
    }

    #[test]
    fn explicit_values_are_parsed() {
        let cfg = Config::from_lookup(lookup(&[
            NO_FILE,
            ("TADO_REFRESH_TOKEN", "abc"),
            ("POLL_INTERVAL_SECS", "60"),
            ("REGISTER_DEBOUNCE_MS", "0"),
            ("WEBHOOK_CALLBACK_URL", "https://hub.example/hook"),
            ("WEBHOOK_STDIN", "1"),
            ("HOME_IDS", "12, 34"),
        ]))
        .unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.register_debounce, Duration::ZERO);
        assert_eq!(cfg.webhook_callback_url.as_deref(), Some("https://hub.example/hook"));
        assert!(cfg.webhook_stdin);
        assert_eq!(cfg.home_ids, vec![HomeId(12), HomeId(34)]);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        for (key, value) in [("POLL_INTERVAL_SECS", "soon"), ("POLL_INTERVAL_SECS", "0"), ("HOME_IDS", "1,x")] {
            let result = Config::from_lookup(lookup(&[NO_FILE, ("TADO_REFRESH_TOKEN", "abc"), (key, value)]));
            assert!(result.is_err(), "{key}={value} accepted");
        }
    }

    #[test]
    fn env_assignments_are_parsed() {
        assert_eq!(parse_env_assignment("# comment").unwrap(), None);
        assert_eq!(parse_env_assignment("   ").unwrap(), None);
        assert_eq!(
            parse_env_assignment("export A = b # trailing").unwrap(),
            Some(("A".to_string(), "b".to_string()))
        );
        assert_eq!(
            parse_env_assignment("URL=\"https://x/#y\"").unwrap(),
            Some(("URL".to_string(), "https://x/#y".to_string()))
        );
        assert_eq!(
            parse_env_assignment("T='a b'").unwrap(),
            Some(("T".to_string(), "a b".to_string()))
        );
        assert!(parse_env_assignment("novalue").is_err());
        assert!(parse_env_assignment("T='open").is_err());
        assert!(parse_env_assignment("A B=c").is_err());
    }
}
