use crate::error::{FleetError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Parse `NAME=VALUE` pairs from CLI arguments
pub fn parse_assignments(args: &[String]) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                vars.insert(key.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(FleetError::InvalidConfig(format!(
                    "Invalid assignment '{}'. Expected NAME=VALUE",
                    arg
                )));
            }
        }
    }

    Ok(vars)
}

/// Load `KEY=VALUE` lines from a dotenv-style file. A missing file is empty.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(FleetError::InvalidConfig(format!(
                "Failed to read secrets file {}: {}",
                path.display(),
                e
            )))
        }
    };

    let mut vars = BTreeMap::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let value = unquote(value.trim());
            // Blank entries are placeholders copied from the template
            if !value.is_empty() {
                vars.insert(key.trim().to_string(), value.to_string());
            }
        } else {
            return Err(FleetError::InvalidConfig(format!(
                "Invalid line at {}:{}: {}. Expected KEY=VALUE",
                path.display(),
                line_num + 1,
                line
            )));
        }
    }

    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Convert an identifier in camelCase, kebab-case or snake_case to
/// SCREAMING_SNAKE_CASE.
///
/// ```
/// use agent_fleet::utils::env::screaming_snake;
///
/// assert_eq!(screaming_snake("githubToken"), "GITHUB_TOKEN");
/// assert_eq!(screaming_snake("bot-token"), "BOT_TOKEN");
/// ```
pub fn screaming_snake(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;

    for c in s.chars() {
        if c == '-' || c == '_' || c == '.' || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else {
            let boundary = c.is_ascii_uppercase()
                && matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit());
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
        }
        prev = Some(c);
    }

    out.trim_end_matches('_').to_string()
}
