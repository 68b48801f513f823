//! Parsing of identity reference strings.
//!
//! Accepted forms:
//! - a filesystem path, absolute (`/srv/identities/pm`) or relative (`./pm`, `pm`)
//! - `scheme://host/path[#subfolder]`, where the fragment names a folder inside
//!   a monorepo (`file:///path` is accepted with an empty host)
//!
//! A version pin (tag, branch or commit) is carried next to the reference,
//! never inside it, and is only valid for remote sources.

use crate::error::{FleetError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Local,
    Remote,
}

/// A parsed identity reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentitySource {
    pub kind: SourceKind,
    pub location: String,
    pub subfolder: Option<String>,
    pub version_ref: Option<String>,
}

impl IdentitySource {
    /// Parse a reference string plus an optional version pin
    pub fn parse(reference: &str, version_ref: Option<&str>) -> Result<Self> {
        let invalid = |reason: &str| FleetError::InvalidSource {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.trim().is_empty() {
            return Err(invalid("reference is empty"));
        }
        if reference.trim() != reference {
            return Err(invalid("reference has surrounding whitespace"));
        }
        if reference.chars().any(|c| c.is_control()) {
            return Err(invalid("reference contains control characters"));
        }

        let version_ref = match version_ref {
            Some(v) => Some(parse_version_ref(v).map_err(|reason| invalid(&reason))?),
            None => None,
        };

        if let Some((scheme, rest)) = reference.split_once("://") {
            let (location, subfolder) =
                parse_remote(scheme, rest, reference).map_err(|reason| invalid(&reason))?;
            return Ok(Self {
                kind: SourceKind::Remote,
                location,
                subfolder,
                version_ref,
            });
        }

        parse_local(reference).map_err(|reason| invalid(&reason))?;
        if version_ref.is_some() {
            return Err(invalid(
                "version pins apply only to remote sources; check out the wanted revision locally instead",
            ));
        }

        Ok(Self {
            kind: SourceKind::Local,
            location: reference.to_string(),
            subfolder: None,
            version_ref: None,
        })
    }

    pub fn is_remote(&self) -> bool {
        self.kind == SourceKind::Remote
    }

    /// The reference string without the version pin (`location[#subfolder]`)
    pub fn reference(&self) -> String {
        match &self.subfolder {
            Some(sub) => format!("{}#{}", self.location, sub),
            None => self.location.clone(),
        }
    }

    /// Human-readable label including the version pin
    pub fn label(&self) -> String {
        match &self.version_ref {
            Some(v) => format!("{} @ {}", self.reference(), v),
            None => self.reference(),
        }
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

impl FromStr for IdentitySource {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None)
    }
}

fn parse_remote(
    scheme: &str,
    rest: &str,
    reference: &str,
) -> std::result::Result<(String, Option<String>), String> {
    let mut scheme_chars = scheme.chars();
    let scheme_ok = matches!(scheme_chars.next(), Some(c) if c.is_ascii_alphabetic())
        && scheme_chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !scheme_ok {
        return Err(format!("'{}' is not a valid URL scheme", scheme));
    }
    if reference.chars().any(char::is_whitespace) {
        return Err("remote references cannot contain whitespace".to_string());
    }

    let (base, fragment) = match reference.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (reference, None),
    };
    let rest_base = &rest[..rest.len() - fragment.map(|f| f.len() + 1).unwrap_or(0)];

    let (host, path) = rest_base.split_once('/').unwrap_or((rest_base, ""));
    if host.is_empty() && !scheme.eq_ignore_ascii_case("file") {
        return Err("missing host".to_string());
    }
    if path.trim_matches('/').is_empty() {
        return Err("missing repository path".to_string());
    }

    let subfolder = match fragment {
        None => None,
        Some("") => return Err("empty #subfolder fragment".to_string()),
        Some(f) => {
            if f.starts_with('/') || f.contains('\\') {
                return Err("#subfolder must be a relative path using '/'".to_string());
            }
            if f.split('/').any(|part| part == "..") {
                return Err("#subfolder cannot contain '..'".to_string());
            }
            if f.contains('#') {
                return Err("only one #subfolder fragment is allowed".to_string());
            }
            Some(f.to_string())
        }
    };

    Ok((base.to_string(), subfolder))
}

fn parse_local(reference: &str) -> std::result::Result<(), String> {
    if reference.contains('#') {
        return Err(
            "#subfolder fragments are only supported for remote sources; point the path at the folder directly"
                .to_string(),
        );
    }
    // `host:path` without `://` is an scp-style remote, which we do not accept
    if let Some((head, _)) = reference.split_once(':') {
        if !head.contains('/') {
            return Err(format!(
                "'{}' looks like a remote without a scheme; use ssh://{}/... or https://",
                reference, head
            ));
        }
    }
    Ok(())
}

fn parse_version_ref(version: &str) -> std::result::Result<String, String> {
    if version.trim().is_empty() {
        return Err("version pin is empty".to_string());
    }
    if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("version pin '{}' contains whitespace", version));
    }
    if version.starts_with('-') {
        return Err(format!("version pin '{}' cannot start with '-'", version));
    }
    if version.contains("..") {
        return Err(format!("version pin '{}' cannot contain '..'", version));
    }
    Ok(version.to_string())
}
