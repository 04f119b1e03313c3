//! Shared settings from `set` lines
//!
//! `set name=value` lines in a fixture configure the flags shared by all ISAs.
//! ISA specific flags follow the ISA name on the `isa` line and are handled by
//! the ISA itself, using [`parse_bool`] for their values.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    #[error("unknown setting `{0}`")]
    BadName(String),

    #[error("invalid value `{value}` for setting `{name}`")]
    BadValue { name: String, value: String },

    #[error("unknown ISA `{0}`")]
    UnknownIsa(String),
}

/// Optimization level requested by `set opt_level=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    Default,
    Best,
    Fastest,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptLevel::Default => "default",
            OptLevel::Best => "best",
            OptLevel::Fastest => "fastest",
        })
    }
}

/// Flags shared by all targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    pub is_64bit: bool,
    /// Run the IR verifier between passes.
    pub enable_verifier: bool,
    pub opt_level: OptLevel,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            is_64bit: false,
            enable_verifier: true,
            opt_level: OptLevel::Default,
        }
    }
}

/// Parse a boolean setting. A bare flag name means `true`.
pub fn parse_bool(name: &str, value: Option<&str>) -> Result<bool, SettingError> {
    match value {
        None | Some("1") | Some("true") => Ok(true),
        Some("0") | Some("false") => Ok(false),
        Some(other) => Err(SettingError::BadValue {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `set` assignment.
    pub fn set(&mut self, name: &str, value: Option<&str>) -> Result<(), SettingError> {
        match name {
            "is_64bit" => self.is_64bit = parse_bool(name, value)?,
            "enable_verifier" => self.enable_verifier = parse_bool(name, value)?,
            "opt_level" => {
                self.opt_level = match value {
                    Some("default") => OptLevel::Default,
                    Some("best") => OptLevel::Best,
                    Some("fastest") => OptLevel::Fastest,
                    _ => {
                        return Err(SettingError::BadValue {
                            name: name.to_string(),
                            value: value.unwrap_or("").to_string(),
                        })
                    }
                }
            }
            _ => return Err(SettingError::BadName(name.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let flags = Flags::new();
        assert!(!flags.is_64bit);
        assert!(flags.enable_verifier);
        assert_eq!(flags.opt_level, OptLevel::Default);
    }

    #[test]
    fn set_accepts_bare_and_explicit_values() {
        let mut flags = Flags::new();
        flags.set("is_64bit", None).unwrap();
        flags.set("enable_verifier", Some("0")).unwrap();
        flags.set("opt_level", Some("best")).unwrap();
        assert!(flags.is_64bit);
        assert!(!flags.enable_verifier);
        assert_eq!(flags.opt_level, OptLevel::Best);
    }

    #[test]
    fn set_rejects_unknown_names_and_values() {
        let mut flags = Flags::new();
        assert_eq!(
            flags.set("is_128bit", None),
            Err(SettingError::BadName("is_128bit".to_string()))
        );
        assert!(flags.set("is_64bit", Some("yes")).is_err());
        assert!(flags.set("opt_level", None).is_err());
    }
}
