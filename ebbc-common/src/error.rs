//! Error handling for the EBB code generator
//!
//! Every pipeline stage reports failures through [`CodegenError`]. Entities
//! (`inst4`, `ebb2`, `v7`) are carried as display strings so that this crate
//! does not depend on the IR.

use crate::source_loc::SourceLocation;
use thiserror::Error;

/// Main error type shared by all stages of the pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error("Syntax error at {location}: {message}")]
    Syntax {
        location: SourceLocation,
        message: String,
    },

    #[error("Unsupported operation `{opcode}.{ty}` at {inst}: {message}")]
    UnsupportedOperation {
        opcode: String,
        ty: String,
        inst: String,
        message: String,
    },

    #[error("ABI error: {message}")]
    Abi { message: String },

    #[error("Invalid CFG at {ebb}: {message}")]
    InvalidCfg { ebb: String, message: String },

    #[error("Verifier error at {entity}: {message}")]
    Verifier { entity: String, message: String },

    #[error("Register pressure at {entity}: {message}")]
    RegisterPressure { entity: String, message: String },

    #[error("Internal error at {entity}: {message}")]
    Internal { entity: String, message: String },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    pub fn syntax(location: SourceLocation, message: impl Into<String>) -> Self {
        CodegenError::Syntax {
            location,
            message: message.into(),
        }
    }

    pub fn abi(message: impl Into<String>) -> Self {
        CodegenError::Abi {
            message: message.into(),
        }
    }

    pub fn invalid_cfg(ebb: impl ToString, message: impl Into<String>) -> Self {
        CodegenError::InvalidCfg {
            ebb: ebb.to_string(),
            message: message.into(),
        }
    }

    pub fn verifier(entity: impl ToString, message: impl Into<String>) -> Self {
        CodegenError::Verifier {
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    pub fn register_pressure(entity: impl ToString, message: impl Into<String>) -> Self {
        CodegenError::RegisterPressure {
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(entity: impl ToString, message: impl Into<String>) -> Self {
        CodegenError::Internal {
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    /// Short category name used by the test reporter and the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            CodegenError::Syntax { .. } => "syntax",
            CodegenError::UnsupportedOperation { .. } => "unsupported",
            CodegenError::Abi { .. } => "abi",
            CodegenError::InvalidCfg { .. } => "invalid-cfg",
            CodegenError::Verifier { .. } => "verifier",
            CodegenError::RegisterPressure { .. } => "register-pressure",
            CodegenError::Internal { .. } => "internal",
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            CodegenError::Syntax { message, .. }
            | CodegenError::UnsupportedOperation { message, .. }
            | CodegenError::Abi { message }
            | CodegenError::InvalidCfg { message, .. }
            | CodegenError::Verifier { message, .. }
            | CodegenError::RegisterPressure { message, .. }
            | CodegenError::Internal { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn syntax_error_carries_location() {
        let err = CodegenError::syntax(SourceLocation::new(4, 9), "unknown opcode `iaddd`");
        assert_eq!(
            err.to_string(),
            "Syntax error at 4:9: unknown opcode `iaddd`"
        );
        assert_eq!(err.kind(), "syntax");
    }

    #[test]
    fn invalid_cfg_names_the_ebb() {
        let err = CodegenError::invalid_cfg("ebb1", "parameter v2 has no incoming argument");
        assert_eq!(
            err.to_string(),
            "Invalid CFG at ebb1: parameter v2 has no incoming argument"
        );
        assert_eq!(err.message(), "parameter v2 has no incoming argument");
    }

    #[test]
    fn unsupported_operation_display() {
        let err = CodegenError::UnsupportedOperation {
            opcode: "iadd".to_string(),
            ty: "i64".to_string(),
            inst: "inst3".to_string(),
            message: "i64 values need a 64-bit target".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operation `iadd.i64` at inst3: i64 values need a 64-bit target"
        );
    }
}
