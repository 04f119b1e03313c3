//! Signatures and external function references

use crate::ir::entities::SigRef;
use crate::ir::types::Type;
use crate::ir::valueloc::ValueLoc;
use std::fmt;
use std::str::FromStr;

/// Calling convention named at the end of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallConv {
    #[default]
    SystemV,
    Fast,
    WindowsFastcall,
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallConv::SystemV => "system_v",
            CallConv::Fast => "fast",
            CallConv::WindowsFastcall => "windows_fastcall",
        })
    }
}

impl FromStr for CallConv {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_v" => Ok(CallConv::SystemV),
            "fast" => Ok(CallConv::Fast),
            "windows_fastcall" => Ok(CallConv::WindowsFastcall),
            _ => Err(()),
        }
    }
}

/// What a parameter or return value is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArgumentPurpose {
    #[default]
    Normal,
    /// The return address, passed in and returned back to the caller.
    Link,
}

/// One parameter or return value of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbiParam {
    pub value_type: Type,
    pub purpose: ArgumentPurpose,
    pub location: ValueLoc,
}

impl AbiParam {
    pub fn new(value_type: Type) -> Self {
        Self {
            value_type,
            purpose: ArgumentPurpose::Normal,
            location: ValueLoc::Unassigned,
        }
    }

    pub fn special(value_type: Type, purpose: ArgumentPurpose) -> Self {
        Self {
            value_type,
            purpose,
            location: ValueLoc::Unassigned,
        }
    }

    pub fn with_location(mut self, location: ValueLoc) -> Self {
        self.location = location;
        self
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: Vec<AbiParam>,
    pub returns: Vec<AbiParam>,
    pub call_conv: CallConv,
}

impl Signature {
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            params: Vec::new(),
            returns: Vec::new(),
            call_conv,
        }
    }

    /// True when every parameter and return value has a location.
    pub fn is_assigned(&self) -> bool {
        self.params
            .iter()
            .chain(self.returns.iter())
            .all(|p| p.location.is_assigned())
    }
}

/// An external function declared in the preamble: `fn0 = %name sig0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtFuncData {
    pub name: String,
    pub signature: SigRef,
}
