use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission code.
///
/// Codes are opaque `module.action` strings (e.g. "facturacion.add_factura").
/// Two wildcard shapes are understood by grant checks:
/// - `"*"` grants everything;
/// - `"module.*"` grants every code of that module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }

    /// Module part of the code: everything before the first `.`.
    ///
    /// A code without a dot is its own module.
    pub fn module(&self) -> &str {
        module_of(self.as_str())
    }

    /// The `module.*` wildcard that would grant this code.
    pub fn module_wildcard(&self) -> String {
        format!("{}.*", self.module())
    }
}

pub(crate) fn module_of(code: &str) -> &str {
    code.split_once('.').map_or(code, |(module, _)| module)
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
