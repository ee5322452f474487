// src/dependency.rs

//! Capability providers and dependencies
//!
//! A package *provides* capabilities (its own name, a shared library soname,
//! a pkgconfig module, ...) and *depends* on capabilities other packages
//! provide. Both sides share the same `(kind, identifier)` shape and a
//! canonical string form used as the provider-index key: plain `identifier`
//! for package names, `kind(identifier)` for everything else.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of capability a provider offers or a dependency requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    /// Plain package name
    PackageName,
    /// Shared library soname, e.g. `libfoo.so.1`
    SharedLibrary,
    /// pkgconfig module
    PkgConfig,
    /// Script interpreter, e.g. `/usr/bin/python3`
    Interpreter,
    /// CMake config module
    CMake,
    /// Binary in `/usr/bin`
    BinaryName,
    /// Binary in `/usr/sbin`
    SystemBinary,
    /// 32-bit pkgconfig module
    PkgConfig32,
}

impl Kind {
    /// Canonical prefix used in the string form
    pub fn prefix(&self) -> &'static str {
        match self {
            Kind::PackageName => "name",
            Kind::SharedLibrary => "soname",
            Kind::PkgConfig => "pkgconfig",
            Kind::Interpreter => "interpreter",
            Kind::CMake => "cmake",
            Kind::BinaryName => "binary",
            Kind::SystemBinary => "sysbinary",
            Kind::PkgConfig32 => "pkgconfig32",
        }
    }

    /// Encode for the stone record value
    pub fn to_wire(self) -> u8 {
        match self {
            Kind::PackageName => 0,
            Kind::SharedLibrary => 1,
            Kind::PkgConfig => 2,
            Kind::Interpreter => 3,
            Kind::CMake => 4,
            Kind::BinaryName => 5,
            Kind::SystemBinary => 6,
            Kind::PkgConfig32 => 7,
        }
    }

    /// Decode from the stone record value
    pub fn from_wire(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Kind::PackageName),
            1 => Ok(Kind::SharedLibrary),
            2 => Ok(Kind::PkgConfig),
            3 => Ok(Kind::Interpreter),
            4 => Ok(Kind::CMake),
            5 => Ok(Kind::BinaryName),
            6 => Ok(Kind::SystemBinary),
            7 => Ok(Kind::PkgConfig32),
            other => Err(Error::Corrupt(format!("unknown capability kind {other}"))),
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "name" => Some(Kind::PackageName),
            "soname" => Some(Kind::SharedLibrary),
            "pkgconfig" => Some(Kind::PkgConfig),
            "interpreter" => Some(Kind::Interpreter),
            "cmake" => Some(Kind::CMake),
            "binary" => Some(Kind::BinaryName),
            "sysbinary" => Some(Kind::SystemBinary),
            "pkgconfig32" => Some(Kind::PkgConfig32),
            _ => None,
        }
    }
}

/// A capability a package offers
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Provider {
    pub kind: Kind,
    pub identifier: String,
}

impl Provider {
    pub fn new(kind: Kind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    /// The implicit provider every package carries for its own name
    pub fn package_name(name: impl Into<String>) -> Self {
        Self::new(Kind::PackageName, name)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::PackageName => write!(f, "{}", self.identifier),
            kind => write!(f, "{}({})", kind.prefix(), self.identifier),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    /// Parse the canonical string form; a bare string is a package name
    fn from_str(s: &str) -> Result<Self> {
        if let Some((prefix, rest)) = s.split_once('(') {
            let identifier = rest.strip_suffix(')').ok_or_else(|| {
                Error::MalformedEntry(format!("unterminated provider spec '{s}'"))
            })?;
            let kind = Kind::from_prefix(prefix)
                .ok_or_else(|| Error::MalformedEntry(format!("unknown provider kind '{prefix}'")))?;
            if identifier.is_empty() {
                return Err(Error::MalformedEntry(format!("empty provider spec '{s}'")));
            }
            return Ok(Self::new(kind, identifier));
        }
        if s.is_empty() {
            return Err(Error::MalformedEntry("empty provider spec".to_string()));
        }
        Ok(Self::package_name(s))
    }
}

/// A capability a package requires: "needs something that provides this"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: Kind,
    pub identifier: String,
}

impl Dependency {
    pub fn new(kind: Kind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    /// The provider that would satisfy this dependency
    pub fn to_provider(&self) -> Provider {
        Provider::new(self.kind, self.identifier.clone())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::PackageName => write!(f, "{}", self.identifier),
            kind => write!(f, "{}({})", kind.prefix(), self.identifier),
        }
    }
}

impl FromStr for Dependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let provider = Provider::from_str(s)?;
        Ok(Self {
            kind: provider.kind,
            identifier: provider.identifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(Provider::package_name("nano").to_string(), "nano");
        assert_eq!(
            Provider::new(Kind::SharedLibrary, "libssl.so.3").to_string(),
            "soname(libssl.so.3)"
        );
        assert_eq!(
            Provider::new(Kind::PkgConfig, "zlib").to_string(),
            "pkgconfig(zlib)"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        for s in [
            "nano",
            "soname(libfoo.so.1)",
            "pkgconfig(openssl)",
            "interpreter(/usr/bin/python3)",
            "cmake(Qt6Core)",
            "binary(git)",
            "sysbinary(useradd)",
            "pkgconfig32(zlib)",
        ] {
            let parsed: Provider = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Provider>().is_err());
        assert!("soname(libfoo.so.1".parse::<Provider>().is_err());
        assert!("frobnicate(foo)".parse::<Provider>().is_err());
        assert!("pkgconfig()".parse::<Provider>().is_err());
    }

    #[test]
    fn test_wire_round_trip() {
        for kind in [
            Kind::PackageName,
            Kind::SharedLibrary,
            Kind::PkgConfig,
            Kind::Interpreter,
            Kind::CMake,
            Kind::BinaryName,
            Kind::SystemBinary,
            Kind::PkgConfig32,
        ] {
            assert_eq!(Kind::from_wire(kind.to_wire()).unwrap(), kind);
        }
        assert!(Kind::from_wire(200).is_err());
    }

    #[test]
    fn test_dependency_to_provider() {
        let dep = Dependency::new(Kind::SharedLibrary, "libz.so.1");
        assert_eq!(dep.to_provider().to_string(), "soname(libz.so.1)");
    }
}
