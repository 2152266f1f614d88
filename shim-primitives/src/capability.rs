//! Capability families guarded by the shim and the guarantees that restrict them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Family of host operations a tool may attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Reading files, directories, or file metadata.
    FilesystemRead,
    /// Creating, modifying, or removing filesystem entries.
    FilesystemWrite,
    /// Outbound HTTP(S) requests and raw or TLS socket connections.
    Network,
    /// Creating child processes.
    Subprocess,
    /// Reading, enumerating, or probing environment variables.
    EnvRead,
    /// Setting or deleting environment variables.
    EnvWrite,
    /// Access to a canonical secret through the environment.
    Secrets,
}

impl Capability {
    /// Every capability family, in wire order.
    pub const ALL: [Self; 7] = [
        Self::FilesystemRead,
        Self::FilesystemWrite,
        Self::Network,
        Self::Subprocess,
        Self::EnvRead,
        Self::EnvWrite,
        Self::Secrets,
    ];

    /// Returns the wire name of the capability.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilesystemRead => "filesystem_read",
            Self::FilesystemWrite => "filesystem_write",
            Self::Network => "network",
            Self::Subprocess => "subprocess",
            Self::EnvRead => "env_read",
            Self::EnvWrite => "env_write",
            Self::Secrets => "secrets",
        }
    }

    /// Returns the guarantee that restricts this capability.
    #[must_use]
    pub const fn guarantee_key(self) -> GuaranteeKey {
        match self {
            Self::FilesystemRead => GuaranteeKey::NoFilesystemRead,
            Self::FilesystemWrite => GuaranteeKey::NoFilesystemWrite,
            Self::Network => GuaranteeKey::NoNetwork,
            Self::Subprocess => GuaranteeKey::NoSubprocess,
            Self::EnvRead => GuaranteeKey::NoEnvRead,
            Self::EnvWrite => GuaranteeKey::NoEnvWrite,
            Self::Secrets => GuaranteeKey::SecretsAllowed,
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|capability| capability.as_str() == s)
            .ok_or_else(|| Error::UnknownCapability { name: s.into() })
    }
}

/// Key of a guarantee inside the capability context.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeKey {
    /// Forbids filesystem reads.
    NoFilesystemRead,
    /// Forbids filesystem writes.
    NoFilesystemWrite,
    /// Forbids network access.
    NoNetwork,
    /// Forbids subprocess creation.
    NoSubprocess,
    /// Forbids environment reads.
    NoEnvRead,
    /// Forbids environment writes.
    NoEnvWrite,
    /// Restricts which canonical secrets may be touched.
    SecretsAllowed,
}

impl GuaranteeKey {
    /// Returns the wire name of the guarantee.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoFilesystemRead => "no_filesystem_read",
            Self::NoFilesystemWrite => "no_filesystem_write",
            Self::NoNetwork => "no_network",
            Self::NoSubprocess => "no_subprocess",
            Self::NoEnvRead => "no_env_read",
            Self::NoEnvWrite => "no_env_write",
            Self::SecretsAllowed => "secrets_allowed",
        }
    }
}

impl Display for GuaranteeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a capability check was decided the way it was.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The matching guarantee does not restrict the operation.
    GuaranteeAllowed,
    /// The matching guarantee forbids the operation.
    GuaranteeBlocked,
    /// The requested secret is on the allow-list.
    SecretsAllowed,
    /// The requested secret is not on the allow-list.
    SecretsBlocked,
}

impl ReasonCode {
    /// Returns the wire name of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GuaranteeAllowed => "guarantee_allowed",
            Self::GuaranteeBlocked => "guarantee_blocked",
            Self::SecretsAllowed => "secrets_allowed",
            Self::SecretsBlocked => "secrets_blocked",
        }
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a filesystem access.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AccessMode {
    /// The operation only observes the filesystem.
    Read,
    /// The operation creates, changes, or removes filesystem state.
    Write,
}

impl AccessMode {
    /// Classifies a symbolic open mode (`"r"`, `"w+"`, `"ax"`, ...).
    ///
    /// Any of `w`, `a`, `x`, or `+` makes the mode a write.
    #[must_use]
    pub fn from_symbolic(mode: &str) -> Self {
        if mode.chars().any(|c| matches!(c, 'w' | 'a' | 'x' | '+')) {
            Self::Write
        } else {
            Self::Read
        }
    }

    /// Returns the capability that governs this access direction.
    #[must_use]
    pub const fn capability(self) -> Capability {
        match self {
            Self::Read => Capability::FilesystemRead,
            Self::Write => Capability::FilesystemWrite,
        }
    }

    /// Returns `true` for write accesses.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names_round_trip() {
        for capability in Capability::ALL {
            let parsed: Capability = capability.as_str().parse().expect("parse");
            assert_eq!(parsed, capability);
        }
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn capability_serializes_snake_case() {
        let value = serde_json::to_value(Capability::FilesystemWrite).unwrap();
        assert_eq!(value, "filesystem_write");
        let value = serde_json::to_value(ReasonCode::SecretsBlocked).unwrap();
        assert_eq!(value, "secrets_blocked");
    }

    #[test]
    fn secrets_map_to_allow_list_guarantee() {
        assert_eq!(
            Capability::Secrets.guarantee_key().as_str(),
            "secrets_allowed"
        );
        assert_eq!(Capability::EnvWrite.guarantee_key().as_str(), "no_env_write");
    }

    #[test]
    fn symbolic_modes_classify() {
        assert_eq!(AccessMode::from_symbolic("r"), AccessMode::Read);
        assert_eq!(AccessMode::from_symbolic("rs"), AccessMode::Read);
        assert_eq!(AccessMode::from_symbolic(""), AccessMode::Read);
        for mode in ["w", "r+", "a", "ax", "wx+"] {
            assert_eq!(AccessMode::from_symbolic(mode), AccessMode::Write, "{mode}");
        }
    }
}
