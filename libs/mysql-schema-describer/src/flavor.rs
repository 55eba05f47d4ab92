//! Vendor and version detection. Feature availability differs between MySQL
//! and MariaDB and between point releases, so the differ and the verifier
//! both carry a [`Flavor`] around.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").unwrap());

/// The server vendor.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum Vendor {
    #[default]
    Mysql,
    MariaDb,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Mysql => f.write_str("mysql"),
            Vendor::MariaDb => f.write_str("mariadb"),
        }
    }
}

/// A vendor plus a major.minor version, parsed from `@@version` strings such
/// as `8.0.32`, `5.5.62-log` or `10.6.12-MariaDB-1:10.6.12+maria~ubu2004`.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Flavor {
    pub vendor: Vendor,
    pub major: u16,
    pub minor: u16,
}

/// MySQL 5.5, the oldest supported server. Does not accept an `ALGORITHM`
/// clause on ALTER TABLE.
pub const MYSQL_55: Flavor = Flavor {
    vendor: Vendor::Mysql,
    major: 5,
    minor: 5,
};

/// MySQL 8.0.
pub const MYSQL_80: Flavor = Flavor {
    vendor: Vendor::Mysql,
    major: 8,
    minor: 0,
};

impl Flavor {
    pub fn new(vendor: Vendor, major: u16, minor: u16) -> Self {
        Flavor { vendor, major, minor }
    }

    /// Parse a server version string. Unparseable versions fall back to the
    /// vendor default with a zero version.
    pub fn from_version_string(version: &str) -> Self {
        let vendor = if version.contains("MariaDB") {
            Vendor::MariaDb
        } else {
            Vendor::Mysql
        };

        let (major, minor) = VERSION_RE
            .captures(version)
            .map(|caps| {
                let major = caps[1].parse().unwrap_or(0);
                let minor = caps[2].parse().unwrap_or(0);
                (major, minor)
            })
            .unwrap_or((0, 0));

        Flavor { vendor, major, minor }
    }

    /// Same vendor and same major.minor series.
    pub fn matches(&self, other: Flavor) -> bool {
        self.vendor == other.vendor && self.major == other.major && self.minor == other.minor
    }

    pub fn is_mariadb(&self) -> bool {
        self.vendor == Vendor::MariaDb
    }

    pub fn is_mysql(&self) -> bool {
        self.vendor == Vendor::Mysql
    }

    /// Whether the server accepts `ALTER TABLE ... ALGORITHM=...`.
    pub fn supports_algorithm_clause(&self) -> bool {
        !self.matches(MYSQL_55)
    }

    /// Whether check constraints are enforced by the server. MariaDB 10.2+
    /// and MySQL 8.0.16+; the point release is not tracked, so MySQL 8.0 is
    /// taken as a whole.
    pub fn supports_check_constraints(&self) -> bool {
        match self.vendor {
            Vendor::MariaDb => (self.major, self.minor) >= (10, 2),
            Vendor::Mysql => (self.major, self.minor) >= (8, 0),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.vendor, self.major, self.minor)
    }
}
