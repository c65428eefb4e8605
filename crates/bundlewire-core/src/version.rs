//! OSGi version parsing, comparison, and range matching.
//!
//! OSGi versions have the shape `major[.minor[.micro[.qualifier]]]`:
//! - Missing numeric components default to `0`
//! - Numeric components compare as numbers
//! - The qualifier compares lexically, and an empty qualifier sorts first

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bundlewire_util::errors::WiringError;
use serde::{Serialize, Serializer};

/// A parsed OSGi version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn parse(version: &str) -> Result<Self, WiringError> {
        let trimmed = version.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let mut parts = trimmed.splitn(4, '.');
        let major = parse_component(version, parts.next(), "major")?;
        let minor = parse_component(version, parts.next(), "minor")?;
        let micro = parse_component(version, parts.next(), "micro")?;
        let qualifier = parts.next().unwrap_or_default().to_string();

        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(WiringError::Version {
                version: version.to_string(),
                message: format!("invalid qualifier `{qualifier}`"),
            });
        }

        Ok(Self {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

fn parse_component(version: &str, part: Option<&str>, name: &str) -> Result<u64, WiringError> {
    match part {
        None => Ok(0),
        Some(p) => p.parse::<u64>().map_err(|_| WiringError::Version {
            version: version.to_string(),
            message: format!("{name} component is not a number"),
        }),
    }
}

impl FromStr for Version {
    type Err = WiringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An OSGi version range expression.
///
/// Supports: `[1.0,2.0)`, `(1.0,2.0]`, `[1.5]` (exact), and a bare `1.0`
/// which means "at least 1.0".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Bound,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl VersionRange {
    /// A range with only an inclusive lower bound.
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Bound {
                version,
                inclusive: true,
            },
            upper: None,
        }
    }

    /// Parse an OSGi version range string.
    pub fn parse(spec: &str) -> Result<Self, WiringError> {
        let s = spec.trim();
        if !s.starts_with('[') && !s.starts_with('(') {
            return Ok(Self::at_least(Version::parse(s)?));
        }

        let open_inclusive = s.starts_with('[');
        let close_inclusive = s.ends_with(']');
        if s.len() < 2 || !(s.ends_with(']') || s.ends_with(')')) {
            return Err(WiringError::Version {
                version: spec.to_string(),
                message: "unterminated range".to_string(),
            });
        }
        let inner = &s[1..s.len() - 1];

        if let Some((lower, upper)) = inner.split_once(',') {
            Ok(VersionRange {
                lower: Bound {
                    version: Version::parse(lower)?,
                    inclusive: open_inclusive,
                },
                upper: Some(Bound {
                    version: Version::parse(upper)?,
                    inclusive: close_inclusive,
                }),
            })
        } else {
            // [1.0] means exactly 1.0
            let v = Version::parse(inner)?;
            Ok(VersionRange {
                lower: Bound {
                    version: v.clone(),
                    inclusive: true,
                },
                upper: Some(Bound {
                    version: v,
                    inclusive: true,
                }),
            })
        }
    }

    /// Check if a version satisfies this range.
    pub fn contains(&self, version: &Version) -> bool {
        let cmp = version.cmp(&self.lower.version);
        if self.lower.inclusive {
            if cmp == Ordering::Less {
                return false;
            }
        } else if cmp != Ordering::Greater {
            return false;
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if upper.inclusive {
                if cmp == Ordering::Greater {
                    return false;
                }
            } else if cmp != Ordering::Less {
                return false;
            }
        }
        true
    }

    /// Render this range as an LDAP filter over `attribute`.
    pub fn to_filter(&self, attribute: &str) -> String {
        let lower = if self.lower.inclusive {
            format!("({attribute}>={})", self.lower.version)
        } else {
            format!("(!({attribute}<={}))", self.lower.version)
        };
        match &self.upper {
            None => lower,
            Some(upper) => {
                let upper = if upper.inclusive {
                    format!("({attribute}<={})", upper.version)
                } else {
                    format!("(!({attribute}>={}))", upper.version)
                };
                format!("(&{lower}{upper})")
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.upper {
            None => write!(f, "{}", self.lower.version),
            Some(upper) => write!(
                f,
                "{}{},{}{}",
                if self.lower.inclusive { '[' } else { '(' },
                self.lower.version,
                upper.version,
                if upper.inclusive { ']' } else { ')' }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn basic_ordering() {
        assert!(v("1.0") < v("2.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1.0"));
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(v("1"), v("1.0.0"));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v(""), Version::default());
    }

    #[test]
    fn qualifier_sorts_after_bare_version() {
        assert!(v("1.0.0") < v("1.0.0.beta"));
        assert!(v("1.0.0.alpha") < v("1.0.0.beta"));
        assert!(v("1.0.0.zzz") < v("1.0.1"));
    }

    #[test]
    fn rejects_non_numeric_components() {
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("1.0.0.bad qualifier").is_err());
    }

    #[test]
    fn display() {
        assert_eq!(v("1.8").to_string(), "1.8.0");
        assert_eq!(v("1.8.0.RC1").to_string(), "1.8.0.RC1");
    }

    #[test]
    fn version_range_inclusive() {
        let range = VersionRange::parse("[1.0,2.0]").unwrap();
        assert!(range.contains(&v("1.0")));
        assert!(range.contains(&v("1.5")));
        assert!(range.contains(&v("2.0")));
        assert!(!range.contains(&v("0.9")));
        assert!(!range.contains(&v("2.1")));
    }

    #[test]
    fn version_range_exclusive_bounds() {
        let range = VersionRange::parse("(1.0,2.0)").unwrap();
        assert!(!range.contains(&v("1.0")));
        assert!(range.contains(&v("1.9.9")));
        assert!(!range.contains(&v("2.0")));
    }

    #[test]
    fn bare_version_is_lower_bound() {
        let range = VersionRange::parse("1.2").unwrap();
        assert!(range.contains(&v("1.2")));
        assert!(range.contains(&v("7.0")));
        assert!(!range.contains(&v("1.1.9")));
        assert_eq!(range.to_string(), "1.2.0");
    }

    #[test]
    fn version_range_exact() {
        let range = VersionRange::parse("[1.5]").unwrap();
        assert!(range.contains(&v("1.5")));
        assert!(!range.contains(&v("1.4")));
        assert!(!range.contains(&v("1.6")));
    }

    #[test]
    fn unterminated_range_is_an_error() {
        assert!(VersionRange::parse("[1.0,2.0").is_err());
    }

    #[test]
    fn range_to_filter() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        assert_eq!(
            range.to_filter("version"),
            "(&(version>=1.0.0)(!(version>=2.0.0)))"
        );
        let open = VersionRange::parse("(1.0,2.0]").unwrap();
        assert_eq!(
            open.to_filter("version"),
            "(&(!(version<=1.0.0))(version<=2.0.0))"
        );
        assert_eq!(
            VersionRange::parse("3").unwrap().to_filter("bundle-version"),
            "(bundle-version>=3.0.0)"
        );
    }
}
