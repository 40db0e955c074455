//! Server version parsing and comparison
//!
//! Version strings arrive as dot-separated fields: `major.minor.rev` with an
//! optional fourth field that is either a plain build number or a compound
//! `<build>ES<es>` engineering-special token (`"10.5.2.0ES3"`). The first
//! three fields are mandatory; a garbled or absent fourth field tolerantly
//! defaults build and ES to 0 so newer servers with unexpected suffixes
//! still log in.

use std::fmt;

/// Parsed server version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub rev: u32,
    pub build: u32,
    /// Engineering-special number, 0 when absent
    pub es: u32,
}

impl ServerVersion {
    /// The unauthenticated sentinel (all zeros)
    pub const ZERO: ServerVersion = ServerVersion {
        major: 0,
        minor: 0,
        rev: 0,
        build: 0,
        es: 0,
    };

    /// Parse a version string. The first three dotted fields must be
    /// integers; anything after them is best-effort.
    pub fn parse(text: &str) -> Option<Self> {
        let mut fields = text.trim().split('.');

        let major = fields.next()?.trim().parse().ok()?;
        let minor = fields.next()?.trim().parse().ok()?;
        let rev = fields.next()?.trim().parse().ok()?;

        let (build, es) = match fields.next() {
            None => (0, 0),
            Some(last) => parse_build_field(last.trim()),
        };

        Some(Self {
            major,
            minor,
            rev,
            build,
            es,
        })
    }

    /// Lexicographic comparison over (major, minor, rev, build, es).
    ///
    /// The ES position compares with `>=` so a server reporting no ES still
    /// satisfies a minimum of ES 0 at the same build.
    pub fn is_at_least(&self, major: u32, minor: u32, rev: u32, build: u32, es: u32) -> bool {
        if self.major != major {
            return self.major > major;
        }
        if self.minor != minor {
            return self.minor > minor;
        }
        if self.rev != rev {
            return self.rev > rev;
        }
        if self.build != build {
            return self.build > build;
        }
        self.es >= es
    }

    /// True for the unauthenticated sentinel
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Fourth-field grammar: `<build>`, or `<build>ES<es>`. Garbled trailing
/// data is tolerated for forward compatibility, not fatal.
fn parse_build_field(field: &str) -> (u32, u32) {
    if field.is_empty() {
        return (0, 0);
    }
    let upper = field.to_ascii_uppercase();
    if let Some(pos) = upper.find("ES") {
        let build = field[..pos].parse().unwrap_or(0);
        let es = field[pos + 2..].parse().unwrap_or(0);
        (build, es)
    } else {
        (field.parse().unwrap_or(0), 0)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.rev, self.build)?;
        if self.es > 0 {
            write!(f, "ES{}", self.es)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_segment_version_parses_with_zero_build() {
        let v = ServerVersion::parse("9.1.2").unwrap();
        assert_eq!((v.major, v.minor, v.rev, v.build, v.es), (9, 1, 2, 0, 0));
    }

    #[test]
    fn four_segment_version_parses_plain_build() {
        let v = ServerVersion::parse("10.5.2.12").unwrap();
        assert_eq!((v.major, v.minor, v.rev, v.build, v.es), (10, 5, 2, 12, 0));
    }

    #[test]
    fn es_suffix_parses() {
        let v = ServerVersion::parse("10.5.2.0ES3").unwrap();
        assert_eq!((v.major, v.minor, v.rev, v.build, v.es), (10, 5, 2, 0, 3));
    }

    #[test]
    fn garbled_fourth_field_is_tolerated() {
        let v = ServerVersion::parse("11.0.1.beta").unwrap();
        assert_eq!((v.major, v.minor, v.rev, v.build, v.es), (11, 0, 1, 0, 0));
        let v = ServerVersion::parse("11.0.1.4ESx").unwrap();
        assert_eq!((v.build, v.es), (4, 0));
    }

    #[test]
    fn missing_required_fields_fail() {
        assert!(ServerVersion::parse("10.5").is_none());
        assert!(ServerVersion::parse("10").is_none());
        assert!(ServerVersion::parse("").is_none());
        assert!(ServerVersion::parse("a.b.c").is_none());
    }

    #[test]
    fn display_round_trips() {
        for text in ["10.5.2.0ES3", "9.1.2.0", "12.0.0.4"] {
            let v = ServerVersion::parse(text).unwrap();
            assert_eq!(ServerVersion::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn is_at_least_orders_lexicographically() {
        let v = ServerVersion::parse("10.5.2.0ES3").unwrap();
        assert!(v.is_at_least(10, 5, 2, 0, 3));
        assert!(!v.is_at_least(10, 5, 2, 0, 4));
        assert!(v.is_at_least(10, 5, 2, 0, 0));
        assert!(v.is_at_least(9, 9, 9, 9, 9));
        assert!(!v.is_at_least(10, 5, 3, 0, 0));
        assert!(!v.is_at_least(11, 0, 0, 0, 0));
    }

    #[test]
    fn no_es_satisfies_minimum_es_zero() {
        let v = ServerVersion::parse("9.0.1.0").unwrap();
        assert!(v.is_at_least(9, 0, 1, 0, 0));
        assert!(!v.is_at_least(9, 0, 1, 0, 1));
    }

    #[test]
    fn zero_sentinel() {
        assert!(ServerVersion::ZERO.is_zero());
        assert!(!ServerVersion::parse("10.0.1.0").unwrap().is_zero());
    }
}
