//! Input string grammars consumed by the command-line front end.

use once_cell::sync::Lazy;
use regex::Regex;

use super::archive::ArchiveSpec;
use super::point::PointInput;

static ARCHIVE_SPEC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([ywdhm]):(\d+)$").unwrap());

/// Parse an archive spec of the form `<digits><suffix>:<digits>`, e.g.
/// `1h:30` for thirty one-hour points. Suffixes: `y`, `w`, `d`, `h`, `m`.
pub fn parse_archive_spec(input: &str) -> Option<ArchiveSpec> {
    let caps = ARCHIVE_SPEC.captures(input)?;
    let amount: u32 = caps[1].parse().ok()?;
    let unit: u32 = match &caps[2] {
        "y" => 31_536_000,
        "w" => 604_800,
        "d" => 86_400,
        "h" => 3_600,
        "m" => 60,
        _ => return None,
    };
    let points: u32 = caps[3].parse().ok()?;
    Some(ArchiveSpec {
        seconds_per_point: amount.checked_mul(unit)?,
        points,
    })
}

/// Parse a point spec of the form `<digits>:<float>`, e.g. `1316163338:4.2`.
pub fn parse_point_spec(input: &str) -> Option<PointInput> {
    let (timestamp, value) = input.split_once(':')?;
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(PointInput {
        timestamp: timestamp.parse().ok()?,
        value: value.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archive_specs() {
        assert_eq!(
            parse_archive_spec("1m:60"),
            Some(ArchiveSpec {
                seconds_per_point: 60,
                points: 60,
            })
        );
        assert_eq!(
            parse_archive_spec("2h:336"),
            Some(ArchiveSpec {
                seconds_per_point: 7_200,
                points: 336,
            })
        );
        assert_eq!(
            parse_archive_spec("1d:365"),
            Some(ArchiveSpec {
                seconds_per_point: 86_400,
                points: 365,
            })
        );
        assert_eq!(
            parse_archive_spec("1w:52"),
            Some(ArchiveSpec {
                seconds_per_point: 604_800,
                points: 52,
            })
        );
        assert_eq!(
            parse_archive_spec("1y:10"),
            Some(ArchiveSpec {
                seconds_per_point: 31_536_000,
                points: 10,
            })
        );
    }

    #[test]
    fn archive_spec_requires_a_suffix() {
        assert_eq!(parse_archive_spec("60:10"), None);
        assert_eq!(parse_archive_spec("60s:10"), None);
        assert_eq!(parse_archive_spec("m:10"), None);
        assert_eq!(parse_archive_spec("1m"), None);
        assert_eq!(parse_archive_spec("1m:"), None);
        assert_eq!(parse_archive_spec(""), None);
    }

    #[test]
    fn archive_spec_rejects_overflow() {
        assert_eq!(parse_archive_spec("9999999y:1"), None);
        assert_eq!(parse_archive_spec("99999999999999999999m:1"), None);
    }

    #[test]
    fn parses_point_specs() {
        assert_eq!(
            parse_point_spec("1316163338:4.2"),
            Some(PointInput {
                timestamp: 1316163338,
                value: 4.2,
            })
        );
        assert_eq!(
            parse_point_spec("10:-1"),
            Some(PointInput {
                timestamp: 10,
                value: -1.0,
            })
        );
        assert_eq!(
            parse_point_spec("0:3"),
            Some(PointInput {
                timestamp: 0,
                value: 3.0,
            })
        );
    }

    #[test]
    fn rejects_malformed_point_specs() {
        assert_eq!(parse_point_spec("10"), None);
        assert_eq!(parse_point_spec("ten:1.0"), None);
        assert_eq!(parse_point_spec("-10:1.0"), None);
        assert_eq!(parse_point_spec("10:one"), None);
        assert_eq!(parse_point_spec(":1.0"), None);
    }
}
