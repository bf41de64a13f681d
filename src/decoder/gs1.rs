//! GS1 application identifier parsing and check digits.

#[derive(Clone, Copy)]
enum FieldLen {
    Fixed(usize),
    Variable(usize),
}

use FieldLen::{Fixed, Variable};

const TWO_DIGIT_AIS: &[(&str, FieldLen)] = &[
    ("00", Fixed(18)),
    ("01", Fixed(14)),
    ("02", Fixed(14)),
    ("10", Variable(20)),
    ("11", Fixed(6)),
    ("12", Fixed(6)),
    ("13", Fixed(6)),
    ("15", Fixed(6)),
    ("17", Fixed(6)),
    ("20", Fixed(2)),
    ("21", Variable(20)),
    ("22", Variable(29)),
    ("30", Variable(8)),
    ("37", Variable(8)),
    ("90", Variable(30)),
    ("91", Variable(30)),
    ("92", Variable(30)),
    ("93", Variable(30)),
    ("94", Variable(30)),
    ("95", Variable(30)),
    ("96", Variable(30)),
    ("97", Variable(30)),
    ("98", Variable(30)),
    ("99", Variable(30)),
];

const THREE_DIGIT_AIS: &[(&str, FieldLen)] = &[
    ("240", Variable(30)),
    ("241", Variable(30)),
    ("242", Variable(6)),
    ("250", Variable(30)),
    ("251", Variable(30)),
    ("253", Variable(17)),
    ("254", Variable(20)),
    ("400", Variable(30)),
    ("401", Variable(30)),
    ("402", Fixed(17)),
    ("403", Variable(30)),
    ("410", Fixed(13)),
    ("411", Fixed(13)),
    ("412", Fixed(13)),
    ("413", Fixed(13)),
    ("414", Fixed(13)),
    ("420", Variable(20)),
    ("421", Variable(15)),
    ("422", Fixed(3)),
    ("423", Variable(15)),
    ("424", Fixed(3)),
    ("425", Fixed(3)),
    ("426", Fixed(3)),
];

// AIs whose fourth digit is a decimal-point position
const THREE_DIGIT_PLUS_DIGIT_AIS: &[(&str, FieldLen)] = &[
    ("310", Fixed(6)),
    ("311", Fixed(6)),
    ("312", Fixed(6)),
    ("313", Fixed(6)),
    ("314", Fixed(6)),
    ("315", Fixed(6)),
    ("316", Fixed(6)),
    ("320", Fixed(6)),
    ("321", Fixed(6)),
    ("322", Fixed(6)),
    ("323", Fixed(6)),
    ("324", Fixed(6)),
    ("325", Fixed(6)),
    ("326", Fixed(6)),
    ("327", Fixed(6)),
    ("328", Fixed(6)),
    ("329", Fixed(6)),
    ("330", Fixed(6)),
    ("331", Fixed(6)),
    ("332", Fixed(6)),
    ("333", Fixed(6)),
    ("334", Fixed(6)),
    ("335", Fixed(6)),
    ("336", Fixed(6)),
    ("340", Fixed(6)),
    ("341", Fixed(6)),
    ("342", Fixed(6)),
    ("343", Fixed(6)),
    ("344", Fixed(6)),
    ("345", Fixed(6)),
    ("346", Fixed(6)),
    ("347", Fixed(6)),
    ("348", Fixed(6)),
    ("349", Fixed(6)),
    ("350", Fixed(6)),
    ("351", Fixed(6)),
    ("352", Fixed(6)),
    ("353", Fixed(6)),
    ("354", Fixed(6)),
    ("355", Fixed(6)),
    ("356", Fixed(6)),
    ("357", Fixed(6)),
    ("360", Fixed(6)),
    ("361", Fixed(6)),
    ("362", Fixed(6)),
    ("363", Fixed(6)),
    ("364", Fixed(6)),
    ("365", Fixed(6)),
    ("366", Fixed(6)),
    ("367", Fixed(6)),
    ("368", Fixed(6)),
    ("369", Fixed(6)),
    ("390", Variable(15)),
    ("391", Variable(18)),
    ("392", Variable(15)),
    ("393", Variable(18)),
    ("703", Variable(30)),
];

const FOUR_DIGIT_AIS: &[(&str, FieldLen)] = &[
    ("7001", Fixed(13)),
    ("7002", Variable(30)),
    ("7003", Fixed(10)),
    ("8001", Fixed(14)),
    ("8002", Variable(20)),
    ("8003", Variable(30)),
    ("8004", Variable(30)),
    ("8005", Fixed(6)),
    ("8006", Fixed(18)),
    ("8007", Variable(30)),
    ("8008", Variable(12)),
    ("8018", Fixed(18)),
    ("8020", Variable(25)),
    ("8100", Fixed(6)),
    ("8101", Fixed(10)),
    ("8102", Fixed(2)),
    ("8110", Variable(70)),
    ("8200", Variable(70)),
];

fn lookup(table: &[(&str, FieldLen)], key: &str) -> Option<FieldLen> {
    table.iter().find(|(ai, _)| *ai == key).map(|&(_, len)| len)
}

/// Identify the AI at the start of `raw`: (AI length, field length)
fn identify(raw: &str) -> Option<(usize, FieldLen)> {
    let prefix = |n: usize| raw.get(..n);
    if let Some(len) = prefix(2).and_then(|p| lookup(TWO_DIGIT_AIS, p)) {
        return Some((2, len));
    }
    if let Some(len) = prefix(3).and_then(|p| lookup(THREE_DIGIT_AIS, p)) {
        return Some((3, len));
    }
    if let Some(len) = prefix(3).and_then(|p| lookup(THREE_DIGIT_PLUS_DIGIT_AIS, p)) {
        return Some((4, len));
    }
    prefix(4)
        .and_then(|p| lookup(FOUR_DIGIT_AIS, p))
        .map(|len| (4, len))
}

/// Render one FNC1-delimited chunk of element strings as `(AI)value` pairs.
///
/// Variable-length fields take the rest of the chunk up to their maximum.
/// `None` for an unknown AI or a fixed field cut short.
pub fn parse_fields(raw: &str) -> Option<String> {
    let mut out = String::new();
    let mut rest = raw;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return None;
        }
        let (ai_len, field) = identify(rest)?;
        let ai = rest.get(..ai_len)?;
        let value_end = match field {
            Fixed(n) => {
                if rest.len() < ai_len + n {
                    return None;
                }
                ai_len + n
            }
            Variable(max) => rest.len().min(ai_len + max),
        };
        out.push('(');
        out.push_str(ai);
        out.push(')');
        out.push_str(rest.get(ai_len..value_end)?);
        rest = rest.get(value_end..)?;
    }
    Some(out)
}

/// Modulo-10 check digit over ASCII digits (weights 3,1 from the right)
pub fn gtin_check_digit(digits: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in digits.bytes().rev().enumerate() {
        if !c.is_ascii_digit() {
            return None;
        }
        let d = (c - b'0') as u32;
        sum += if i % 2 == 0 { 3 * d } else { d };
    }
    Some(((10 - sum % 10) % 10) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_and_variable_fields() {
        assert_eq!(
            parse_fields("0109501101020917171231").as_deref(),
            Some("(01)09501101020917(17)171231")
        );
        assert_eq!(
            parse_fields("0109501101020917").as_deref(),
            Some("(01)09501101020917")
        );
        assert_eq!(parse_fields("10ABC123").as_deref(), Some("(10)ABC123"));
        assert_eq!(
            parse_fields("3103001750").as_deref(),
            Some("(3103)001750")
        );
        assert_eq!(parse_fields("8005123456").as_deref(), Some("(8005)123456"));
    }

    #[test]
    fn test_rejects_unknown_or_short() {
        assert!(parse_fields("0512").is_none());
        assert!(parse_fields("01123").is_none());
    }

    #[test]
    fn test_gtin_check_digit() {
        assert_eq!(gtin_check_digit("0950110102091"), Some(7));
        assert_eq!(gtin_check_digit("400638133393"), Some(1));
        assert_eq!(gtin_check_digit("12a"), None);
    }
}
