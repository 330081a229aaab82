//! Parsing of abbreviated counter text as rendered in profile headers
//! ("1.2m followers", "340k", "4,523").

use crate::error::AutomationError;

/// Parse a rendered counter into a number.
///
/// Only the first whitespace-separated token is considered ("1,234
/// followers" parses as 1234). `k`/`m` suffixes carry a decimal mantissa;
/// in unsuffixed text, `.` and `,` are grouping separators.
pub fn parse_count(raw: &str) -> Result<u64, AutomationError> {
    let token = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| bad_count(raw))?;
    let text = token.replace(',', "");

    let (mantissa, factor) = match text.strip_suffix(['k', 'K']) {
        Some(rest) => (rest, 1_000_f64),
        None => match text.strip_suffix(['m', 'M']) {
            Some(rest) => (rest, 1_000_000_f64),
            None => {
                let digits = text.replace('.', "");
                return digits.parse::<u64>().map_err(|_| bad_count(raw));
            }
        },
    };

    let value: f64 = mantissa.parse().map_err(|_| bad_count(raw))?;
    if value < 0.0 {
        return Err(bad_count(raw));
    }
    Ok((value * factor) as u64)
}

fn bad_count(raw: &str) -> AutomationError {
    AutomationError::BadCount {
        text: raw.to_owned(),
    }
}
