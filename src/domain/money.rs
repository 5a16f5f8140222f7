use std::fmt;

/// Money is represented as an unsigned count of indivisible base units.
/// Wallets and members can never hold a negative amount.
pub type Amount = u64;

/// Format an amount with thousands separators.
/// Example: 1234567 -> "1,234,567"
pub fn format_amount(amount: Amount) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Parse an integer amount, allowing `_` or `,` as digit group separators.
/// Example: "1000" -> 1000, "1_000" -> 1000, "2,500" -> 2500
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(ParseAmountError::Negative);
    }

    let digits: String = input.chars().filter(|c| *c != '_' && *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseAmountError::InvalidFormat);
    }

    digits.parse().map_err(|_| ParseAmountError::Overflow)
}

/// Split `value` equally across `parts` shares using integer division.
/// Returns `(share, remainder)`; the remainder is never distributed.
/// Returns `None` when there is nobody to split across.
pub fn split_evenly(value: Amount, parts: usize) -> Option<(Amount, Amount)> {
    if parts == 0 {
        return None;
    }
    let parts = parts as Amount;
    Some((value / parts, value % parts))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    Negative,
    Overflow,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::Negative => write!(f, "amount cannot be negative"),
            ParseAmountError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1000), "1,000");
        assert_eq!(format_amount(1234567), "1,234,567");
        assert_eq!(format_amount(100000), "100,000");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000"), Ok(1000));
        assert_eq!(parse_amount("1_000"), Ok(1000));
        assert_eq!(parse_amount("2,500"), Ok(2500));
        assert_eq!(parse_amount(" 42 "), Ok(42));
        assert_eq!(parse_amount("0"), Ok(0));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert_eq!(parse_amount("abc"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_amount("12.5"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_amount(""), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_amount("-5"), Err(ParseAmountError::Negative));
        assert_eq!(
            parse_amount("99999999999999999999999"),
            Err(ParseAmountError::Overflow)
        );
    }

    #[test]
    fn test_split_evenly() {
        assert_eq!(split_evenly(600, 3), Some((200, 0)));
        assert_eq!(split_evenly(100, 3), Some((33, 1)));
        assert_eq!(split_evenly(2, 3), Some((0, 2)));
        assert_eq!(split_evenly(100, 0), None);
    }
}
