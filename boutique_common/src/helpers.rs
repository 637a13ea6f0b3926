/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse an integer environment value, falling back to the default when missing or malformed.
pub fn parse_int_var(value: Option<String>, default: i64) -> i64 {
    value.and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(None, true));
        assert!(parse_boolean_flag(Some("garbage".into()), true));
    }

    #[test]
    fn int_vars() {
        assert_eq!(parse_int_var(Some("72".into()), 24), 72);
        assert_eq!(parse_int_var(Some("nope".into()), 24), 24);
        assert_eq!(parse_int_var(None, 24), 24);
    }
}
