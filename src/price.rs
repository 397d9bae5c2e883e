const CURRENCY_TOKENS: [&str; 3] = ["UAH", "uah", "грн"];

/// Strips the literal currency tokens and surrounding whitespace.
/// Matching is exact per token, not case-insensitive.
pub fn clean_price(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    let mut cleaned = raw.to_string();
    for token in CURRENCY_TOKENS {
        cleaned = cleaned.replace(token, "");
    }
    Some(cleaned.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_listed_currency_tokens() {
        assert_eq!(clean_price(Some("450 UAH")).as_deref(), Some("450"));
        assert_eq!(clean_price(Some(" 450.00 uah ")).as_deref(), Some("450.00"));
        assert_eq!(clean_price(Some("1200 грн")).as_deref(), Some("1200"));
    }

    #[test]
    fn other_case_variants_are_kept() {
        assert_eq!(clean_price(Some("99 Uah")).as_deref(), Some("99 Uah"));
    }

    #[test]
    fn missing_price_yields_none() {
        assert_eq!(clean_price(None), None);
        assert_eq!(clean_price(Some("")), None);
    }

    #[test]
    fn cleaning_is_idempotent() {
        for raw in ["450 UAH", "  77  ", "1 299,00 грн", "abc", "UAH"] {
            let once = clean_price(Some(raw));
            let twice = clean_price(once.as_deref());
            match (once.as_deref(), twice.as_deref()) {
                (Some(""), None) => {}
                (a, b) => assert_eq!(a, b, "input {:?}", raw),
            }
        }
    }
}
