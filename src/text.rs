//! Header and cell text canonicalization.

/// Code points treated as ordinary spaces before trimming.
const NON_BREAKING_SPACES: [char; 3] = ['\u{00A0}', '\u{2007}', '\u{202F}'];

/// Trims, collapses internal whitespace runs to one space, and maps
/// non-breaking spaces to plain spaces.
pub fn normalize(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for word in value
        .split(|c: char| c.is_whitespace() || NON_BREAKING_SPACES.contains(&c))
        .filter(|word| !word.is_empty())
    {
        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(word);
    }
    output
}

/// Normalized and lowercased, the form used for alias lookups.
pub fn lookup_key(value: &str) -> String {
    normalize(value).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize("  Reg   Number \t"), "Reg Number");
        assert_eq!(normalize("Dept\u{00A0}\u{00A0}Name"), "Dept Name");
        assert_eq!(normalize("\u{202F}"), "");
        assert_eq!(normalize("a\r\nb"), "a b");
    }

    #[test]
    fn lookup_key_lowercases() {
        assert_eq!(lookup_key(" Maximum\u{00A0}Salary "), "maximum salary");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(value in "\\PC{0,40}") {
            let once = normalize(&value);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
