use crate::types::{CharClass, MIN_PASSPHRASE_LENGTH, NAME_REJECTED, PASSPHRASE_REJECTED, PASSPHRASE_REQUIRED};

/// Classifies every byte of `s` into the character-class bitmask spec
/// §4.7 describes ("classification is the bitwise OR over {Uppercase,
/// Lowercase, Numbers, Special, Control, NonAscii}").
pub fn classify(s: &str) -> CharClass {
    let mut bits = CharClass::empty();
    for &b in s.as_bytes() {
        bits |= classify_byte(b);
    }
    bits
}

fn classify_byte(b: u8) -> CharClass {
    if b >= 0x80 {
        CharClass::NON_ASCII
    } else if b.is_ascii_control() {
        CharClass::CONTROL
    } else if b.is_ascii_uppercase() {
        CharClass::UPPERCASE
    } else if b.is_ascii_lowercase() {
        CharClass::LOWERCASE
    } else if b.is_ascii_digit() {
        CharClass::NUMBERS
    } else if b.is_ascii_graphic() || b == b' ' {
        CharClass::SPECIAL
    } else {
        CharClass::CONTROL
    }
}

/// `(classification & REQUIRED) == REQUIRED && (classification &
/// REJECTED) == 0 && len >= MIN_PASSPHRASE_LENGTH` (spec §4.7).
pub fn passphrase_satisfies_policy(passphrase: &str) -> bool {
    let classification = classify(passphrase);
    (classification & PASSPHRASE_REQUIRED) == PASSPHRASE_REQUIRED
        && (classification & PASSPHRASE_REJECTED).is_empty()
        && passphrase.len() >= MIN_PASSPHRASE_LENGTH
}

/// "User names must not contain Special/Control/NonAscii" (spec §4.7).
pub fn name_is_valid(name: &str) -> bool {
    !name.is_empty() && (classify(name) & NAME_REJECTED).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_passphrase_missing_a_required_class() {
        assert!(!passphrase_satisfies_policy("alllowercase123"));
        assert!(!passphrase_satisfies_policy("ALLUPPERCASE123"));
        assert!(!passphrase_satisfies_policy("NoDigitsHereAtAll"));
    }

    #[test]
    fn rejects_passphrase_with_control_characters() {
        assert!(!passphrase_satisfies_policy("Abcdefg123\u{0007}"));
    }

    #[test]
    fn rejects_passphrase_shorter_than_minimum() {
        assert!(!passphrase_satisfies_policy("Abc123"));
    }

    #[test]
    fn accepts_a_compliant_passphrase() {
        assert!(passphrase_satisfies_policy("Abcdefg123!"));
    }

    #[test]
    fn rejects_names_with_special_characters() {
        assert!(!name_is_valid("bad name!"));
        assert!(name_is_valid("gooduser"));
    }
}
