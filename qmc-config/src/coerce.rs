use qmc_kernel::error::{QmcError, QmcResult};

/// `config_get_int_from_value` (spec §4.6): parses a stored cell's bytes
/// (stored as a big-endian i64) back into an integer.
pub fn get_int_from_value(bytes: &[u8]) -> QmcResult<i64> {
    if bytes.len() > 8 {
        return Err(QmcError::NoBufs);
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buf))
}

/// `config_set_int_as_value`: the write-side counterpart, always
/// producing the canonical 8-byte big-endian encoding.
pub fn set_int_as_value(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// `config_get_bool_from_value`/`config_set_bool_as_value`: accepts
/// `true/false`, `yes/no`, `on/off`, `1/0`, case-insensitively, the way
/// spec §4.6 specifies.
pub fn parse_bool(s: &str) -> QmcResult<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(QmcError::ArgInvalid),
    }
}

pub fn bool_as_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        let encoded = set_int_as_value(-42);
        assert_eq!(get_int_from_value(&encoded).unwrap(), -42);
    }

    #[test]
    fn bool_accepts_every_documented_spelling() {
        for s in ["true", "TRUE", "yes", "On", "1"] {
            assert_eq!(parse_bool(s).unwrap(), true);
        }
        for s in ["false", "False", "no", "Off", "0"] {
            assert_eq!(parse_bool(s).unwrap(), false);
        }
    }

    #[test]
    fn bool_rejects_garbage() {
        assert_eq!(parse_bool("maybe").unwrap_err(), QmcError::ArgInvalid);
    }
}
