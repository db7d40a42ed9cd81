//! HLS manifest parsing: `master` handles the variant/profile manifest,
//! `media` handles one track's segment index (§4.3).

pub mod master;
pub mod media;

pub use master::{parse_master_playlist, MasterPlaylist};
pub use media::index_media_playlist;

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Splits an HLS attribute-list (the comma-separated `KEY=VALUE` tail of a
/// tag line) into a case-normalized map, stripping quotes from quoted
/// values. Shared by `master` and `media` since both tag families use the
/// same attribute-list grammar.
pub(crate) fn attribute_list(raw: &str) -> HashMap<String, String> {
    static ATTR_RE: OnceLock<Regex> = OnceLock::new();
    let re = ATTR_RE.get_or_init(|| Regex::new(r#"([A-Za-z0-9-]+)=("[^"]*"|[^,]*)"#).unwrap());
    let mut map = HashMap::new();
    for cap in re.captures_iter(raw) {
        let key = cap[1].to_ascii_uppercase();
        let mut value = cap[2].to_string();
        if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            value = value[1..value.len() - 1].to_string();
        }
        map.insert(key, value);
    }
    map
}

pub(crate) fn parse_iv_hex(raw: &str) -> Option<[u8; 16]> {
    let hexstr = raw.trim_start_matches("0x").trim_start_matches("0X");
    let bytes = hex::decode(hexstr).ok()?;
    if bytes.len() != 16 {
        return None;
    }
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&bytes);
    Some(iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_list_strips_quotes_and_uppercases_keys() {
        let attrs = attribute_list(r#"method=AES-128,uri="https://example/key",IV=0x0102"#);
        assert_eq!(attrs.get("METHOD").map(String::as_str), Some("AES-128"));
        assert_eq!(attrs.get("URI").map(String::as_str), Some("https://example/key"));
        assert_eq!(attrs.get("IV").map(String::as_str), Some("0x0102"));
    }

    #[test]
    fn parse_iv_hex_rejects_wrong_length() {
        assert!(parse_iv_hex("0x0102").is_none());
        let full = format!("0x{}", "ab".repeat(16));
        assert!(parse_iv_hex(&full).is_some());
    }
}
