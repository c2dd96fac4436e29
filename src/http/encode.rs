//! URL component encoding.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const COMPONENT_KEEP_SPACE: &AsciiSet = &COMPONENT.remove(b' ');

/// Percent-encode a single path component; `/` is encoded too.
pub fn quote(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Like [`quote`] but spaces become `+`.
pub fn quote_plus(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT_KEEP_SPACE)
        .to_string()
        .replace(' ', "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_encodes_slashes() {
        assert_eq!(quote("example.com"), "example.com");
        assert_eq!(quote("a/b c"), "a%2Fb%20c");
        assert_eq!(quote("*.example.com"), "%2A.example.com");
    }

    #[test]
    fn test_quote_plus() {
        assert_eq!(quote_plus("http://x.test/a b?q=1"), "http%3A%2F%2Fx.test%2Fa+b%3Fq%3D1");
    }
}
