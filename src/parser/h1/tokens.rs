//! Byte-classification helpers for the HTTP/1.1 grammar (RFC 9110 §5.6.2,
//! RFC 9112 §3).

/// `tchar` as defined by RFC 9110 §5.6.2, used for header field names and
/// other "token" productions.
#[inline]
pub fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// A byte valid within a request-target, per RFC 9112 §3.2 (kept
/// permissive: any visible, non-whitespace, non-control ASCII byte).
#[inline]
pub fn is_request_target_token(b: u8) -> bool {
    b > 0x20 && b != 0x7f
}

/// `field-vchar` per RFC 9110 §5.5 — visible ASCII plus obs-text (bytes
/// `0x80..=0xFF`, tolerated but not validated as any particular charset).
#[inline]
pub fn is_header_value_token(b: u8) -> bool {
    b == b'\t' || (0x20..=0xff).contains(&b) && b != 0x7f
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tchar_accepts_method_alphabet() {
        assert!(is_tchar(b'G'));
        assert!(is_tchar(b'-'));
        assert!(!is_tchar(b' '));
        assert!(!is_tchar(b':'));
    }

    #[test]
    fn request_target_token_rejects_control_and_space() {
        assert!(is_request_target_token(b'/'));
        assert!(!is_request_target_token(b' '));
        assert!(!is_request_target_token(0x01));
    }

    #[test]
    fn header_value_token_allows_tab_and_visible_ascii() {
        assert!(is_header_value_token(b'\t'));
        assert!(is_header_value_token(b'a'));
        assert!(!is_header_value_token(b'\r'));
    }
}
