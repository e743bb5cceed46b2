use super::RedirectError;
use libc::c_int;

/// Direction a stream was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAccess {
    Read,
    Write,
    ReadWrite,
}

/// A stream mode string turned into `open(2)` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMode {
    pub access: StreamAccess,
    pub flags: c_int,
}

/// Decode an `fopen` mode string.
///
/// `r`, `w` or `a` picks the base mode. It may be followed by `b` (ignored),
/// then `+` for read-write (optionally followed by another `b`), then `x` for
/// exclusive create. Anything after that is ignored.
pub fn decode_mode(mode: &[u8]) -> Result<DecodedMode, RedirectError> {
    let (mut access, mut access_flags, mut extra) = match mode.first() {
        Some(b'r') => (StreamAccess::Read, libc::O_RDONLY, 0),
        Some(b'w') => (StreamAccess::Write, libc::O_WRONLY, libc::O_CREAT | libc::O_TRUNC),
        Some(b'a') => (StreamAccess::Write, libc::O_WRONLY, libc::O_CREAT | libc::O_APPEND),
        _ => return Err(RedirectError::InvalidMode),
    };

    let mut rest = &mode[1..];
    if let [b'b', tail @ ..] = rest {
        rest = tail;
    }
    if let [b'+', tail @ ..] = rest {
        access = StreamAccess::ReadWrite;
        access_flags = libc::O_RDWR;
        rest = tail;
        if let [b'b', tail @ ..] = rest {
            rest = tail;
        }
    }
    if let [b'x', ..] = rest {
        extra |= libc::O_EXCL;
    }

    Ok(DecodedMode {
        access,
        flags: access_flags | extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::{O_APPEND, O_CREAT, O_EXCL, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY};

    fn flags(mode: &str) -> c_int {
        decode_mode(mode.as_bytes()).unwrap().flags
    }

    #[test]
    fn test_read_only() {
        let decoded = decode_mode(b"r").unwrap();
        assert_eq!(decoded.access, StreamAccess::Read);
        assert_eq!(decoded.flags, O_RDONLY);
        assert_eq!(decoded.flags & O_CREAT, 0);
    }

    #[test]
    fn test_write_creates_and_truncates() {
        assert_eq!(flags("w"), O_WRONLY | O_CREAT | O_TRUNC);
    }

    #[test]
    fn test_append_plus_is_read_write() {
        let decoded = decode_mode(b"a+").unwrap();
        assert_eq!(decoded.access, StreamAccess::ReadWrite);
        assert_eq!(decoded.flags, O_RDWR | O_CREAT | O_APPEND);
    }

    #[test]
    fn test_binary_flag_is_ignored() {
        assert_eq!(decode_mode(b"rb").unwrap(), decode_mode(b"r").unwrap());
        assert_eq!(flags("rb+"), flags("r+"));
        assert_eq!(flags("r+b"), flags("r+"));
    }

    #[test]
    fn test_exclusive_create() {
        assert_eq!(flags("wx"), O_WRONLY | O_CREAT | O_TRUNC | O_EXCL);
        assert_eq!(flags("w+bx"), O_RDWR | O_CREAT | O_TRUNC | O_EXCL);
        // 'x' is only recognised in its position.
        assert_eq!(flags("wxb"), flags("wx"));
        assert_eq!(flags("rbb"), flags("r"));
    }

    #[test]
    fn test_invalid_leading_character() {
        assert_eq!(decode_mode(b"z"), Err(RedirectError::InvalidMode));
        assert_eq!(decode_mode(b"+r"), Err(RedirectError::InvalidMode));
        assert_eq!(decode_mode(b""), Err(RedirectError::InvalidMode));
    }
}
