use core::fmt;

/// A null-padded string of at most `N` bytes, stored inline. This is the on-medium
/// representation of every text field of a [`ConfigRecord`](crate::ConfigRecord).
///
/// Values longer than `N` are truncated at the last char boundary that fits. A value that uses
/// all `N` bytes has no terminator, readers stop at the first `\0` or at `N`.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

impl<const N: usize> FixedStr<N> {
    pub const CAPACITY: usize = N;

    /// An all-zero value, which reads back as the empty string.
    pub const fn empty() -> Self {
        Self([0u8; N])
    }

    /// Creates a null-padded value from a string known to fit.
    ///
    /// Usage: `const BLANK: FixedStr<32> = FixedStr::from_str_const("blank");`
    pub const fn from_str_const(s: &str) -> Self {
        let src = s.as_bytes();
        assert!(src.len() <= N);
        let mut dst = [0u8; N];
        let mut i = 0;
        while i < src.len() {
            dst[i] = src[i];
            i += 1;
        }
        Self(dst)
    }

    /// Copies `s` into a new value, truncating to the capacity.
    pub fn truncating(s: &str) -> Self {
        let mut dst = [0u8; N];
        copy_truncating(&mut dst, s);
        Self(dst)
    }

    /// Wraps raw bytes read back from the medium.
    pub const fn from_bytes(raw: [u8; N]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// The text up to the first null byte. Bytes that are not valid UTF-8 end the string early.
    pub fn as_str(&self) -> &str {
        str_until_nul(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

/// Reads a null-padded buffer as text, stopping at the first `\0` or at the first byte that is
/// not valid UTF-8.
pub(crate) fn str_until_nul(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match core::str::from_utf8(&bytes[..len]) {
        Ok(s) => s,
        // the prefix up to valid_up_to is valid by definition
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

/// Copies `s` into `dst`, truncating at a char boundary and zero filling the remainder.
pub(crate) fn copy_truncating(dst: &mut [u8], s: &str) {
    let mut end = s.len().min(dst.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    dst[..end].copy_from_slice(&s.as_bytes()[..end]);
    dst[end..].fill(0);
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedStr<{N}>(\"")?;
        for &byte in self.0.iter().take_while(|&&b| b != 0) {
            write!(f, "{}", core::ascii::escape_default(byte))?;
        }
        write!(f, "\")")
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for FixedStr<N> {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

impl<const N: usize> AsRef<str> for FixedStr<N> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> PartialEq<str> for FixedStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for FixedStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_at_capacity() {
        let s = FixedStr::<4>::truncating("abcdef");
        assert_eq!(s.as_str(), "abcd");
        assert_eq!(s.as_bytes(), b"abcd");
    }

    #[test]
    fn truncates_at_char_boundary() {
        // 'é' is two bytes, the second one would not fit
        let s = FixedStr::<4>::truncating("abcé");
        assert_eq!(s.as_str(), "abc");
    }

    #[test]
    fn pads_with_nul() {
        let s = FixedStr::<6>::truncating("ab");
        assert_eq!(s.as_bytes(), b"ab\0\0\0\0");
        assert!(!s.is_empty());
        assert!(FixedStr::<6>::empty().is_empty());
    }

    #[test]
    fn invalid_utf8_ends_string() {
        let s = FixedStr::<4>::from_bytes([b'o', b'k', 0xff, b'x']);
        assert_eq!(s.as_str(), "ok");
    }

    #[test]
    fn debug_escapes() {
        let s = FixedStr::<8>::truncating("a\"b");
        assert_eq!(format!("{s:?}"), "FixedStr<8>(\"a\\\"b\")");
    }
}
