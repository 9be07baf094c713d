use std::fmt;

/// MD5 digest of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digest([u8; 16]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

pub fn digest(content: &[u8]) -> Digest {
    Digest(md5::compute(content).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_lowercase_hex() {
        assert_eq!(digest(b"").to_string(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            digest(b"The quick brown fox jumps over the lazy dog").to_string(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn one_byte_difference_changes_digest() {
        assert_ne!(digest(b"local = 1\n"), digest(b"local = 1"));
    }
}
