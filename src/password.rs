//! Password handling for encrypted entries.

use zeroize::Zeroizing;

/// A password for decrypting archive entries.
///
/// The value is wiped from memory when dropped. An empty password means
/// "no password" and clears any previously set value.
#[derive(Clone, Default)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a new password from a string.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// Creates the empty password.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns the password as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the length of the password in characters.
    pub fn len(&self) -> usize {
        self.inner.chars().count()
    }

    /// Returns the password as NUL-terminated bytes for C consumers.
    ///
    /// Interior NUL bytes truncate the password, matching what a C reader
    /// of the same buffer would see.
    pub fn to_c_bytes(&self) -> Zeroizing<Vec<u8>> {
        let bytes = self.inner.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let mut out = Vec::with_capacity(end + 1);
        out.extend_from_slice(&bytes[..end]);
        out.push(0);
        Zeroizing::new(out)
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose the actual password in debug output
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Option<String>> for Password {
    fn from(s: Option<String>) -> Self {
        s.map(Self::new).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug() {
        let password = Password::new("secret");
        let debug = format!("{:?}", password);
        // Debug output should not contain the actual password
        assert!(!debug.contains("secret"));
        assert!(debug.contains("len"));
    }

    #[test]
    fn test_password_from_conversions() {
        let password: Password = "test".into();
        assert_eq!(password.as_str(), "test");

        let password: Password = String::from("test").into();
        assert_eq!(password.as_str(), "test");

        let password: Password = None::<String>.into();
        assert!(password.is_empty());
    }

    #[test]
    fn test_password_len() {
        let password = Password::new("пароль");
        assert_eq!(password.len(), 6);
        assert!(!password.is_empty());
        assert!(Password::none().is_empty());
    }

    #[test]
    fn test_c_bytes_truncate_at_nul() {
        let password = Password::new("12\03");
        assert_eq!(password.to_c_bytes().as_slice(), b"12\0");

        let password = Password::new("123");
        assert_eq!(password.to_c_bytes().as_slice(), b"123\0");
    }
}
