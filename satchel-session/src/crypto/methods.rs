//! Cipher catalogue, exclusion policy and the raw block-cipher transforms.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};

/// Every cipher name the crypto backend knows, including the ones the
/// default policy rejects.
pub const CATALOGUE: &[&str] = &[
    "aes-128-cbc",
    "aes-128-cbc-hmac-sha1",
    "aes-128-cbc-hmac-sha256",
    "aes-128-ccm",
    "aes-128-cfb",
    "aes-128-ctr",
    "aes-128-ecb",
    "aes-128-gcm",
    "aes-128-ocb",
    "aes-128-ofb",
    "aes-128-siv",
    "aes-192-cbc",
    "aes-192-ccm",
    "aes-192-cfb",
    "aes-192-ctr",
    "aes-192-ecb",
    "aes-192-gcm",
    "aes-192-ocb",
    "aes-192-ofb",
    "aes-256-cbc",
    "aes-256-cbc-hmac-sha1",
    "aes-256-cbc-hmac-sha256",
    "aes-256-ccm",
    "aes-256-cfb",
    "aes-256-ctr",
    "aes-256-ecb",
    "aes-256-gcm",
    "aes-256-ocb",
    "aes-256-ofb",
    "aes-256-siv",
    "chacha20-poly1305",
    "des-ede3-cbc",
    "desx-cbc",
    "id-aes128-wrap",
    "id-aes192-wrap-pad",
    "id-aes256-wrap",
    "rc2-cbc",
    "rc4",
    "rc4-hmac-md5",
];

/// Name used when no method is configured.
pub const DEFAULT_METHOD: &str = "aes-256-cbc";

/// Which catalogue entries may be used for session payloads.
///
/// The envelope only carries ciphertext and IV, so modes that need an
/// authentication tag or key-wrap framing cannot round-trip and are refused,
/// along with broken primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherPolicy {
    /// Case-insensitive substrings that reject a name.
    pub forbidden_fragments: Vec<String>,
    /// Exact names (case-insensitive) that are refused.
    pub forbidden_names: Vec<String>,
}

impl Default for CipherPolicy {
    fn default() -> Self {
        let fragments = [
            "ecb", "des", "rc2", "rc4", "md5", "-ocb", "-ccm", "-gcm", "-siv", "wrap", "poly1305",
        ];
        let names = [
            "aes-128-cbc-hmac-sha1",
            "aes-256-cbc-hmac-sha1",
            "aes-128-cbc-hmac-sha256",
            "aes-256-cbc-hmac-sha256",
        ];
        Self {
            forbidden_fragments: fragments.iter().map(|s| s.to_string()).collect(),
            forbidden_names: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CipherPolicy {
    /// Whether the policy lets `name` through.
    pub fn allows(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        !self
            .forbidden_fragments
            .iter()
            .any(|f| lower.contains(&f.to_ascii_lowercase()))
            && !self
                .forbidden_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&lower))
    }

    /// Catalogue entries that pass the policy and have an implementation.
    pub fn available(&self) -> Vec<&'static str> {
        CATALOGUE
            .iter()
            .copied()
            .filter(|name| self.allows(name) && Method::lookup(name).is_some())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cbc,
    Cfb,
    Ctr,
    Ofb,
}

/// A usable cipher: AES with a key size and a chaining mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    name: &'static str,
    key_len: usize,
    mode: Mode,
}

/// Why a raw transform failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransformError {
    InvalidLength,
    BadPadding,
}

impl Default for Method {
    /// AES-256 in CBC mode.
    fn default() -> Self {
        Self {
            name: DEFAULT_METHOD,
            key_len: 32,
            mode: Mode::Cbc,
        }
    }
}

macro_rules! with_aes {
    ($key_len:expr, $alias:ident => $body:expr) => {
        match $key_len {
            16 => {
                type $alias = Aes128;
                $body
            }
            24 => {
                type $alias = Aes192;
                $body
            }
            _ => {
                type $alias = Aes256;
                $body
            }
        }
    };
}

impl Method {
    /// Resolve a catalogue name to an implementation.
    pub fn lookup(name: &str) -> Option<Self> {
        let name = CATALOGUE.iter().copied().find(|n| *n == name)?;
        let mut parts = name.split('-');
        if parts.next()? != "aes" {
            return None;
        }
        let key_len = match parts.next()? {
            "128" => 16,
            "192" => 24,
            "256" => 32,
            _ => return None,
        };
        let mode = match parts.next()? {
            "cbc" => Mode::Cbc,
            "cfb" => Mode::Cfb,
            "ctr" => Mode::Ctr,
            "ofb" => Mode::Ofb,
            _ => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { name, key_len, mode })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Every supported mode uses a full AES block as IV.
    pub fn iv_len(&self) -> usize {
        16
    }

    /// Fit `key` to the cipher's key size: zero-padded when short,
    /// truncated when long.
    pub(crate) fn fit_key(&self, key: &[u8]) -> Vec<u8> {
        let mut fitted = key.to_vec();
        fitted.resize(self.key_len, 0);
        fitted
    }

    pub(crate) fn encrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let key = self.fit_key(key);
        let mut buf = data.to_vec();
        with_aes!(self.key_len, C => match self.mode {
            Mode::Cbc => {
                let enc = cbc::Encryptor::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?;
                Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
            }
            Mode::Cfb => {
                cfb_mode::Encryptor::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .encrypt(&mut buf);
                Ok(buf)
            }
            Mode::Ctr => {
                ctr::Ctr128BE::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .apply_keystream(&mut buf);
                Ok(buf)
            }
            Mode::Ofb => {
                ofb::Ofb::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .apply_keystream(&mut buf);
                Ok(buf)
            }
        })
    }

    pub(crate) fn decrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let key = self.fit_key(key);
        let mut buf = data.to_vec();
        with_aes!(self.key_len, C => match self.mode {
            Mode::Cbc => cbc::Decryptor::<C>::new_from_slices(&key, iv)
                .map_err(|_| TransformError::InvalidLength)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|_| TransformError::BadPadding),
            Mode::Cfb => {
                cfb_mode::Decryptor::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .decrypt(&mut buf);
                Ok(buf)
            }
            Mode::Ctr => {
                ctr::Ctr128BE::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .apply_keystream(&mut buf);
                Ok(buf)
            }
            Mode::Ofb => {
                ofb::Ofb::<C>::new_from_slices(&key, iv)
                    .map_err(|_| TransformError::InvalidLength)?
                    .apply_keystream(&mut buf);
                Ok(buf)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_filters_catalogue() {
        let available = CipherPolicy::default().available();
        assert!(available.contains(&"aes-256-cbc"));
        assert!(available.contains(&"aes-128-ctr"));
        assert_eq!(available.len(), 12);

        for refused in [
            "aes-128-ecb",
            "aes-256-gcm",
            "aes-128-ccm",
            "aes-256-ocb",
            "aes-128-siv",
            "id-aes256-wrap",
            "des-ede3-cbc",
            "rc2-cbc",
            "rc4",
            "rc4-hmac-md5",
            "aes-256-cbc-hmac-sha1",
            "chacha20-poly1305",
        ] {
            assert!(!available.contains(&refused), "{refused}");
        }
    }

    #[test]
    fn test_policy_is_case_insensitive() {
        let policy = CipherPolicy::default();
        assert!(!policy.allows("AES-128-CBC-HMAC-SHA1"));
        assert!(!policy.allows("AES-128-GCM"));
        assert!(policy.allows("AES-128-CBC"));
    }

    #[test]
    fn test_policy_can_be_tightened() {
        let mut policy = CipherPolicy::default();
        policy.forbidden_fragments.push("-ofb".into());
        let available = policy.available();
        assert_eq!(available.len(), 9);
        assert!(!available.contains(&"aes-192-ofb"));
    }

    #[test]
    fn test_lookup() {
        let method = Method::lookup("aes-192-cfb").unwrap();
        assert_eq!(method.key_len(), 24);
        assert_eq!(method.iv_len(), 16);
        assert!(Method::lookup("aes-256-gcm").is_none());
        assert!(Method::lookup("aes-256-cbc-hmac-sha1").is_none());
        assert!(Method::lookup("aes-512-cbc").is_none());
    }

    #[test]
    fn test_default_matches_catalogue_entry() {
        assert_eq!(Method::lookup(DEFAULT_METHOD), Some(Method::default()));
    }

    #[test]
    fn test_key_fitting() {
        let method = Method::lookup("aes-128-cbc").unwrap();
        assert_eq!(method.fit_key(b"abc").len(), 16);
        assert_eq!(&method.fit_key(b"abc")[..4], b"abc\0");
        assert_eq!(method.fit_key(&[7u8; 40]), vec![7u8; 16]);
    }

    #[test]
    fn test_cbc_rejects_wrong_key() {
        let method = Method::lookup("aes-256-cbc").unwrap();
        let iv = [3u8; 16];
        let ct = method.encrypt(b"right", &iv, b"some session payload").unwrap();
        assert_eq!(ct.len() % 16, 0);
        let plain = method.decrypt(b"right", &iv, &ct).unwrap();
        assert_eq!(plain, b"some session payload");
        assert!(method.decrypt(b"right", &iv, &ct[..ct.len() - 1]).is_err());
    }
}
