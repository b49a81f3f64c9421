use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use std::num::NonZeroU32;
use waffle_core::{Error, Result};
use zeroize::Zeroizing;

pub const SESSION_KEY_ENV: &str = "WAFFLE_SESSION_KEY";

const MAGIC: &[u8; 4] = b"WFS1";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Seals session files with AES-256-GCM under a passphrase-derived key.
///
/// Layout: `WFS1 | salt(16) | nonce(12) | ciphertext+tag`. Each seal uses a
/// fresh salt and nonce.
pub struct Sealer {
    passphrase: SecretString,
    rng: SystemRandom,
}

impl Sealer {
    pub fn new(passphrase: SecretString) -> Self {
        Self { passphrase, rng: SystemRandom::new() }
    }

    /// Reads the passphrase from `WAFFLE_SESSION_KEY`; `None` when unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(SESSION_KEY_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| Self::new(SecretString::new(v)))
    }

    pub fn is_sealed(data: &[u8]) -> bool {
        data.starts_with(MAGIC)
    }

    fn key(&self, salt: &[u8]) -> Result<LessSafeKey> {
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or_else(|| Error::Message("invalid PBKDF2 iteration count".into()))?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            self.passphrase.expose_secret().as_bytes(),
            &mut key[..],
        );
        let unbound = UnboundKey::new(&AES_256_GCM, &key[..]).map_err(|_| Error::Message("invalid session key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut salt).map_err(|_| Error::Message("random source unavailable".into()))?;
        self.rng.fill(&mut nonce).map_err(|_| Error::Message("random source unavailable".into()))?;

        let key = self.key(&salt)?;
        let mut body = plaintext.to_vec();
        key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::from(MAGIC), &mut body)
            .map_err(|_| Error::Message("session encryption failed".into()))?;

        let mut out = Vec::with_capacity(MAGIC.len() + SALT_LEN + NONCE_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn open(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let header = MAGIC.len() + SALT_LEN + NONCE_LEN;
        if !Self::is_sealed(data) || data.len() < header {
            return Err(Error::Message("not a sealed session file".into()));
        }
        let salt = &data[MAGIC.len()..MAGIC.len() + SALT_LEN];
        let nonce = Nonce::try_assume_unique_for_key(&data[MAGIC.len() + SALT_LEN..header])
            .map_err(|_| Error::Message("corrupt session nonce".into()))?;
        let key = self.key(salt)?;
        let mut body = Zeroizing::new(data[header..].to_vec());
        let plain_len = key
            .open_in_place(nonce, Aad::from(MAGIC), &mut body[..])
            .map_err(|_| Error::Message("session decryption failed (wrong key or corrupt file)".into()))?
            .len();
        body.truncate(plain_len);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer(pass: &str) -> Sealer {
        Sealer::new(SecretString::new(pass.to_string()))
    }

    #[test]
    fn seal_then_open() {
        let s = sealer("correct horse");
        let sealed = s.seal(b"{\"session_id\":\"abc\"}").unwrap();
        assert!(Sealer::is_sealed(&sealed));
        assert!(!sealed.windows(10).any(|w| w == b"session_id"));
        assert_eq!(&s.open(&sealed).unwrap()[..], b"{\"session_id\":\"abc\"}");
    }

    #[test]
    fn wrong_key_and_tampering_fail() {
        let sealed = sealer("one").seal(b"payload").unwrap();
        assert!(sealer("two").open(&sealed).is_err());

        let mut tampered = sealed.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert!(sealer("one").open(&tampered).is_err());
        assert!(sealer("one").open(b"{}").is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let s = sealer("k");
        assert_ne!(s.seal(b"x").unwrap(), s.seal(b"x").unwrap());
    }
}
