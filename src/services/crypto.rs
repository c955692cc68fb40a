use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::{aead, pbkdf2, rand::{SecureRandom, SystemRandom}};
use std::num::NonZeroU32;

const DEFAULT_SECRET: &str = "junket-office-secret-v1";
const SECRET_ENV: &str = "JUNKET_SECRET";
const SEALED_PREFIX: &str = "sealed:v1";
const PBKDF2_ITERATIONS: u32 = 100_000;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// Seals credentials (backend and OpenAI keys) before they go into the settings table.
///
/// The key is derived from `JUNKET_SECRET` when set, so a copied database
/// alone does not reveal them.
pub struct SecretBox {
    secret: Vec<u8>,
}

impl SecretBox {
    pub fn from_env() -> Self {
        let secret = std::env::var(SECRET_ENV).unwrap_or_else(|_| DEFAULT_SECRET.to_string());
        SecretBox::new(secret.as_bytes())
    }

    pub fn new(secret: &[u8]) -> Self {
        SecretBox {
            secret: secret.to_vec(),
        }
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| anyhow!("Failed to generate salt"))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("Failed to generate nonce"))?;

        let key = self.derive_key(&salt)?;
        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, aead::Aad::from(SEALED_PREFIX.as_bytes()), &mut in_out)
            .map_err(|_| anyhow!("Encryption failed"))?;

        Ok(format!(
            "{}:{}:{}:{}",
            SEALED_PREFIX,
            general_purpose::STANDARD.encode(salt),
            general_purpose::STANDARD.encode(nonce_bytes),
            general_purpose::STANDARD.encode(in_out)
        ))
    }

    pub fn open(&self, sealed: &str) -> Result<String> {
        let payload = sealed
            .strip_prefix(SEALED_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| anyhow!("Unknown sealed format"))?;
        let parts: Vec<&str> = payload.split(':').collect();
        let [salt, nonce, data] = parts.as_slice() else {
            return Err(anyhow!("Invalid sealed payload"));
        };

        let salt = general_purpose::STANDARD
            .decode(salt)
            .map_err(|e| anyhow!("Decode salt: {}", e))?;
        let nonce_bytes: [u8; NONCE_LEN] = general_purpose::STANDARD
            .decode(nonce)
            .map_err(|e| anyhow!("Decode nonce: {}", e))?
            .try_into()
            .map_err(|_| anyhow!("Invalid nonce length"))?;
        let mut data = general_purpose::STANDARD
            .decode(data)
            .map_err(|e| anyhow!("Decode ciphertext: {}", e))?;

        let key = self.derive_key(&salt)?;
        let plaintext = key
            .open_in_place(
                aead::Nonce::assume_unique_for_key(nonce_bytes),
                aead::Aad::from(SEALED_PREFIX.as_bytes()),
                &mut data,
            )
            .map_err(|_| anyhow!("Decryption failed"))?;
        Ok(String::from_utf8(plaintext.to_vec())?)
    }

    fn derive_key(&self, salt: &[u8]) -> Result<aead::LessSafeKey> {
        let mut key_bytes = [0u8; 32];
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or_else(|| anyhow!("Invalid iterations"))?;
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            &self.secret,
            &mut key_bytes,
        );
        let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &key_bytes)
            .map_err(|_| anyhow!("Invalid key material"))?;
        Ok(aead::LessSafeKey::new(unbound))
    }
}
