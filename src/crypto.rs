// Copyright 2025 Juan Miguel Giraldo
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use crate::error::{OnionError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

pub const RSA_BITS: usize = 2048;
pub const AES_KEY_SIZE: usize = 32;
const AES_NONCE_SIZE: usize = 12;

pub type SymmetricKey = [u8; AES_KEY_SIZE];

/// Length of the padded base64 encoding of `bytes` raw bytes.
pub const fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Text width of an RSA ciphertext for a modulus of `bits` bits.
///
/// OAEP ciphertexts are always exactly the modulus size, so the encoded
/// width is a constant of the key size.
pub const fn wrapped_key_width(bits: usize) -> usize {
    base64_len(bits / 8)
}

pub fn generate_rsa_keys() -> Result<RsaPrivateKey> {
    RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| OnionError::Crypto(format!("RSA key generation failed: {}", e)))
}

/// Encrypts `data` with RSA-OAEP (SHA-256) and returns it base64 encoded.
pub fn rsa_encrypt(pub_key: &RsaPublicKey, data: &[u8]) -> Result<String> {
    let ciphertext = pub_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
        .map_err(|e| OnionError::Crypto(format!("RSA encryption failed: {}", e)))?;
    Ok(STANDARD.encode(ciphertext))
}

pub fn rsa_decrypt(priv_key: &RsaPrivateKey, data: &str) -> Result<Vec<u8>> {
    let ciphertext = STANDARD
        .decode(data)
        .map_err(|e| OnionError::Crypto(format!("RSA ciphertext is not base64: {}", e)))?;
    priv_key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|e| OnionError::Crypto(format!("RSA decryption failed: {}", e)))
}

pub fn generate_sym_key() -> SymmetricKey {
    rand::random()
}

pub fn export_sym_key(key: &SymmetricKey) -> String {
    STANDARD.encode(key)
}

pub fn import_sym_key(text: &str) -> Result<SymmetricKey> {
    let bytes = STANDARD
        .decode(text)
        .map_err(|e| OnionError::Crypto(format!("symmetric key is not base64: {}", e)))?;
    sym_key_from_bytes(&bytes)
}

pub fn sym_key_from_bytes(bytes: &[u8]) -> Result<SymmetricKey> {
    bytes.try_into().map_err(|_| {
        OnionError::Crypto(format!(
            "symmetric key must be {} bytes, got {}",
            AES_KEY_SIZE,
            bytes.len()
        ))
    })
}

/// Encrypts `plaintext` with AES-256-GCM under a fresh nonce.
///
/// Output is `base64(nonce || ciphertext)`.
pub fn sym_encrypt(key: &SymmetricKey, plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let nonce_bytes = rand::random::<[u8; AES_NONCE_SIZE]>();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| OnionError::Crypto(format!("AES encryption failed: {}", e)))?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

pub fn sym_decrypt(key: &SymmetricKey, data: &str) -> Result<String> {
    let sealed = STANDARD
        .decode(data)
        .map_err(|e| OnionError::Crypto(format!("AES ciphertext is not base64: {}", e)))?;
    if sealed.len() < AES_NONCE_SIZE {
        return Err(OnionError::Crypto("AES ciphertext shorter than its nonce".into()));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| OnionError::Crypto(format!("AES decryption failed: {}", e)))?;

    String::from_utf8(plaintext)
        .map_err(|e| OnionError::Crypto(format!("decrypted layer is not UTF-8: {}", e)))
}

pub fn export_pub_key(pub_key: &RsaPublicKey) -> Result<String> {
    pub_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| OnionError::Crypto(format!("Failed to encode public key: {}", e)))
}

pub fn import_pub_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| OnionError::Crypto(format!("Failed to decode public key: {}", e)))
}

pub fn export_prv_key(priv_key: &RsaPrivateKey) -> Result<String> {
    let pem = priv_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| OnionError::Crypto(format!("Failed to encode private key: {}", e)))?;
    Ok(pem.as_str().to_owned())
}

pub fn import_prv_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| OnionError::Crypto(format!("Failed to decode private key: {}", e)))
}
