//! Crypto Facade
//!
//! Thin layer over libsignal and the RustCrypto primitives: certificate
//! minting, attachment encryption, provision-message encryption, HKDF, and
//! the random identifiers the server hands out. Everything here is
//! deterministic given its inputs and the supplied RNG.

use std::sync::atomic::{AtomicU64, Ordering};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use libsignal_protocol::{
    DeviceId, KeyPair, PrivateKey, PublicKey, SenderCertificate, ServerCertificate, Timestamp,
};
use rand::{CryptoRng, Rng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const PROVISION_INFO: &[u8] = b"TextSecure Provisioning Message";
const PROVISION_VERSION: u8 = 1;

/// The server's sealed-sender signing certificate plus the private key it
/// retains for minting sender certificates.
pub struct ServerCertificateMaterial {
    pub certificate: ServerCertificate,
    pub key_pair: KeyPair,
}

/// Mints a fresh server certificate signed by the trust root.
pub fn generate_server_certificate<R: Rng + CryptoRng>(
    trust_root: &PrivateKey,
    rng: &mut R,
) -> ServerResult<ServerCertificateMaterial> {
    let key_pair = KeyPair::generate(rng);
    let certificate = ServerCertificate::new(1, key_pair.public_key, trust_root, rng)?;
    Ok(ServerCertificateMaterial {
        certificate,
        key_pair,
    })
}

/// Mints a sender certificate binding (ACI, E164, device, identity key).
pub fn generate_sender_certificate<R: Rng + CryptoRng>(
    server: &ServerCertificateMaterial,
    aci: Uuid,
    e164: &str,
    device_id: DeviceId,
    identity_key: PublicKey,
    expiration_ms: u64,
    rng: &mut R,
) -> ServerResult<SenderCertificate> {
    let cert = SenderCertificate::new(
        aci.to_string(),
        Some(e164.to_string()),
        identity_key,
        device_id,
        Timestamp::from_epoch_millis(expiration_ms),
        server.certificate.clone(),
        &server.key_pair.private_key,
        rng,
    )?;
    Ok(cert)
}

/// An attachment encrypted for CDN upload.
pub struct EncryptedAttachment {
    /// iv || ciphertext || mac.
    pub blob: Vec<u8>,
    /// AES key followed by HMAC key (64 bytes).
    pub key: Vec<u8>,
    /// SHA-256 over the whole blob.
    pub digest: Vec<u8>,
    /// Plaintext length after CBC padding.
    pub size: usize,
}

/// AES-256-CBC + HMAC-SHA256 attachment encryption.
pub fn encrypt_attachment<R: Rng + CryptoRng>(
    plaintext: &[u8],
    rng: &mut R,
) -> EncryptedAttachment {
    let mut key = vec![0u8; 64];
    rng.fill_bytes(&mut key);
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new_from_slices(&key[..32], &iv)
        .expect("fixed-length key and iv")
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let size = ciphertext.len();

    let mut blob = Vec::with_capacity(16 + ciphertext.len() + 32);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&key[32..]).expect("any key length");
    mac.update(&blob);
    blob.extend_from_slice(&mac.finalize().into_bytes());

    let digest = Sha256::digest(&blob).to_vec();

    EncryptedAttachment {
        blob,
        key,
        digest,
        size,
    }
}

/// Inverse of [`encrypt_attachment`]; verifies the HMAC trailer first.
pub fn decrypt_attachment(blob: &[u8], key: &[u8]) -> ServerResult<Vec<u8>> {
    if key.len() != 64 {
        return Err(ServerError::BadCryptoInput(format!(
            "attachment key must be 64 bytes, got {}",
            key.len()
        )));
    }
    if blob.len() < 16 + 32 {
        return Err(ServerError::BadCryptoInput("attachment blob too short".into()));
    }
    let (body, their_mac) = blob.split_at(blob.len() - 32);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&key[32..]).expect("any key length");
    mac.update(body);
    mac.verify_slice(their_mac)
        .map_err(|_| ServerError::BadCryptoInput("attachment mac mismatch".into()))?;

    let (iv, ciphertext) = body.split_at(16);
    Aes256CbcDec::new_from_slices(&key[..32], iv)
        .map_err(|_| ServerError::BadCryptoInput("attachment key invalid".into()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ServerError::BadCryptoInput("attachment padding invalid".into()))
}

/// An encrypted provision message plus the ephemeral key it was sealed with.
pub struct SealedProvisionMessage {
    /// version(1) || iv(16) || ciphertext || mac(32).
    pub body: Vec<u8>,
    /// Serialized ephemeral public key (33 bytes).
    pub ephemeral_public: Vec<u8>,
}

/// Encrypts a serialized `ProvisionMessage` for a linking client's ephemeral
/// public key: X25519 agreement, HKDF-SHA256, AES-256-CBC + HMAC-SHA256.
pub fn encrypt_provision_message<R: Rng + CryptoRng>(
    plaintext: &[u8],
    recipient: &PublicKey,
    rng: &mut R,
) -> ServerResult<SealedProvisionMessage> {
    let ephemeral = KeyPair::generate(rng);
    let agreement = ephemeral.private_key.calculate_agreement(recipient)?;

    let mut keys = [0u8; 64];
    hkdf(&agreement, None, PROVISION_INFO, &mut keys)?;

    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);
    let ciphertext = Aes256CbcEnc::new_from_slices(&keys[..32], &iv)
        .expect("fixed-length key and iv")
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut body = Vec::with_capacity(1 + 16 + ciphertext.len() + 32);
    body.push(PROVISION_VERSION);
    body.extend_from_slice(&iv);
    body.extend_from_slice(&ciphertext);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys[32..]).expect("any key length");
    mac.update(&body);
    body.extend_from_slice(&mac.finalize().into_bytes());

    Ok(SealedProvisionMessage {
        body,
        ephemeral_public: ephemeral.public_key.serialize().into_vec(),
    })
}

/// Test-side inverse of [`encrypt_provision_message`].
pub fn decrypt_provision_message(
    body: &[u8],
    ephemeral_public: &PublicKey,
    recipient_private: &PrivateKey,
) -> ServerResult<Vec<u8>> {
    if body.len() < 1 + 16 + 32 {
        return Err(ServerError::BadCryptoInput("provision body too short".into()));
    }
    if body[0] != PROVISION_VERSION {
        return Err(ServerError::BadCryptoInput(format!(
            "unknown provision version {}",
            body[0]
        )));
    }

    let agreement = recipient_private.calculate_agreement(ephemeral_public)?;
    let mut keys = [0u8; 64];
    hkdf(&agreement, None, PROVISION_INFO, &mut keys)?;

    let (signed, their_mac) = body.split_at(body.len() - 32);
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys[32..]).expect("any key length");
    mac.update(signed);
    mac.verify_slice(their_mac)
        .map_err(|_| ServerError::BadCryptoInput("provision mac mismatch".into()))?;

    let iv = &signed[1..17];
    let ciphertext = &signed[17..];
    Aes256CbcDec::new_from_slices(&keys[..32], iv)
        .map_err(|_| ServerError::BadCryptoInput("provision key invalid".into()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ServerError::BadCryptoInput("provision padding invalid".into()))
}

/// HKDF-SHA256 into `output`.
pub fn hkdf(input: &[u8], salt: Option<&[u8]>, info: &[u8], output: &mut [u8]) -> ServerResult<()> {
    Hkdf::<Sha256>::new(salt, input)
        .expand(info, output)
        .map_err(|_| ServerError::BadCryptoInput("hkdf output length invalid".into()))
}

/// Derives the unidentified-access key from a profile key: AES-256-GCM of 16
/// zero bytes under a zero nonce, truncated to 16 bytes.
pub fn derive_access_key(profile_key: &[u8]) -> ServerResult<[u8; 16]> {
    if profile_key.len() != 32 {
        return Err(ServerError::BadCryptoInput(format!(
            "profile key must be 32 bytes, got {}",
            profile_key.len()
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(profile_key)
        .map_err(|_| ServerError::BadCryptoInput("profile key invalid".into()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&[0u8; 12]), &[0u8; 16][..])
        .map_err(|_| ServerError::BadCryptoInput("access key derivation".into()))?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&ciphertext[..16]);
    Ok(key)
}

// ============================================================================
// Random identifiers
// ============================================================================

static NEXT_E164: AtomicU64 = AtomicU64::new(202_555_0000);
static NEXT_PROVISIONING_CODE: AtomicU64 = AtomicU64::new(114_701);

pub fn random_aci() -> Uuid {
    Uuid::new_v4()
}

pub fn random_pni() -> Uuid {
    Uuid::new_v4()
}

/// Allocates an E.164 number unique within the process lifetime.
pub fn generate_e164() -> String {
    let n = NEXT_E164.fetch_add(1, Ordering::Relaxed);
    format!("+1{:010}", n)
}

/// Registration ids follow the Signal convention: `[1, 2^14)`.
pub fn generate_registration_id<R: Rng>(rng: &mut R) -> u16 {
    rng.gen_range(1..0x4000)
}

pub fn valid_registration_id(id: u32) -> bool {
    (1..0x4000).contains(&id)
}

pub fn generate_password<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn generate_profile_key<R: Rng + CryptoRng>(rng: &mut R) -> [u8; 32] {
    let mut key = [0u8; 32];
    rng.fill_bytes(&mut key);
    key
}

/// Opaque 32-hex CDN key for stored attachments.
pub fn generate_cdn_key<R: Rng + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Server-issued code binding one pending link attempt.
pub fn generate_provisioning_code() -> String {
    format!("{:06}", NEXT_PROVISIONING_CODE.fetch_add(1, Ordering::Relaxed) % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_attachment_roundtrip() {
        let mut rng = OsRng;
        let plaintext = b"attachment payload";
        let encrypted = encrypt_attachment(plaintext, &mut rng);

        assert_eq!(encrypted.key.len(), 64);
        assert_eq!(encrypted.digest, Sha256::digest(&encrypted.blob).to_vec());
        // CBC pads to the next block boundary.
        assert_eq!(encrypted.size % 16, 0);
        assert!(encrypted.size > plaintext.len());

        let decrypted = decrypt_attachment(&encrypted.blob, &encrypted.key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_attachment_tamper_detected() {
        let mut rng = OsRng;
        let encrypted = encrypt_attachment(b"payload", &mut rng);
        let mut blob = encrypted.blob.clone();
        blob[20] ^= 0xff;
        assert!(decrypt_attachment(&blob, &encrypted.key).is_err());
    }

    #[test]
    fn test_provision_message_roundtrip() {
        let mut rng = OsRng;
        let recipient = KeyPair::generate(&mut rng);

        let sealed = encrypt_provision_message(b"provision me", &recipient.public_key, &mut rng)
            .unwrap();
        assert_eq!(sealed.body[0], PROVISION_VERSION);
        assert_eq!(sealed.ephemeral_public.len(), 33);

        let ephemeral = PublicKey::deserialize(&sealed.ephemeral_public).unwrap();
        let plaintext =
            decrypt_provision_message(&sealed.body, &ephemeral, &recipient.private_key).unwrap();
        assert_eq!(plaintext, b"provision me");
    }

    #[test]
    fn test_provision_message_wrong_key_fails() {
        let mut rng = OsRng;
        let recipient = KeyPair::generate(&mut rng);
        let other = KeyPair::generate(&mut rng);

        let sealed =
            encrypt_provision_message(b"secret", &recipient.public_key, &mut rng).unwrap();
        let ephemeral = PublicKey::deserialize(&sealed.ephemeral_public).unwrap();
        assert!(decrypt_provision_message(&sealed.body, &ephemeral, &other.private_key).is_err());
    }

    #[test]
    fn test_sender_certificate_chain() {
        let mut rng = OsRng;
        let trust_root = KeyPair::generate(&mut rng);
        let server = generate_server_certificate(&trust_root.private_key, &mut rng).unwrap();

        let identity = KeyPair::generate(&mut rng);
        let cert = generate_sender_certificate(
            &server,
            Uuid::new_v4(),
            "+12025550123",
            2.into(),
            identity.public_key,
            1_700_000_000_000,
            &mut rng,
        )
        .unwrap();
        assert!(!cert.serialized().unwrap().is_empty());
    }

    #[test]
    fn test_registration_id_range() {
        let mut rng = OsRng;
        for _ in 0..200 {
            let id = generate_registration_id(&mut rng);
            assert!(valid_registration_id(id as u32));
        }
        assert!(!valid_registration_id(0));
        assert!(!valid_registration_id(0x4000));
    }

    #[test]
    fn test_e164_unique_and_formatted() {
        let a = generate_e164();
        let b = generate_e164();
        assert_ne!(a, b);
        assert!(a.starts_with("+1"));
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_access_key_requires_32_byte_profile_key() {
        assert!(derive_access_key(&[0u8; 16]).is_err());
        let key = derive_access_key(&[7u8; 32]).unwrap();
        assert_eq!(key.len(), 16);
        // Deterministic for a fixed profile key.
        assert_eq!(key, derive_access_key(&[7u8; 32]).unwrap());
    }

    #[test]
    fn test_hkdf_known_length() {
        let mut out = [0u8; 64];
        hkdf(b"input", Some(b"salt"), b"info", &mut out).unwrap();
        assert_ne!(out, [0u8; 64]);
    }
}
