use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384};
use tokio::sync::Mutex;

use qmc_kernel::error::{QmcError, QmcResult};

use crate::transport::SeTransport;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// RSA key size used for the log-reader OAEP key.
const RSA_KEY_BITS: usize = 3072;

/// A session to the secure element: holds the (simulated) SCP03 channel
/// plus the key material it would normally proxy to a physical SE051
/// part. Every public entry acquires `tunnel`, matching spec §4.8's
/// "tunnel mutex, reentrant by design" — modeled here as a plain
/// (non-reentrant) `tokio::Mutex` since nothing in this crate calls back
/// into itself while holding it.
pub struct SeSession {
    tunnel: Mutex<SeState>,
}

struct SeState {
    transport: Box<dyn SeTransport>,
    config_enc_key: [u8; 32],
    log_rsa_priv: RsaPrivateKey,
    log_rsa_pub: RsaPublicKey,
    device_signing_key: SigningKey,
    device_verifying_key: VerifyingKey,
}

impl SeSession {
    /// Opens the SE session. Must be called once after the runtime
    /// starts, before any other public entry (spec §4.8).
    pub fn open(mut transport: Box<dyn SeTransport>) -> QmcResult<Self> {
        if !transport.open() {
            return Err(QmcError::Internal);
        }
        let mut rng = OsRng;
        let log_rsa_priv = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|_| QmcError::Internal)?;
        let log_rsa_pub = RsaPublicKey::from(&log_rsa_priv);
        let device_signing_key = SigningKey::random(&mut rng);
        let device_verifying_key = *device_signing_key.verifying_key();
        let mut config_enc_key = [0u8; 32];
        rng.fill_bytes(&mut config_enc_key);

        Ok(Self {
            tunnel: Mutex::new(SeState {
                transport,
                config_enc_key,
                log_rsa_priv,
                log_rsa_pub,
                device_signing_key,
                device_verifying_key,
            }),
        })
    }

    async fn guard(&self) -> QmcResult<tokio::sync::MutexGuard<'_, SeState>> {
        let guard = self.tunnel.lock().await;
        if !guard.transport.is_open() {
            return Err(QmcError::Internal);
        }
        Ok(guard)
    }

    /// `se_get_uid()` (spec §4.8): the stable device identifier used
    /// everywhere else in the workspace (REST `deviceId`, MQTT topics).
    pub async fn uid_hex(&self) -> QmcResult<String> {
        let guard = self.guard().await?;
        Ok(hex::encode(guard.transport.device_uid()))
    }

    /// `se_get_random` (spec §4.8): SE-backed entropy, used for PBKDF2
    /// salts, session secrets, and per-record AES keys/IVs.
    pub async fn random(&self, len: usize) -> QmcResult<Vec<u8>> {
        let _guard = self.guard().await?;
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        Ok(buf)
    }

    /// AES-256-CBC encrypt with PKCS7 padding, used by the log pipeline
    /// (spec §4.5) for `recordEnc`.
    pub async fn aes256_cbc_encrypt(&self, key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> QmcResult<Vec<u8>> {
        let _guard = self.guard().await?;
        let enc = Aes256CbcEnc::new(key.into(), iv.into());
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// AES-256-CBC decrypt, the read-side counterpart used by tests and
    /// by the external log-reader contract (spec §8 scenario 3).
    pub async fn aes256_cbc_decrypt(&self, key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> QmcResult<Vec<u8>> {
        let _guard = self.guard().await?;
        let dec = Aes256CbcDec::new(key.into(), iv.into());
        dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| QmcError::SignatureInvalid)
    }

    /// HMAC-SHA256, used by C7 to sign the JWT-like session token.
    pub async fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> QmcResult<[u8; 32]> {
        let _guard = self.guard().await?;
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| QmcError::ArgInvalid)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    /// PBKDF2-HMAC-SHA256, used by C7 for passphrase hashing.
    pub async fn pbkdf2_sha256(&self, password: &[u8], salt: &[u8], iterations: u32, out_len: usize) -> QmcResult<Vec<u8>> {
        let _guard = self.guard().await?;
        let mut out = vec![0u8; out_len];
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
        Ok(out)
    }

    /// RSA-OAEP encrypt of `(iv||key)` to the log-reader public key
    /// (spec §3, `EncryptedLogRecord.data.keyIvEnc`).
    pub async fn rsa_oaep_encrypt(&self, plaintext: &[u8]) -> QmcResult<Vec<u8>> {
        let guard = self.guard().await?;
        let mut rng = OsRng;
        guard
            .log_rsa_pub
            .encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|_| QmcError::Internal)
    }

    /// The matching private-key decrypt, exposed so the log-reader
    /// contract (spec §8 scenario 3) can be exercised end to end in
    /// tests without a second, external SE.
    pub async fn rsa_oaep_decrypt(&self, ciphertext: &[u8]) -> QmcResult<Vec<u8>> {
        let guard = self.guard().await?;
        guard
            .log_rsa_priv
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| QmcError::SignatureInvalid)
    }

    /// SHA2-384 of arbitrary data, used both standalone and as the
    /// digest fed to ECDSA-P384 signing.
    pub async fn sha2_384(&self, data: &[u8]) -> QmcResult<[u8; 48]> {
        let _guard = self.guard().await?;
        let mut hasher = Sha384::new();
        hasher.update(data);
        Ok(hasher.finalize().into())
    }

    /// ECDSA-P384 sign over SHA2-384(data) with the device key
    /// (`EncryptedLogRecord.signature`).
    pub async fn ecdsa_p384_sign(&self, data: &[u8]) -> QmcResult<Vec<u8>> {
        let guard = self.guard().await?;
        let sig: Signature = guard.device_signing_key.sign(data);
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// ECDSA-P384 verify, used by the external log-reader contract and
    /// by this crate's own round-trip tests.
    pub async fn ecdsa_p384_verify(&self, data: &[u8], signature_der: &[u8]) -> QmcResult<bool> {
        let guard = self.guard().await?;
        let sig = match Signature::from_der(signature_der) {
            Ok(s) => s,
            Err(_) => return Ok(false),
        };
        Ok(guard.device_verifying_key.verify(data, &sig).is_ok())
    }

    /// The `ConfigEnc` AES-256 key bound to this SE session, used by C6
    /// to encrypt the configuration shadow at rest.
    pub async fn config_enc_key(&self) -> QmcResult<[u8; 32]> {
        let guard = self.guard().await?;
        Ok(guard.config_enc_key)
    }

    /// Exposes the log-reader's RSA public key in DER, for the
    /// `EncryptedLogRecord` header / tests that need it outside the SE.
    pub async fn log_reader_public_key_der(&self) -> QmcResult<Vec<u8>> {
        use rsa::pkcs8::EncodePublicKey;
        let guard = self.guard().await?;
        guard
            .log_rsa_pub
            .to_public_key_der()
            .map(|d| d.as_bytes().to_vec())
            .map_err(|_| QmcError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EphemeralTransport;

    async fn open_session() -> SeSession {
        SeSession::open(Box::new(EphemeralTransport::new([7u8; 32]))).unwrap()
    }

    #[tokio::test]
    async fn uid_matches_transport() {
        let se = open_session().await;
        assert_eq!(se.uid_hex().await.unwrap(), hex::encode([7u8; 32]));
    }

    #[tokio::test]
    async fn random_returns_requested_length() {
        let se = open_session().await;
        let r = se.random(32).await.unwrap();
        assert_eq!(r.len(), 32);
    }

    #[tokio::test]
    async fn aes_cbc_round_trips() {
        let se = open_session().await;
        let key = [1u8; 32];
        let iv = [2u8; 16];
        let plaintext = b"QmcLogRecordBytesThatArentBlockAligned";
        let ct = se.aes256_cbc_encrypt(&key, &iv, plaintext).await.unwrap();
        let pt = se.aes256_cbc_decrypt(&key, &iv, &ct).await.unwrap();
        assert_eq!(pt, plaintext);
    }

    #[tokio::test]
    async fn rsa_oaep_round_trips() {
        let se = open_session().await;
        let mut ivkey = [0u8; 48];
        ivkey[0] = 0xAB;
        let ct = se.rsa_oaep_encrypt(&ivkey).await.unwrap();
        let pt = se.rsa_oaep_decrypt(&ct).await.unwrap();
        assert_eq!(pt, ivkey);
    }

    #[tokio::test]
    async fn ecdsa_sign_then_verify_succeeds() {
        let se = open_session().await;
        let digest = se.sha2_384(b"some record bytes").await.unwrap();
        let sig = se.ecdsa_p384_sign(&digest).await.unwrap();
        assert!(se.ecdsa_p384_verify(&digest, &sig).await.unwrap());
    }

    #[tokio::test]
    async fn ecdsa_verify_fails_on_tampered_digest() {
        let se = open_session().await;
        let digest = se.sha2_384(b"some record bytes").await.unwrap();
        let sig = se.ecdsa_p384_sign(&digest).await.unwrap();
        let mut tampered = digest;
        tampered[0] ^= 0xFF;
        assert!(!se.ecdsa_p384_verify(&tampered, &sig).await.unwrap());
    }

    #[tokio::test]
    async fn pbkdf2_is_deterministic_for_same_inputs() {
        let se = open_session().await;
        let a = se.pbkdf2_sha256(b"hunter2", b"salt1234", 10_000, 32).await.unwrap();
        let b = se.pbkdf2_sha256(b"hunter2", b"salt1234", 10_000, 32).await.unwrap();
        assert_eq!(a, b);
        let c = se.pbkdf2_sha256(b"hunter3", b"salt1234", 10_000, 32).await.unwrap();
        assert_ne!(a, c);
    }
}
