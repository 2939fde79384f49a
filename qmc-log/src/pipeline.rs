use std::sync::Arc;

use qmc_kernel::error::{QmcError, QmcResult};
use qmc_se::SeSession;

use crate::types::{EncryptedLogRecord, LogRecord, LOG_RECORD_WIRE_SIZE};

/// PKCS#7 padding to an AES block (spec §4.5 step 2: "AES-256-CBC
/// encrypt the padded record").
fn pkcs7_pad(data: &[u8], block: usize) -> Vec<u8> {
    let pad_len = block - (data.len() % block);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

fn pkcs7_unpad(data: &[u8]) -> QmcResult<Vec<u8>> {
    let pad_len = *data.last().ok_or(QmcError::Internal)? as usize;
    if pad_len == 0 || pad_len > data.len() {
        return Err(QmcError::SignatureInvalid);
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

/// Implements spec §4.5's per-record hybrid-encryption algorithm: a
/// fresh random IV+AES key wraps the plaintext record, the key+IV pair
/// is itself RSA-OAEP-wrapped to the log reader's public key, and the
/// whole thing is signed (SHA2-384 then ECDSA-P384) so a reader can
/// detect substitution as well as disclosure.
pub async fn encrypt_record(se: &Arc<SeSession>, record: &LogRecord) -> QmcResult<EncryptedLogRecord> {
    let iv_and_key = se.random(16 + 32).await?;
    let iv: [u8; 16] = iv_and_key[..16].try_into().map_err(|_| QmcError::Internal)?;
    let key: [u8; 32] = iv_and_key[16..].try_into().map_err(|_| QmcError::Internal)?;

    let plaintext = record.to_bytes();
    let padded = pkcs7_pad(&plaintext, 16);
    let record_enc = se.aes256_cbc_encrypt(&key, &iv, &padded).await?;

    let mut iv_then_key = Vec::with_capacity(48);
    iv_then_key.extend_from_slice(&iv);
    iv_then_key.extend_from_slice(&key);
    let keyiv_enc = se.rsa_oaep_encrypt(&iv_then_key).await?;

    let mut digest_input = Vec::with_capacity(keyiv_enc.len() + record_enc.len());
    digest_input.extend_from_slice(&keyiv_enc);
    digest_input.extend_from_slice(&record_enc);
    let digest = se.sha2_384(&digest_input).await?;
    let signature = se.ecdsa_p384_sign(&digest).await?;

    Ok(EncryptedLogRecord {
        length: (keyiv_enc.len() + record_enc.len()) as u32,
        keyiv_enc,
        record_enc,
        signature,
    })
}

/// The reverse path, used by the secure-element-equipped log reader
/// tooling (and by this crate's own tests to close the loop): verifies
/// the signature before unwrapping anything, per spec §4.5's "a reader
/// must reject a record whose signature does not verify".
pub async fn decrypt_record(se: &Arc<SeSession>, enc: &EncryptedLogRecord) -> QmcResult<LogRecord> {
    let mut digest_input = Vec::with_capacity(enc.keyiv_enc.len() + enc.record_enc.len());
    digest_input.extend_from_slice(&enc.keyiv_enc);
    digest_input.extend_from_slice(&enc.record_enc);
    let digest = se.sha2_384(&digest_input).await?;
    if !se.ecdsa_p384_verify(&digest, &enc.signature).await? {
        return Err(QmcError::SignatureInvalid);
    }

    let iv_then_key = se.rsa_oaep_decrypt(&enc.keyiv_enc).await?;
    if iv_then_key.len() != 48 {
        return Err(QmcError::Internal);
    }
    let iv: [u8; 16] = iv_then_key[..16].try_into().map_err(|_| QmcError::Internal)?;
    let key: [u8; 32] = iv_then_key[16..].try_into().map_err(|_| QmcError::Internal)?;

    let padded = se.aes256_cbc_decrypt(&key, &iv, &enc.record_enc).await?;
    let plaintext = pkcs7_unpad(&padded)?;
    let bytes: [u8; LOG_RECORD_WIRE_SIZE] = plaintext.as_slice().try_into().map_err(|_| QmcError::Internal)?;
    LogRecord::from_bytes(&bytes).ok_or(QmcError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogCategoryId, LogEventCode, LogRecordData, LogSourceId, LogTimestamp, RecordHead};
    use qmc_se::EphemeralTransport;

    fn sample() -> LogRecord {
        LogRecord {
            head: RecordHead { checksum: 0, uuid: 7, timestamp: LogTimestamp::new(1_700_000_000, 0) },
            data: LogRecordData::FaultWithoutId {
                source: LogSourceId::MotorControl,
                category: LogCategoryId::Fault,
                event_code: LogEventCode::OverSpeed,
            },
        }
    }

    fn se() -> Arc<SeSession> {
        Arc::new(SeSession::open(Box::new(EphemeralTransport::new([7u8; 32]))).unwrap())
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_round_trips() {
        let se = se();
        let record = sample();
        let enc = encrypt_record(&se, &record).await.unwrap();
        let decrypted = decrypt_record(&se, &enc).await.unwrap();
        assert_eq!(decrypted.data, record.data);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let se = se();
        let mut enc = encrypt_record(&se, &sample()).await.unwrap();
        let last = enc.signature.len() - 1;
        enc.signature[last] ^= 0xFF;
        assert_eq!(decrypt_record(&se, &enc).await.unwrap_err(), QmcError::SignatureInvalid);
    }
}
