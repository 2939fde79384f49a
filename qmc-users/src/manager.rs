use std::sync::Arc;

use tokio::sync::Mutex;

use qmc_config::{ConfigKey, ConfigStore, MAX_USER_SLOTS};
use qmc_kernel::error::{QmcError, QmcResult};
use qmc_se::SeSession;

use crate::policy::{name_is_valid, passphrase_satisfies_policy};
use crate::sinks::{NoopUserEventSink, UserEventSink};
use crate::token::{decode, encode};
use crate::types::{
    Role, UserConfig, UserSession, HISTORY_HASH_COUNT, LOCKOUT_DURATION_SECS, MAX_SESSIONS, MIN_PASSPHRASE_ITERATIONS,
    RESERVED_SESSIONS, SALT_LENGTH, USER_NAME_MAX_LENGTH, USER_SECRET_LENGTH,
};

/// Spec §4.7, C7: users and sessions layered on top of C6's
/// `ConfigStore` (`User*`/`UserHashes*` cells) and C8's `SeSession`
/// (PBKDF2 hashing, session-secret RNG, JWT-like HMAC signing).
pub struct UserManager {
    config: Arc<ConfigStore>,
    se: Arc<SeSession>,
    sessions: Mutex<[Option<UserSession>; MAX_SESSIONS]>,
    events: Arc<dyn UserEventSink>,
}

impl UserManager {
    pub fn new(config: Arc<ConfigStore>, se: Arc<SeSession>) -> Arc<Self> {
        Self::with_event_sink(config, se, Arc::new(NoopUserEventSink))
    }

    pub fn with_event_sink(config: Arc<ConfigStore>, se: Arc<SeSession>, events: Arc<dyn UserEventSink>) -> Arc<Self> {
        Arc::new(Self { config, se, sessions: Mutex::new(std::array::from_fn(|_| None)), events })
    }

    async fn read_slot(&self, uid: u8) -> QmcResult<UserConfig> {
        let bytes = self.config.get_bin(ConfigKey::User(uid)).await?;
        Ok(deserialize_user_config(&bytes))
    }

    async fn write_slot(&self, uid: u8, user: &UserConfig) -> QmcResult<()> {
        self.config.set_bin(ConfigKey::User(uid), &serialize_user_config(user)).await?;
        self.config.update_flash().await
    }

    async fn read_history(&self, uid: u8) -> QmcResult<Vec<[u8; USER_SECRET_LENGTH]>> {
        let bytes = self.config.get_bin(ConfigKey::UserHashes(uid)).await?;
        Ok(deserialize_history(&bytes))
    }

    async fn write_history(&self, uid: u8, history: &[[u8; USER_SECRET_LENGTH]]) -> QmcResult<()> {
        self.config.set_bin(ConfigKey::UserHashes(uid), &serialize_history(history)).await?;
        self.config.update_flash().await
    }

    async fn find_by_name(&self, name: &str) -> Option<(u8, UserConfig)> {
        for uid in 1..=MAX_USER_SLOTS {
            if let Ok(user) = self.read_slot(uid).await {
                if user.is_occupied() && user.name == name {
                    return Some((uid, user));
                }
            }
        }
        None
    }

    async fn hash_passphrase(&self, passphrase: &str, salt: &[u8], iterations: u32) -> QmcResult<[u8; USER_SECRET_LENGTH]> {
        let hash = self.se.pbkdf2_sha256(passphrase.as_bytes(), salt, iterations, USER_SECRET_LENGTH).await?;
        hash.try_into().map_err(|_| QmcError::Internal)
    }

    /// `USRMGMT_AddUser` (spec §4.7): creates in the first empty slot.
    pub async fn user_add(&self, name: &str, passphrase: &str, role: Role) -> QmcResult<u8> {
        if !name_is_valid(name) || name.len() > USER_NAME_MAX_LENGTH {
            return Err(QmcError::OutOfRange);
        }
        if !passphrase_satisfies_policy(passphrase) {
            return Err(QmcError::ArgInvalid);
        }
        if self.find_by_name(name).await.is_some() {
            return Err(QmcError::ArgInvalid);
        }

        let mut target = None;
        for uid in 1..=MAX_USER_SLOTS {
            let slot = self.read_slot(uid).await?;
            if !slot.is_occupied() {
                target = Some(uid);
                break;
            }
        }
        let uid = target.ok_or(QmcError::NoMem)?;

        let salt: [u8; SALT_LENGTH] = self.se.random(SALT_LENGTH).await?.try_into().map_err(|_| QmcError::Internal)?;
        let secret = self.hash_passphrase(passphrase, &salt, MIN_PASSPHRASE_ITERATIONS).await?;
        let user = UserConfig {
            name: name.to_string(),
            role,
            lockout_timestamp: 0,
            iterations: MIN_PASSPHRASE_ITERATIONS,
            salt,
            secret,
            validity_timestamp: u64::MAX,
        };
        self.write_slot(uid, &user).await?;
        self.write_history(uid, &[]).await?;
        self.events.user_created(name);
        Ok(uid)
    }

    /// `USRMGMT_UpdateUser`: rejects passphrase reuse against the
    /// current secret and the `HISTORY_HASH_COUNT` prior hashes (spec
    /// §4.7 "Password history").
    pub async fn user_update(&self, uid: u8, passphrase: &str, role: Role) -> QmcResult<()> {
        if !(1..=MAX_USER_SLOTS).contains(&uid) {
            return Err(QmcError::ArgInvalid);
        }
        let mut user = self.read_slot(uid).await?;
        if !user.is_occupied() {
            return Err(QmcError::ArgInvalid);
        }
        if !passphrase_satisfies_policy(passphrase) {
            return Err(QmcError::ArgInvalid);
        }

        let candidate = self.hash_passphrase(passphrase, &user.salt, user.iterations).await?;
        if constant_time_eq(&candidate, &user.secret) {
            return Err(QmcError::ArgInvalid);
        }
        let history = self.read_history(uid).await?;
        for prior in &history {
            if constant_time_eq(&candidate, prior) {
                return Err(QmcError::ArgInvalid);
            }
        }

        let mut new_history = history;
        new_history.push(user.secret);
        while new_history.len() > HISTORY_HASH_COUNT {
            new_history.remove(0);
        }

        let salt: [u8; SALT_LENGTH] = self.se.random(SALT_LENGTH).await?.try_into().map_err(|_| QmcError::Internal)?;
        user.salt = salt;
        user.secret = self.hash_passphrase(passphrase, &salt, MIN_PASSPHRASE_ITERATIONS).await?;
        user.iterations = MIN_PASSPHRASE_ITERATIONS;
        user.role = role;
        self.write_slot(uid, &user).await?;
        self.write_history(uid, &new_history).await?;
        self.events.user_updated(&user.name);
        Ok(())
    }

    /// `USRMGMT_RemoveUser`: marks the slot `Role::Empty`.
    pub async fn user_remove(&self, name: &str) -> QmcResult<()> {
        let (uid, _) = self.find_by_name(name).await.ok_or(QmcError::ArgInvalid)?;
        self.write_slot(uid, &UserConfig::empty_slot()).await?;
        self.write_history(uid, &[]).await?;
        self.events.user_removed(name);
        Ok(())
    }

    pub async fn user_lock(&self, name: &str, reactivation_timestamp: u64) -> QmcResult<()> {
        let (uid, mut user) = self.find_by_name(name).await.ok_or(QmcError::ArgInvalid)?;
        user.lockout_timestamp = reactivation_timestamp;
        self.write_slot(uid, &user).await
    }

    pub async fn user_unlock(&self, name: &str) -> QmcResult<()> {
        let (uid, mut user) = self.find_by_name(name).await.ok_or(QmcError::ArgInvalid)?;
        user.lockout_timestamp = 0;
        self.write_slot(uid, &user).await
    }

    /// Checks a passphrase against the named account's stored hash,
    /// applying the spec §4.7 lockout state machine, without creating a
    /// session — the Rust shape of the original's "no out-params
    /// provided" path ("only the passphrase is checked, no session is
    /// created").
    pub async fn check_passphrase(&self, name: &str, passphrase: &str, now: u64) -> QmcResult<(u8, UserConfig)> {
        let (uid, user) = self.find_by_name(name).await.ok_or(QmcError::ArgInvalid)?;
        self.authenticate(uid, &user, passphrase, now).await?;
        Ok((uid, user))
    }

    /// Runs the lockout-aware verification path shared by
    /// `check_passphrase` and `user_create_session`. Maintenance
    /// accounts bypass the validity-expiration check so recovery stays
    /// possible with an unset RTC (spec §4.7).
    ///
    /// The account locks on the very first failed attempt, not once some
    /// trial counter is exhausted: `lockout_timestamp` is the sole lock
    /// state, so it is set (and `AccountSuspended` logged) the moment a
    /// wrong passphrase is seen against an unlocked account. Every later
    /// attempt made while `lockout_timestamp > now` returns `Busy`
    /// without touching the hash or the log, matching spec §8 scenario
    /// 2's "no further `LoginFailure` logs during the lockout window".
    async fn authenticate(&self, uid: u8, user: &UserConfig, passphrase: &str, now: u64) -> QmcResult<()> {
        if user.lockout_timestamp > now {
            return Err(QmcError::Busy);
        }

        if user.role != Role::Maintenance && user.validity_timestamp < now {
            return Err(QmcError::ArgInvalid);
        }

        let candidate = self.hash_passphrase(passphrase, &user.salt, user.iterations).await?;
        if constant_time_eq(&candidate, &user.secret) {
            if user.lockout_timestamp != 0 {
                let mut cleared = user.clone();
                cleared.lockout_timestamp = 0;
                self.write_slot(uid, &cleared).await?;
                self.events.account_resumed(&user.name);
            }
            return Ok(());
        }

        self.events.login_failure(&user.name);
        self.events.account_suspended(&user.name);
        self.user_lock_internal(uid, now + LOCKOUT_DURATION_SECS).await?;
        Err(QmcError::ArgInvalid)
    }

    async fn user_lock_internal(&self, uid: u8, reactivation_timestamp: u64) -> QmcResult<()> {
        let mut user = self.read_slot(uid).await?;
        user.lockout_timestamp = reactivation_timestamp;
        self.write_slot(uid, &user).await
    }

    /// `USRMGMT_CreateSession`: on success, allocates a session slot,
    /// reserving `0..RESERVED_SESSIONS` for `Role::Maintenance` (spec
    /// §3 `UserSession` invariant) and evicting any existing session for
    /// the same `uid` ("only one session per uid exists").
    pub async fn user_create_session(
        &self,
        name: &str,
        passphrase: &str,
        now: u64,
        session_duration_secs: u64,
        device_id: &str,
    ) -> QmcResult<(String, UserSession)> {
        let (uid, user) = self.find_by_name(name).await.ok_or(QmcError::ArgInvalid)?;
        self.authenticate(uid, &user, passphrase, now).await?;

        let mut sessions = self.sessions.lock().await;
        for slot in sessions.iter_mut() {
            if slot.as_ref().map(|s| s.uid) == Some(uid) {
                *slot = None;
            }
        }

        let sid = if user.role == Role::Maintenance {
            (0..RESERVED_SESSIONS).find(|i| sessions[*i].is_none()).ok_or(QmcError::NoMem)?
        } else {
            (RESERVED_SESSIONS..MAX_SESSIONS).find(|i| sessions[*i].is_none()).ok_or(QmcError::NoMem)?
        };

        let session_secret: [u8; 32] = self.se.random(32).await?.try_into().map_err(|_| QmcError::Internal)?;
        let exp = now + session_duration_secs;
        let session = UserSession { sid: sid as i32, uid, role: user.role, iat: now, exp, session_secret };

        let token = encode(&self.se, sid as i32, now, exp, user.role, device_id, name, &session_secret).await?;
        sessions[sid] = Some(session.clone());
        drop(sessions);
        self.events.user_login(name);
        Ok((token.text, session))
    }

    /// `USRMGMT_EndSession`.
    pub async fn user_end_session(&self, _acting_sid: i32, sid: i32) -> QmcResult<()> {
        if !(0..MAX_SESSIONS as i32).contains(&sid) {
            return Err(QmcError::ArgInvalid);
        }
        let mut sessions = self.sessions.lock().await;
        let ended = sessions[sid as usize].take();
        drop(sessions);
        if let Some(session) = ended {
            if let Some((_, user)) = self.find_by_uid(session.uid).await {
                self.events.user_logout(&user.name);
            }
        }
        Ok(())
    }

    async fn find_by_uid(&self, uid: u8) -> Option<(u8, UserConfig)> {
        let user = self.read_slot(uid).await.ok()?;
        user.is_occupied().then_some((uid, user))
    }

    /// `USRMGMT_ValidateSession` (spec §4.7 "Validation").
    pub async fn user_validate_session(&self, token: &str, now: u64) -> QmcResult<UserSession> {
        let mut sessions = self.sessions.lock().await;
        timeout_sessions(&mut sessions, now);

        // The session secret needed to verify the signature belongs to
        // the very session the token claims, so every candidate slot is
        // tried until one verifies against the claimed `kid`.
        for slot in sessions.iter().flatten() {
            if let Ok(decoded) = decode(&self.se, token, &slot.session_secret).await {
                if decoded.sid == slot.sid {
                    if decoded.exp != slot.exp {
                        return Err(QmcError::ArgInvalid);
                    }
                    return Ok(slot.clone());
                }
            }
        }
        Err(QmcError::ArgInvalid)
    }

    /// `USRMGMT_IterateUsers`, reshaped into an `Iterator`-returning
    /// method rather than the original's caller-supplied cursor.
    pub async fn users(&self) -> Vec<(u8, UserConfig)> {
        let mut out = Vec::new();
        for uid in 1..=MAX_USER_SLOTS {
            if let Ok(user) = self.read_slot(uid).await {
                if user.is_occupied() {
                    out.push((uid, user));
                }
            }
        }
        out
    }

    /// `USRMGMT_IterateSessions`: times out every slot first, so an
    /// expired session is evicted from the table (not merely skipped)
    /// and stops showing up in the listing from this call on.
    pub async fn sessions(&self, now: u64) -> Vec<UserSession> {
        let mut sessions = self.sessions.lock().await;
        timeout_sessions(&mut sessions, now);
        sessions.iter().flatten().cloned().collect()
    }
}

/// `USRMGMT_TimeoutSession` applied across the whole slot table: clears
/// any slot whose `exp` has passed.
fn timeout_sessions(sessions: &mut [Option<UserSession>; MAX_SESSIONS], now: u64) {
    for slot in sessions.iter_mut() {
        if slot.as_ref().is_some_and(|s| s.exp <= now) {
            *slot = None;
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

fn serialize_user_config(user: &UserConfig) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + USER_NAME_MAX_LENGTH + 2 + 8 + 4 + SALT_LENGTH + USER_SECRET_LENGTH + 8);
    let name_bytes = user.name.as_bytes();
    out.push(name_bytes.len() as u8);
    let mut name_field = vec![0u8; USER_NAME_MAX_LENGTH];
    name_field[..name_bytes.len()].copy_from_slice(name_bytes);
    out.extend_from_slice(&name_field);
    out.extend_from_slice(&(user.role as u16).to_be_bytes());
    out.extend_from_slice(&user.lockout_timestamp.to_be_bytes());
    out.extend_from_slice(&user.iterations.to_be_bytes());
    out.extend_from_slice(&user.salt);
    out.extend_from_slice(&user.secret);
    out.extend_from_slice(&user.validity_timestamp.to_be_bytes());
    out
}

fn deserialize_user_config(bytes: &[u8]) -> UserConfig {
    let expected_len = 1 + USER_NAME_MAX_LENGTH + 2 + 8 + 4 + SALT_LENGTH + USER_SECRET_LENGTH + 8;
    if bytes.len() < expected_len {
        return UserConfig::empty_slot();
    }
    let mut pos = 0;
    let name_len = (bytes[pos] as usize).min(USER_NAME_MAX_LENGTH);
    pos += 1;
    let name = String::from_utf8_lossy(&bytes[pos..pos + name_len]).to_string();
    pos += USER_NAME_MAX_LENGTH;
    let role = Role::from_u16(u16::from_be_bytes(bytes[pos..pos + 2].try_into().unwrap())).unwrap_or(Role::Empty);
    pos += 2;
    let lockout_timestamp = u64::from_be_bytes(bytes[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let iterations = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
    pos += 4;
    let salt: [u8; SALT_LENGTH] = bytes[pos..pos + SALT_LENGTH].try_into().unwrap();
    pos += SALT_LENGTH;
    let secret: [u8; USER_SECRET_LENGTH] = bytes[pos..pos + USER_SECRET_LENGTH].try_into().unwrap();
    pos += USER_SECRET_LENGTH;
    let validity_timestamp = u64::from_be_bytes(bytes[pos..pos + 8].try_into().unwrap());

    UserConfig { name, role, lockout_timestamp, iterations, salt, secret, validity_timestamp }
}

fn serialize_history(history: &[[u8; USER_SECRET_LENGTH]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HISTORY_HASH_COUNT * USER_SECRET_LENGTH);
    for hash in history.iter().rev().take(HISTORY_HASH_COUNT) {
        out.extend_from_slice(hash);
    }
    while out.len() < HISTORY_HASH_COUNT * USER_SECRET_LENGTH {
        out.push(0);
    }
    out
}

fn deserialize_history(bytes: &[u8]) -> Vec<[u8; USER_SECRET_LENGTH]> {
    let mut out = Vec::new();
    for chunk in bytes.chunks(USER_SECRET_LENGTH) {
        if chunk.len() == USER_SECRET_LENGTH && chunk.iter().any(|&b| b != 0) {
            out.push(chunk.try_into().unwrap());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use qmc_config::MemFlash;
    use qmc_se::EphemeralTransport;

    #[derive(Default)]
    struct SpyEventSink {
        login_failures: StdMutex<Vec<String>>,
        account_suspensions: StdMutex<Vec<String>>,
    }

    impl UserEventSink for SpyEventSink {
        fn user_created(&self, _name: &str) {}
        fn user_updated(&self, _name: &str) {}
        fn user_removed(&self, _name: &str) {}
        fn user_login(&self, _name: &str) {}
        fn user_logout(&self, _name: &str) {}
        fn login_failure(&self, name: &str) {
            self.login_failures.lock().unwrap().push(name.to_string());
        }
        fn account_suspended(&self, name: &str) {
            self.account_suspensions.lock().unwrap().push(name.to_string());
        }
        fn account_resumed(&self, _name: &str) {}
    }

    fn manager() -> Arc<UserManager> {
        let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new([5u8; 32]))).unwrap());
        let config = Arc::new(ConfigStore::new(se.clone(), Box::new(MemFlash::new(4096, 1))));
        UserManager::new(config, se)
    }

    const GOOD_PASS: &str = "Abcdefg123!";

    #[tokio::test]
    async fn add_then_authenticate_succeeds() {
        let mgr = manager();
        let uid = mgr.user_add("alice", GOOD_PASS, Role::Operator).await.unwrap();
        assert!(mgr.check_passphrase("alice", GOOD_PASS, 0).await.is_ok());
        assert_eq!(uid, 1);
    }

    #[tokio::test]
    async fn weak_passphrase_is_rejected_at_add() {
        let mgr = manager();
        assert_eq!(mgr.user_add("bob", "weak", Role::Operator).await.unwrap_err(), QmcError::ArgInvalid);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let mgr = manager();
        mgr.user_add("carol", GOOD_PASS, Role::Operator).await.unwrap();
        assert_eq!(mgr.user_add("carol", GOOD_PASS, Role::Operator).await.unwrap_err(), QmcError::ArgInvalid);
    }

    #[tokio::test]
    async fn wrong_passphrase_locks_account_on_first_failure() {
        let mgr = manager();
        mgr.user_add("dave", GOOD_PASS, Role::Operator).await.unwrap();
        assert!(mgr.check_passphrase("dave", "wrong-pass-1", 0).await.is_err());
        let err = mgr.check_passphrase("dave", GOOD_PASS, 1).await.unwrap_err();
        assert_eq!(err, QmcError::Busy);
    }

    #[tokio::test]
    async fn lock_expires_after_lockout_duration() {
        let mgr = manager();
        mgr.user_add("erin", GOOD_PASS, Role::Operator).await.unwrap();
        assert!(mgr.check_passphrase("erin", "wrong-pass-1", 0).await.is_err());
        assert_eq!(mgr.check_passphrase("erin", GOOD_PASS, 1).await.unwrap_err(), QmcError::Busy);
        let now_after_lockout = LOCKOUT_DURATION_SECS + 1;
        assert!(mgr.check_passphrase("erin", GOOD_PASS, now_after_lockout).await.is_ok());
    }

    /// Spec §8 scenario 2: five wrong logins against the same account
    /// produce exactly one `login_failure` + one `account_suspended`,
    /// every attempt made during the lockout window returns `Busy` with
    /// no further logging, and a correct passphrase succeeds once the
    /// lockout has elapsed.
    #[tokio::test]
    async fn repeated_wrong_logins_log_suspension_exactly_once() {
        let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new([5u8; 32]))).unwrap());
        let config = Arc::new(ConfigStore::new(se.clone(), Box::new(MemFlash::new(4096, 1))));
        let spy = Arc::new(SpyEventSink::default());
        let mgr = UserManager::with_event_sink(config, se, spy.clone());
        mgr.user_add("pat", GOOD_PASS, Role::Operator).await.unwrap();

        assert!(mgr.check_passphrase("pat", "wrong-pass-1", 0).await.is_err());
        for attempt in 1..5 {
            assert_eq!(mgr.check_passphrase("pat", "wrong-pass-1", attempt).await.unwrap_err(), QmcError::Busy);
        }

        assert_eq!(spy.login_failures.lock().unwrap().len(), 1);
        assert_eq!(spy.account_suspensions.lock().unwrap().len(), 1);

        let now_after_lockout = LOCKOUT_DURATION_SECS + 1;
        assert!(mgr.check_passphrase("pat", GOOD_PASS, now_after_lockout).await.is_ok());
    }

    #[tokio::test]
    async fn update_rejects_passphrase_reuse() {
        let mgr = manager();
        let uid = mgr.user_add("frank", GOOD_PASS, Role::Operator).await.unwrap();
        assert_eq!(mgr.user_update(uid, GOOD_PASS, Role::Operator).await.unwrap_err(), QmcError::ArgInvalid);
        mgr.user_update(uid, "Different123!", Role::Operator).await.unwrap();
        assert_eq!(mgr.user_update(uid, GOOD_PASS, Role::Operator).await.unwrap_err(), QmcError::ArgInvalid);
    }

    #[tokio::test]
    async fn create_and_validate_session_round_trips() {
        let mgr = manager();
        mgr.user_add("grace", GOOD_PASS, Role::Operator).await.unwrap();
        let (token, session) = mgr.user_create_session("grace", GOOD_PASS, 100, 3600, "device-1").await.unwrap();
        let validated = mgr.user_validate_session(&token, 200).await.unwrap();
        assert_eq!(validated.sid, session.sid);
        assert_eq!(validated.uid, session.uid);
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let mgr = manager();
        mgr.user_add("heidi", GOOD_PASS, Role::Operator).await.unwrap();
        let (token, _) = mgr.user_create_session("heidi", GOOD_PASS, 0, 10, "device-1").await.unwrap();
        assert!(mgr.user_validate_session(&token, 20).await.is_err());
    }

    #[tokio::test]
    async fn maintenance_sessions_use_reserved_slots() {
        let mgr = manager();
        mgr.user_add("ivan", GOOD_PASS, Role::Maintenance).await.unwrap();
        let (_, session) = mgr.user_create_session("ivan", GOOD_PASS, 0, 3600, "device-1").await.unwrap();
        assert!((session.sid as usize) < RESERVED_SESSIONS);
    }

    #[tokio::test]
    async fn end_session_clears_slot() {
        let mgr = manager();
        mgr.user_add("judy", GOOD_PASS, Role::Operator).await.unwrap();
        let (_, session) = mgr.user_create_session("judy", GOOD_PASS, 0, 3600, "device-1").await.unwrap();
        mgr.user_end_session(session.sid, session.sid).await.unwrap();
        assert!(mgr.sessions(0).await.is_empty());
    }

    /// Spec §8 scenario 6: once `now` passes a session's `exp`, it is
    /// evicted from the slot table, not just hidden — the session is
    /// gone from `sessions()` for good, not merely filtered per call.
    #[tokio::test]
    async fn expired_session_is_evicted_from_listing() {
        let mgr = manager();
        mgr.user_add("quinn", GOOD_PASS, Role::Operator).await.unwrap();
        mgr.user_create_session("quinn", GOOD_PASS, 0, 10, "device-1").await.unwrap();
        assert_eq!(mgr.sessions(5).await.len(), 1);
        assert!(mgr.sessions(20).await.is_empty());
        assert!(mgr.sessions(0).await.is_empty());
    }

    #[tokio::test]
    async fn remove_then_readd_reuses_freed_slot() {
        let mgr = manager();
        let uid = mgr.user_add("mallory", GOOD_PASS, Role::Operator).await.unwrap();
        mgr.user_remove("mallory").await.unwrap();
        assert!(mgr.users().await.is_empty());
        let new_uid = mgr.user_add("oscar", GOOD_PASS, Role::Operator).await.unwrap();
        assert_eq!(new_uid, uid);
    }
}
