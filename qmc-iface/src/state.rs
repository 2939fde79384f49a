use std::sync::Arc;

use qmc_board::BoardService;
use qmc_config::ConfigStore;
use qmc_datahub::DataHub;
use qmc_fault::FaultDispatcher;
use qmc_lifecycle::LifecycleOrchestrator;
use qmc_log::LogService;
use qmc_users::UserManager;

/// The shared collaborators every route handler reaches through axum's
/// `State` extractor, collected into one struct since every handler in
/// this crate needs the same set.
#[derive(Clone)]
pub struct AppState {
    pub datahub: Arc<DataHub>,
    pub faults: Arc<FaultDispatcher>,
    pub board: Arc<BoardService>,
    pub log: Arc<LogService>,
    pub config: Arc<ConfigStore>,
    pub users: Arc<UserManager>,
    pub lifecycle: Arc<LifecycleOrchestrator>,
    pub device_id: String,
    pub fw_version: String,
    pub session_duration_secs: u64,
}

/// Returns a UNIX-ish "now" in whole seconds for session/lockout
/// timestamps. The real target reads this from the RTC through a
/// clock source out of scope per spec.md §1; `qmc-app` is the only
/// caller expected to wire this to `SystemTime::now()`.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
