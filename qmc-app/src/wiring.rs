use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use qmc_board::BoardService;
use qmc_config::{ConfigStore, MemFlash};
use qmc_datahub::{DataHub, SimulatedMotorControl};
use qmc_fault::FaultDispatcher;
use qmc_iface::AppState;
use qmc_lifecycle::{FileSnvs, LifecycleOrchestrator, SystemStatus};
use qmc_log::{FileSectorDevice, FlashRecorder, LogService, MemSdCard, NoopShutdownSink, RingStore};
use qmc_se::{EphemeralTransport, SeSession};

use crate::cli::Cli;
use crate::sinks::{DataHubLogSink, LifecycleSystemEventSink, LogFaultSink, SimulatedBoardTransport};

/// Log-ring layout (spec §4.5): one sector per record for the small
/// info ring, 64 sectors for the payload ring — generous for a
/// developer rig, nowhere near the flash part's real capacity.
const LOG_SECTOR_SIZE: usize = 512;
const LOG_INFO_SECTORS: usize = 4;
const LOG_PAYLOAD_SECTORS: usize = 64;

const CONFIG_SECTOR_SIZE: usize = 4096;
const CONFIG_SECTOR_COUNT: usize = 4;

/// Everything `main` needs to run the process: the REST/MQTT-facing
/// `AppState` plus the handles to every background task this binary
/// spawns.
pub struct Wired {
    pub state: AppState,
    pub datahub: Arc<DataHub>,
    pub faults: Arc<FaultDispatcher>,
    pub board: Arc<BoardService>,
    pub log: Arc<LogService>,
    pub lifecycle: Arc<LifecycleOrchestrator>,
}

/// Deterministic placeholder device-uid derivation: real hardware reads
/// this from the SE051 part itself (`se_get_uid`, out of scope per
/// spec.md §1). Folding the device id's bytes across a 32-byte buffer
/// keeps the simulated SE session's key material stable across restarts
/// for a given `--device-id`, which `ConfigStore`'s flash round trip
/// depends on.
fn placeholder_uid(device_id: &str) -> [u8; 32] {
    let mut uid = [0u8; 32];
    for (i, b) in device_id.bytes().cycle().take(32).enumerate() {
        uid[i] = b ^ (i as u8);
    }
    uid
}

/// Builds the whole dependency graph (spec §1's C1-C10 layering): each
/// crate is constructed from the ones below it, with the out-of-scope
/// hardware seams (SE051 transport, SNVS-LP-GPR register, config/log
/// flash, SD card, board SPI/AFE/GD3000) wired to file-backed or
/// in-memory stand-ins under `--state-dir`.
pub async fn wire(cli: &Cli) -> anyhow::Result<Wired> {
    std::fs::create_dir_all(&cli.state_dir)?;

    let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new(placeholder_uid(&cli.device_id))))?);

    let config_flash = Box::new(MemFlash::new(CONFIG_SECTOR_SIZE, CONFIG_SECTOR_COUNT));
    let config = Arc::new(ConfigStore::new(se.clone(), config_flash));
    if let Err(e) = config.load_from_flash().await {
        warn!(error = %e, "config flash load failed, starting from defaults");
    }

    let info_device = Box::new(FileSectorDevice::open(&cli.state_dir.join("log-info.bin"), LOG_SECTOR_SIZE, LOG_INFO_SECTORS)?);
    let payload_device = Box::new(FileSectorDevice::open(&cli.state_dir.join("log-payload.bin"), LOG_SECTOR_SIZE, LOG_PAYLOAD_SECTORS)?);
    let info_ring = RingStore::new(info_device, 0, LOG_INFO_SECTORS)?;
    let payload_ring = RingStore::new(payload_device, 0, LOG_PAYLOAD_SECTORS)?;
    let sd = Arc::new(MemSdCard::new(false, 16 * 1024 * 1024, 8));
    let log = LogService::new(FlashRecorder::new(info_ring, payload_ring), se.clone(), sd, Arc::new(NoopShutdownSink));

    let mc = Arc::new(SimulatedMotorControl::default());
    let datahub = DataHub::with_fault_sink(mc, DataHubLogSink::new(log.clone()));

    let status = Arc::new(SystemStatus::new());
    let snvs = Arc::new(FileSnvs::open(&cli.state_dir.join("snvs-lpgpr.bin"))?);
    let lifecycle = LifecycleOrchestrator::new(status, snvs, datahub.clone(), log.clone());
    lifecycle.boot();

    let faults = FaultDispatcher::new(64, 64, datahub.clone(), LogFaultSink::new(log.clone()), LifecycleSystemEventSink::new(lifecycle.clone()));

    let board_transport = SimulatedBoardTransport::new();
    let board = BoardService::new(board_transport, faults.clone());

    // UserManager persists through ConfigStore's User*/UserHashes* cells, not a separate flash handle.
    let users = qmc_users::UserManager::new(config.clone(), se.clone());

    let state = AppState {
        datahub: datahub.clone(),
        faults: faults.clone(),
        board: board.clone(),
        log: log.clone(),
        config: config.clone(),
        users,
        lifecycle: lifecycle.clone(),
        device_id: cli.device_id.clone(),
        fw_version: cli.fw_version.clone(),
        session_duration_secs: cli.session_duration_secs,
    };

    info!(device_id = %cli.device_id, "qmc-app wired");
    Ok(Wired { state, datahub, faults, board, log, lifecycle })
}

/// Spawns every background task this process owns for the life of the
/// run (spec §1: DataHub's fast-loop bridge task, the fault dispatcher,
/// board polling, and the log drain loop).
pub fn spawn_background_tasks(wired: &Wired) {
    tokio::spawn(wired.datahub.clone().run(Duration::from_millis(10)));
    tokio::spawn(wired.faults.clone().run());
    tokio::spawn(wired.board.clone().run());
    tokio::spawn(wired.log.clone().run());
}
