use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use qmc_datahub::{DataHub, MotorId};
use qmc_fault::SystemEventSink;
use qmc_log::{LogService, ShutdownReason};

use crate::snvs::{FwState, SnvsLpGpr};
use crate::state::{LifecycleState, SystemStatus};

/// The lifecycle / power-loss / watchdog orchestrator (spec §4.9, C9):
/// owns the `SystemStatus` lifecycle bits, the SNVS-LP-GPR boot handoff,
/// and the power-loss/watchdog-reset shutdown path. Wired by `qmc-app`
/// as the concrete `SystemEventSink` the fault dispatcher (C3) drives,
/// and as the entry point `qmc-iface` (C10) calls from the authenticated
/// `/system` REST handler.
pub struct LifecycleOrchestrator {
    status: Arc<SystemStatus>,
    snvs: Arc<dyn SnvsLpGpr>,
    datahub: Arc<DataHub>,
    log: Arc<LogService>,
    decommissioned: AtomicBool,
}

impl LifecycleOrchestrator {
    pub fn new(status: Arc<SystemStatus>, snvs: Arc<dyn SnvsLpGpr>, datahub: Arc<DataHub>, log: Arc<LogService>) -> Arc<Self> {
        Arc::new(Self { status, snvs, datahub, log, decommissioned: AtomicBool::new(false) })
    }

    pub fn status(&self) -> Arc<SystemStatus> {
        self.status.clone()
    }

    /// Runs once at startup (spec §4.9): `Commissioning` by default,
    /// unless the secondary bootloader handed off `AwdtExpired`, in
    /// which case the app boots straight into `Maintenance` so a
    /// technician can investigate before anything is allowed to run.
    pub fn boot(&self) {
        let state = match self.snvs.read() {
            FwState::AwdtExpired => LifecycleState::Maintenance,
            _ => LifecycleState::Commissioning,
        };
        info!(?state, "lifecycle boot");
        self.status.set_lifecycle(state);
    }

    fn transition_to_error_if_operational(&self) {
        if self.status.lifecycle() == LifecycleState::Operational {
            warn!("fault observed during Operational, forcing Error lifecycle");
            self.status.set_lifecycle(LifecycleState::Error);
        }
    }

    /// `Error → Maintenance` (spec §4.9): only reachable via an
    /// authenticated REST call by a Maintenance-role user — `qmc-iface`
    /// is responsible for the authentication check before calling this.
    /// Entry unfreezes every motor, since a faulted motor is left frozen
    /// until a human actively releases it.
    pub fn error_to_maintenance(&self) -> bool {
        if self.status.lifecycle() != LifecycleState::Error {
            return false;
        }
        self.status.set_lifecycle(LifecycleState::Maintenance);
        for motor in MotorId::all() {
            self.datahub.unfreeze_motor(motor);
        }
        info!("lifecycle Error -> Maintenance, all motors unfrozen");
        true
    }

    /// `Maintenance → Operational` (spec §4.9): only reachable via an
    /// authenticated REST call.
    pub fn maintenance_to_operational(&self) -> bool {
        if self.status.lifecycle() != LifecycleState::Maintenance {
            return false;
        }
        self.status.set_lifecycle(LifecycleState::Operational);
        info!("lifecycle Maintenance -> Operational");
        true
    }

    /// `Commissioning → Operational`: the provisioning-complete
    /// transition, reachable the same way as `Maintenance → Operational`
    /// once the initial user/config setup has run.
    pub fn commissioning_to_operational(&self) -> bool {
        if self.status.lifecycle() != LifecycleState::Commissioning {
            return false;
        }
        self.status.set_lifecycle(LifecycleState::Operational);
        info!("lifecycle Commissioning -> Operational");
        true
    }

    /// Decommissioning is terminal (spec §4.9): it triggers SE key
    /// revocation via the SBL on next boot — out of scope hardware per
    /// spec.md §1, so this only flips the lifecycle bit and the
    /// `FwState` flag the SBL inspects; the caller is expected to
    /// request a reset immediately afterward.
    pub fn decommission(&self) -> bool {
        if self.decommissioned.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.status.set_lifecycle(LifecycleState::Decommissioning);
        self.snvs.write(FwState::Revert);
        warn!("lifecycle Decommissioning entered, SE key revocation deferred to SBL");
        true
    }

    /// Power-loss ISR path (spec §4.9/§4.5): sets the shutdown bit,
    /// signals the log task, stops every motor, and drains the log
    /// queue once into flash with no export. The caller is expected to
    /// request a reset immediately afterward — this function never
    /// returns "normally" on the real target.
    pub async fn power_loss(&self) {
        self.status.events().set(crate::state::BIT_SHUTDOWN_POWER_LOSS);
        self.log.shutdown_drain(ShutdownReason::PowerLoss).await;
    }

    /// Secure-watchdog reset path (spec §4.5): same drain sequence as
    /// `power_loss`, tagged with the watchdog reset reason.
    pub async fn watchdog_reset(&self) {
        self.status.events().set(crate::state::BIT_SHUTDOWN_WATCHDOG_RESET);
        self.log.shutdown_drain(ShutdownReason::WatchdogReset).await;
    }
}

impl SystemEventSink for LifecycleOrchestrator {
    fn set_motor_fault_bit(&self, motor_id: MotorId) {
        self.status.set_motor_fault(motor_id);
        self.transition_to_error_if_operational();
    }

    fn clear_motor_fault_bit(&self, motor_id: MotorId) {
        self.status.clear_motor_fault(motor_id);
    }

    fn set_system_fault_bit(&self) {
        self.status.set_system_fault();
        self.transition_to_error_if_operational();
    }

    fn clear_system_fault_bit(&self) {
        self.status.clear_system_fault();
    }

    fn force_error_lifecycle(&self) {
        self.status.set_lifecycle(LifecycleState::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snvs::MemSnvs;
    use qmc_datahub::SimulatedMotorControl;
    use qmc_log::{FlashRecorder, MemSdCard, MemSectorDevice, NoopShutdownSink, RingStore};
    use qmc_se::{EphemeralTransport, SeSession};

    fn orchestrator(initial: FwState) -> Arc<LifecycleOrchestrator> {
        let status = Arc::new(SystemStatus::new());
        let snvs: Arc<dyn SnvsLpGpr> = Arc::new(MemSnvs::new(initial));
        let datahub = DataHub::new(Arc::new(SimulatedMotorControl::default()));
        let info = RingStore::new(Box::new(MemSectorDevice::new(128, 2)), 0, 2).unwrap();
        let payload = RingStore::new(Box::new(MemSectorDevice::new(128, 2)), 0, 2).unwrap();
        let se = Arc::new(SeSession::open(Box::new(EphemeralTransport::new([1u8; 32]))).unwrap());
        let sd = Arc::new(MemSdCard::new(false, 4096, 4));
        let log = LogService::new(FlashRecorder::new(info, payload), se, sd, Arc::new(NoopShutdownSink));
        LifecycleOrchestrator::new(status, snvs, datahub, log)
    }

    #[test]
    fn boot_defaults_to_commissioning() {
        let orch = orchestrator(FwState::None);
        orch.boot();
        assert_eq!(orch.status().lifecycle(), LifecycleState::Commissioning);
    }

    #[test]
    fn boot_enters_maintenance_on_awdt_expired_handoff() {
        let orch = orchestrator(FwState::AwdtExpired);
        orch.boot();
        assert_eq!(orch.status().lifecycle(), LifecycleState::Maintenance);
    }

    #[test]
    fn fault_during_operational_forces_error() {
        let orch = orchestrator(FwState::None);
        orch.status().set_lifecycle(LifecycleState::Operational);
        orch.set_motor_fault_bit(MotorId::new(0).unwrap());
        assert_eq!(orch.status().lifecycle(), LifecycleState::Error);
    }

    #[test]
    fn fault_outside_operational_does_not_force_error() {
        let orch = orchestrator(FwState::None);
        orch.status().set_lifecycle(LifecycleState::Commissioning);
        orch.set_system_fault_bit();
        assert_eq!(orch.status().lifecycle(), LifecycleState::Commissioning);
    }

    #[test]
    fn error_to_maintenance_unfreezes_motors_and_requires_error_state() {
        let orch = orchestrator(FwState::None);
        orch.status().set_lifecycle(LifecycleState::Commissioning);
        assert!(!orch.error_to_maintenance());
        orch.status().set_lifecycle(LifecycleState::Error);
        assert!(orch.error_to_maintenance());
        assert_eq!(orch.status().lifecycle(), LifecycleState::Maintenance);
    }

    #[test]
    fn decommission_is_terminal_and_idempotent() {
        let orch = orchestrator(FwState::None);
        assert!(orch.decommission());
        assert_eq!(orch.status().lifecycle(), LifecycleState::Decommissioning);
        assert!(!orch.decommission());
    }

    #[tokio::test]
    async fn power_loss_sets_bit_and_drains_log() {
        let orch = orchestrator(FwState::None);
        orch.power_loss().await;
        assert_eq!(orch.status().raw() & crate::state::BIT_SHUTDOWN_POWER_LOSS, crate::state::BIT_SHUTDOWN_POWER_LOSS);
    }
}
