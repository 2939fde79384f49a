use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tracing::warn;

use qmc_datahub::{MotorId, MAX_MOTORS};
use qmc_fault::{FaultDispatcher, FaultHandlingErrorBits, FaultSource, MotorFaultBits, SystemFaultBits};
use qmc_kernel::Timer;

use crate::transport::{temperature_from_voltage, BoardTransport, Gd3000Status, SpiDevice};

/// Polling period (spec §4.4: `DELAY_MS ≈ 300 ms`).
pub const DELAY_MS: Duration = Duration::from_millis(300);

/// Every fifth iteration additionally sweeps the per-PSB AFE channels,
/// the DB sensor, and the MCU die sensor (spec §4.4).
const TEMP_SWEEP_EVERY_N_ITERATIONS: u32 = 5;

/// Degrees Celsius thresholds (spec §4.4). Not given concrete numbers by
/// the distillation; picked to be clearly above ambient so the
/// `SimulatedSensors` test double can cross them deliberately.
pub const PSB_TEMP1_THRESHOLD: f64 = 100.0;
pub const PSB_TEMP2_THRESHOLD: f64 = 100.0;
pub const DB_TEMP_THRESHOLD: f32 = 90.0;
pub const MCU_TEMP_THRESHOLD: f32 = 105.0;

struct MotorTempState {
    psb1_over: bool,
    psb2_over: bool,
}

/// The board service (spec §4.4, C4): periodic GD3000/temperature
/// polling against the `BoardTransport` seam, threshold-derived fault
/// raising through C3's `FaultDispatcher`, and the on-demand self-test.
pub struct BoardService {
    transport: Arc<dyn BoardTransport>,
    faults: Arc<FaultDispatcher>,
    last_gd3000_bits: StdMutex<[MotorFaultBits; MAX_MOTORS]>,
    last_psb_state: StdMutex<[MotorTempState; MAX_MOTORS]>,
    last_system_bits: StdMutex<SystemFaultBits>,
    init_completed: std::sync::atomic::AtomicBool,
}

impl BoardService {
    pub fn new(transport: Arc<dyn BoardTransport>, faults: Arc<FaultDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            faults,
            last_gd3000_bits: StdMutex::new([MotorFaultBits::empty(); MAX_MOTORS]),
            last_psb_state: StdMutex::new(std::array::from_fn(|_| MotorTempState { psb1_over: false, psb2_over: false })),
            last_system_bits: StdMutex::new(SystemFaultBits::empty()),
            init_completed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// The board-service task body. Runs until cancelled.
    pub async fn run(self: Arc<Self>) {
        self.init_completed.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut iteration: u32 = 0;
        loop {
            self.poll_gd3000().await;
            if iteration % TEMP_SWEEP_EVERY_N_ITERATIONS == 0 {
                self.sweep_temperatures().await;
            }
            iteration = iteration.wrapping_add(1);
            tokio::time::sleep(DELAY_MS).await;
        }
    }

    /// Spawns `run` on a periodic `Timer` instead of a free-running loop,
    /// for callers (like `qmc-app`) that prefer the kernel's timer
    /// primitive over a bespoke sleep loop. Equivalent behavior to `run`.
    pub fn start_periodic(self: Arc<Self>) -> Timer {
        let svc = self.clone();
        let iteration = Arc::new(std::sync::atomic::AtomicU32::new(0));
        Timer::start(DELAY_MS, true, move || {
            let svc = svc.clone();
            let iteration = iteration.clone();
            async move {
                svc.poll_gd3000().await;
                let i = iteration.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if i % TEMP_SWEEP_EVERY_N_ITERATIONS == 0 {
                    svc.sweep_temperatures().await;
                }
            }
        })
    }

    async fn switch(&self, device: SpiDevice, motor_id: MotorId) -> bool {
        if self.transport.select_spi_device(device).await.is_err() {
            let _ = self
                .faults
                .fault_raise(FaultSource::handling_error(FaultHandlingErrorBits::RPC_FAILURE, motor_id))
                .await;
            return false;
        }
        true
    }

    async fn poll_gd3000(&self) {
        for motor_id in MotorId::all() {
            if !self.switch(SpiDevice::MotorDriver, motor_id).await {
                continue;
            }
            let status = match self.transport.read_gd3000_status(motor_id).await {
                Ok(s) => s,
                Err(_) => continue,
            };
            let bits = gd3000_to_fault_bits(status);
            self.raise_motor_bs_delta(motor_id, bits, psb_temp_bits(&self.last_psb_state, motor_id)).await;
            if status.has_latched_fault() {
                let _ = self.transport.clear_gd3000_flags(motor_id).await;
            }
        }
    }

    async fn sweep_temperatures(&self) {
        for motor_id in MotorId::all() {
            if !self.transport.has_afe(motor_id) {
                continue;
            }
            if !self.switch(SpiDevice::Afe, motor_id).await {
                continue;
            }
            let (psb1_over, psb2_over) = match self.read_psb_temps(motor_id).await {
                Some(v) => v,
                None => continue,
            };
            {
                let mut state = self.last_psb_state.lock().unwrap();
                state[motor_id.get() as usize] = MotorTempState { psb1_over, psb2_over };
            }
            let psb_bits = psb_bits_from(psb1_over, psb2_over);
            let gd3000_bits = {
                let last = self.last_gd3000_bits.lock().unwrap();
                last[motor_id.get() as usize]
            };
            self.raise_motor_bs_delta(motor_id, gd3000_bits, psb_bits).await;
        }

        self.poll_system_temperatures().await;
    }

    async fn read_psb_temps(&self, motor_id: MotorId) -> Option<(bool, bool)> {
        let v1 = self.transport.read_afe_channel(motor_id, 0).await.ok()?;
        let v2 = self.transport.read_afe_channel(motor_id, 1).await.ok()?;
        let t1 = temperature_from_voltage(v1);
        let t2 = temperature_from_voltage(v2);
        Some((t1 > PSB_TEMP1_THRESHOLD, t2 > PSB_TEMP2_THRESHOLD))
    }

    async fn poll_system_temperatures(&self) {
        let mut bits = SystemFaultBits::empty();
        if let Ok(db_temp) = self.transport.read_db_temperature().await {
            if db_temp > DB_TEMP_THRESHOLD {
                bits |= SystemFaultBits::DB_OVER_TEMPERATURE;
            }
        }
        if let Ok(mcu_temp) = self.transport.read_mcu_temperature().await {
            if mcu_temp > MCU_TEMP_THRESHOLD {
                bits |= SystemFaultBits::MCU_OVER_TEMPERATURE;
            }
        }

        let changed = {
            let mut last = self.last_system_bits.lock().unwrap();
            let changed = *last != bits;
            *last = bits;
            changed
        };
        if changed {
            let _ = self.faults.fault_raise(FaultSource::system(bits, MotorId::new(0).unwrap())).await;
        }
    }

    /// Combines the GD3000 and PSB-temperature contributions to the
    /// board-service (BS) plane for one motor and raises a delta if it
    /// changed since last observed, per spec §4.3's "clearing resets the
    /// motor bit only when both planes are clear" rule — this crate only
    /// ever speaks for the BS half of that rule.
    async fn raise_motor_bs_delta(&self, motor_id: MotorId, gd3000_bits: MotorFaultBits, psb_bits: MotorFaultBits) {
        {
            let mut last = self.last_gd3000_bits.lock().unwrap();
            last[motor_id.get() as usize] = gd3000_bits;
        }
        let combined = gd3000_bits | psb_bits;
        let _ = self.faults.fault_raise(FaultSource::motor_bs(motor_id, combined)).await;
    }

    /// Self-test (spec §4.4): invoked at boot and on demand.
    pub async fn self_test(&self) -> bool {
        let no_faults = self.faults.fault_get_system_fault().is_clear();
        let init_ok = self.init_completed.load(std::sync::atomic::Ordering::SeqCst);
        let mut afes_ok = true;
        for motor_id in MotorId::all() {
            if self.transport.has_afe(motor_id) && self.transport.init_afe(motor_id).await.is_err() {
                afes_ok = false;
            }
        }
        let db_ok = self.transport.read_db_temperature().await.is_ok();
        let se_ok = self.transport.is_se_initialized() && !self.transport.se_uid().is_empty();

        let ok = no_faults && init_ok && afes_ok && db_ok && se_ok;
        if !ok {
            warn!(no_faults, init_ok, afes_ok, db_ok, se_ok, "board self-test failed");
        }
        ok
    }
}

fn gd3000_to_fault_bits(status: Gd3000Status) -> MotorFaultBits {
    let mut bits = MotorFaultBits::empty();
    if status.desaturation {
        bits |= MotorFaultBits::GD3000_DESATURATION;
    }
    if status.low_vls {
        bits |= MotorFaultBits::GD3000_LOW_VLS;
    }
    if status.over_current {
        bits |= MotorFaultBits::GD3000_OVER_CURRENT;
    }
    if status.over_temp {
        bits |= MotorFaultBits::GD3000_OVER_TEMPERATURE;
    }
    if status.phase_err {
        bits |= MotorFaultBits::GD3000_PHASE_ERROR;
    }
    if status.reset_request {
        bits |= MotorFaultBits::GD3000_RESET;
    }
    bits
}

fn psb_bits_from(psb1_over: bool, psb2_over: bool) -> MotorFaultBits {
    let mut bits = MotorFaultBits::empty();
    if psb1_over {
        bits |= MotorFaultBits::PSB_OVER_TEMPERATURE_1;
    }
    if psb2_over {
        bits |= MotorFaultBits::PSB_OVER_TEMPERATURE_2;
    }
    bits
}

fn psb_temp_bits(state: &StdMutex<[MotorTempState; MAX_MOTORS]>, motor_id: MotorId) -> MotorFaultBits {
    let state = state.lock().unwrap();
    let s = &state[motor_id.get() as usize];
    psb_bits_from(s.psb1_over, s.psb2_over)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Gd3000Status;
    use qmc_datahub::{DataHub, SimulatedMotorControl};
    use qmc_fault::{NoopFaultLogSink, NoopSystemEventSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct SimulatedSensors {
        gd3000: Mutex<[Gd3000Status; MAX_MOTORS]>,
        psb_volts: Mutex<[(f64, f64); MAX_MOTORS]>,
        db_temp: Mutex<f32>,
        mcu_temp: Mutex<f32>,
        switch_fails: AtomicBool,
        se_init: bool,
    }

    impl Default for SimulatedSensors {
        fn default() -> Self {
            Self {
                gd3000: Mutex::new([Gd3000Status::default(); MAX_MOTORS]),
                psb_volts: Mutex::new([(0.5, 0.5); MAX_MOTORS]),
                db_temp: Mutex::new(40.0),
                mcu_temp: Mutex::new(45.0),
                switch_fails: AtomicBool::new(false),
                se_init: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl BoardTransport for SimulatedSensors {
        async fn select_spi_device(&self, _device: SpiDevice) -> qmc_kernel::error::QmcResult<()> {
            if self.switch_fails.load(Ordering::SeqCst) {
                return Err(qmc_kernel::error::QmcError::Internal);
            }
            Ok(())
        }

        fn has_afe(&self, _motor_id: MotorId) -> bool {
            true
        }

        async fn init_afe(&self, _motor_id: MotorId) -> qmc_kernel::error::QmcResult<()> {
            Ok(())
        }

        async fn read_afe_channel(&self, motor_id: MotorId, channel: u8) -> qmc_kernel::error::QmcResult<f64> {
            let v = self.psb_volts.lock().unwrap()[motor_id.get() as usize];
            Ok(if channel == 0 { v.0 } else { v.1 })
        }

        async fn read_gd3000_status(&self, motor_id: MotorId) -> qmc_kernel::error::QmcResult<Gd3000Status> {
            Ok(self.gd3000.lock().unwrap()[motor_id.get() as usize])
        }

        async fn reset_gd3000(&self, _motor_id: MotorId) -> qmc_kernel::error::QmcResult<()> {
            Ok(())
        }

        async fn clear_gd3000_flags(&self, motor_id: MotorId) -> qmc_kernel::error::QmcResult<()> {
            self.gd3000.lock().unwrap()[motor_id.get() as usize] = Gd3000Status::default();
            Ok(())
        }

        async fn read_db_temperature(&self) -> qmc_kernel::error::QmcResult<f32> {
            Ok(*self.db_temp.lock().unwrap())
        }

        async fn read_mcu_temperature(&self) -> qmc_kernel::error::QmcResult<f32> {
            Ok(*self.mcu_temp.lock().unwrap())
        }

        fn is_se_initialized(&self) -> bool {
            self.se_init
        }

        fn se_uid(&self) -> String {
            "deadbeef".into()
        }
    }

    fn new_dispatcher() -> Arc<FaultDispatcher> {
        let mc = Arc::new(SimulatedMotorControl::default());
        let datahub = DataHub::new(mc);
        FaultDispatcher::new(8, 8, datahub, Arc::new(NoopFaultLogSink), Arc::new(NoopSystemEventSink))
    }

    #[tokio::test]
    async fn self_test_passes_on_healthy_sensors() {
        let transport = Arc::new(SimulatedSensors::default());
        let svc = BoardService::new(transport, new_dispatcher());
        svc.init_completed.store(true, Ordering::SeqCst);
        assert!(svc.self_test().await);
    }

    #[tokio::test]
    async fn self_test_fails_when_se_not_initialized() {
        let mut sensors = SimulatedSensors::default();
        sensors.se_init = false;
        let svc = BoardService::new(Arc::new(sensors), new_dispatcher());
        svc.init_completed.store(true, Ordering::SeqCst);
        assert!(!svc.self_test().await);
    }

    #[tokio::test]
    async fn psb_over_temperature_tracked_per_motor_until_cleared() {
        let transport = Arc::new(SimulatedSensors::default());
        let faults = new_dispatcher();
        let svc = BoardService::new(transport.clone(), faults.clone());

        transport.psb_volts.lock().unwrap()[0] = (3.29, 0.5); // near V_REF -> very hot
        svc.sweep_temperatures().await;
        assert!(psb_temp_bits(&svc.last_psb_state, MotorId::new(0).unwrap()).contains(MotorFaultBits::PSB_OVER_TEMPERATURE_1));

        transport.psb_volts.lock().unwrap()[0] = (0.5, 0.5);
        svc.sweep_temperatures().await;
        assert!(psb_temp_bits(&svc.last_psb_state, MotorId::new(0).unwrap()).is_empty());
    }

    #[tokio::test]
    async fn spi_switch_failure_raises_rpc_failure() {
        let transport = Arc::new(SimulatedSensors::default());
        transport.switch_fails.store(true, Ordering::SeqCst);
        let faults = new_dispatcher();
        tokio::spawn(faults.clone().run());
        let svc = BoardService::new(transport, faults.clone());
        svc.poll_gd3000().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(faults.fault_get_system_fault().handling_errors.contains(FaultHandlingErrorBits::RPC_FAILURE));
    }

    #[tokio::test]
    async fn system_over_temperature_sets_system_bits() {
        let transport = Arc::new(SimulatedSensors::default());
        *transport.db_temp.lock().unwrap() = 120.0;
        let faults = new_dispatcher();
        tokio::spawn(faults.clone().run());
        let svc = BoardService::new(transport, faults.clone());
        svc.poll_system_temperatures().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(faults.fault_get_system_fault().system.contains(SystemFaultBits::DB_OVER_TEMPERATURE));
    }
}
