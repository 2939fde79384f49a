use async_trait::async_trait;

use qmc_datahub::MotorId;
use qmc_kernel::error::QmcResult;

/// The two chip-select targets multiplexed onto one Power Stage Board SPI
/// bus, switched through a single RPC call owned by the secondary core
/// (spec §4.4: "routed through a single RPC call to the SBL-owned chip-select
/// multiplexer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiDevice {
    Afe,
    MotorDriver,
}

/// One GD3000 pre-driver status-register read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gd3000Status {
    pub reset_request: bool,
    pub desaturation: bool,
    pub low_vls: bool,
    pub over_current: bool,
    pub over_temp: bool,
    pub framing_err: bool,
    pub phase_err: bool,
}

impl Gd3000Status {
    pub fn has_latched_fault(&self) -> bool {
        self.desaturation || self.low_vls || self.over_current || self.over_temp || self.framing_err || self.phase_err
    }
}

/// Out-of-scope hardware collaborator (GD3000 pre-drivers, NAFE1388 AFEs,
/// the DB/MCU temperature sensors, and the RPC channel to the core that
/// owns the SPI chip-select mux). `qmc-app` wires in the real SPI/RPC
/// stack; tests use `MockBoardTransport`.
#[async_trait]
pub trait BoardTransport: Send + Sync {
    async fn select_spi_device(&self, device: SpiDevice) -> QmcResult<()>;

    /// `MC_PSBx_HAS_AFE`: whether this motor's PSB carries an AFE channel
    /// pair at all (static board configuration).
    fn has_afe(&self, motor_id: MotorId) -> bool;

    async fn init_afe(&self, motor_id: MotorId) -> QmcResult<()>;
    async fn read_afe_channel(&self, motor_id: MotorId, channel: u8) -> QmcResult<f64>;

    async fn read_gd3000_status(&self, motor_id: MotorId) -> QmcResult<Gd3000Status>;
    async fn reset_gd3000(&self, motor_id: MotorId) -> QmcResult<()>;
    async fn clear_gd3000_flags(&self, motor_id: MotorId) -> QmcResult<()>;

    async fn read_db_temperature(&self) -> QmcResult<f32>;
    async fn read_mcu_temperature(&self) -> QmcResult<f32>;

    fn is_se_initialized(&self) -> bool;
    fn se_uid(&self) -> String;
}

/// `CalculateTemperatureFromVoltage`: converts one AFE channel's raw
/// voltage reading into degrees Celsius via the thermistor's beta-model
/// (`R_25 = 47kΩ`, `BETA = 4101`, `V_REF = 3.3V`).
pub fn temperature_from_voltage(v: f64) -> f64 {
    const R_25: f64 = 47_000.0;
    const BETA: f64 = 4101.0;
    const T_0: f64 = 273.15;
    const T_25: f64 = T_0 + 25.0;
    const V_REF: f64 = 3.3;

    let r = R_25 * v / (V_REF - v);
    let t_out = 1.0 / ((r / R_25).ln() / BETA + 1.0 / T_25);
    t_out - T_0
}
