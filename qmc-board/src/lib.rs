//! GD3000/AFE/DB/MCU temperature polling, SPI chip-select mux routing,
//! and board self-test (spec §4.4, C4).

pub mod service;
pub mod transport;

pub use service::{BoardService, DELAY_MS, DB_TEMP_THRESHOLD, MCU_TEMP_THRESHOLD, PSB_TEMP1_THRESHOLD, PSB_TEMP2_THRESHOLD};
pub use transport::{temperature_from_voltage, BoardTransport, Gd3000Status, SpiDevice};
