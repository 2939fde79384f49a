//! REST/JSON API, MQTT publish surface, and on-panel input contract
//! (spec §6, C10): the outermost layer translating HTTP and MQTT
//! traffic into calls on the C2-C9 crates, and the writer contract the
//! panel hardware driver targets.

pub mod auth;
pub mod error;
pub mod mqtt;
pub mod panel;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use mqtt::{MqttMode, MqttPublisher};
pub use panel::PanelInputs;
pub use server::{build_router, run_error_logging_task, serve, HttpErrorCounters};
pub use state::AppState;
