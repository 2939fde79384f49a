pub mod coerce;
pub mod flash;
pub mod keys;
pub mod store;

pub use coerce::{bool_as_str, get_int_from_value, parse_bool, set_int_as_value};
pub use flash::{ConfigFlash, MemFlash};
pub use keys::{ConfigKey, CONFIG_MAX_VALUE_LEN, MAX_USER_SLOTS};
pub use store::{ConfigStore, FWU_REGION_SIZE, FWU_SECTOR_SIZE};
