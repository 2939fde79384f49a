/// The size of a single configuration cell's value, in bytes. Sized so a
/// `UserConfig` record (name + role + timestamps + salt + secret) fits
/// comfortably, and so `HISTORY_HASH_COUNT` (spec §4.7) comes out to a
/// round number of `USER_SECRET_LENGTH`-sized slots.
pub const CONFIG_MAX_VALUE_LEN: usize = 256;

/// Every keyed configuration slot (spec §3's `ConfigStore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Cloud1Host,
    Cloud1Port,
    Ip,
    IpMask,
    IpGw,
    IpDns,
    Mac,
    VlanId,
    TsnRx,
    TsnTx,
    AzureHub,
    GenericHost,
    GenericUser,
    GenericPass,
    GenericDev,
    GenericPort,
    Motd,
    User(u8),       // 1..=10
    UserHashes(u8), // 1..=10
}

pub const MAX_USER_SLOTS: u8 = 10;

impl ConfigKey {
    /// `config_key_from_string` (spec §4.6): maps the REST `/settings/{key}`
    /// path segment and MQTT-adjacent config names to a `ConfigKey`.
    /// Returns `None` for anything unrecognized (`KeyNone`).
    pub fn from_str_key(s: &str) -> Option<Self> {
        Some(match s {
            "cloud1_host" => ConfigKey::Cloud1Host,
            "cloud1_port" => ConfigKey::Cloud1Port,
            "ip" => ConfigKey::Ip,
            "ip_mask" => ConfigKey::IpMask,
            "ip_gw" => ConfigKey::IpGw,
            "ip_dns" => ConfigKey::IpDns,
            "mac" => ConfigKey::Mac,
            "vlan_id" => ConfigKey::VlanId,
            "tsn_rx" => ConfigKey::TsnRx,
            "tsn_tx" => ConfigKey::TsnTx,
            "azure_hub" => ConfigKey::AzureHub,
            "generic_host" => ConfigKey::GenericHost,
            "generic_user" => ConfigKey::GenericUser,
            "generic_pass" => ConfigKey::GenericPass,
            "generic_dev" => ConfigKey::GenericDev,
            "generic_port" => ConfigKey::GenericPort,
            "motd" => ConfigKey::Motd,
            other => {
                if let Some(n) = other.strip_prefix("user") {
                    if let Some(hashes) = n.strip_prefix("_hashes") {
                        let idx: u8 = hashes.parse().ok()?;
                        if (1..=MAX_USER_SLOTS).contains(&idx) {
                            return Some(ConfigKey::UserHashes(idx));
                        }
                        return None;
                    }
                    let idx: u8 = n.parse().ok()?;
                    if (1..=MAX_USER_SLOTS).contains(&idx) {
                        return Some(ConfigKey::User(idx));
                    }
                }
                return None;
            }
        })
    }

    pub fn as_str_key(&self) -> String {
        match self {
            ConfigKey::Cloud1Host => "cloud1_host".into(),
            ConfigKey::Cloud1Port => "cloud1_port".into(),
            ConfigKey::Ip => "ip".into(),
            ConfigKey::IpMask => "ip_mask".into(),
            ConfigKey::IpGw => "ip_gw".into(),
            ConfigKey::IpDns => "ip_dns".into(),
            ConfigKey::Mac => "mac".into(),
            ConfigKey::VlanId => "vlan_id".into(),
            ConfigKey::TsnRx => "tsn_rx".into(),
            ConfigKey::TsnTx => "tsn_tx".into(),
            ConfigKey::AzureHub => "azure_hub".into(),
            ConfigKey::GenericHost => "generic_host".into(),
            ConfigKey::GenericUser => "generic_user".into(),
            ConfigKey::GenericPass => "generic_pass".into(),
            ConfigKey::GenericDev => "generic_dev".into(),
            ConfigKey::GenericPort => "generic_port".into(),
            ConfigKey::Motd => "motd".into(),
            ConfigKey::User(n) => format!("user{n}"),
            ConfigKey::UserHashes(n) => format!("user{n}_hashes"),
        }
    }

    /// The default value applied at read when a cell is unset (spec
    /// §3's `ConfigStore` invariant).
    pub fn default_value(&self) -> Vec<u8> {
        match self {
            ConfigKey::Motd => b"Welcome.".to_vec(),
            ConfigKey::Cloud1Port | ConfigKey::GenericPort => 0u32.to_be_bytes().to_vec(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_keys() {
        for k in [ConfigKey::Ip, ConfigKey::Motd, ConfigKey::User(3), ConfigKey::UserHashes(10)] {
            assert_eq!(ConfigKey::from_str_key(&k.as_str_key()), Some(k));
        }
    }

    #[test]
    fn unknown_key_is_none() {
        assert_eq!(ConfigKey::from_str_key("bogus"), None);
    }

    #[test]
    fn user_slot_out_of_range_is_none() {
        assert_eq!(ConfigKey::from_str_key("user11"), None);
        assert_eq!(ConfigKey::from_str_key("user0"), None);
    }
}
