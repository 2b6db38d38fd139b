//! Build-time provisioning for the node.
//!
//! Secrets are baked in from the environment when the firmware is compiled.
//! Missing values are not a build error; they surface as a fatal startup
//! error through [`Provisioning::validate`].

use airlift_core::config::{BrokerConfig, ConfigError, Credentials, LoopConfig};

/// Broker used when `AIRLIFT_MQTT_HOST` is not set.
pub const DEFAULT_MQTT_HOST: &str = "io.adafruit.com";

/// MQTT client identifier announced to the broker.
pub const CLIENT_ID: &str = "airlift-node";

/// Everything the node needs before it can reach the cloud service.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Provisioning {
    pub credentials: Credentials<'static>,
    pub broker: BrokerConfig<'static>,
}

impl Provisioning {
    /// Values captured from the build environment.
    pub fn from_build_env() -> Self {
        Self::from_parts(
            option_env!("AIRLIFT_WIFI_SSID"),
            option_env!("AIRLIFT_WIFI_PASSWORD"),
            option_env!("AIRLIFT_IO_USERNAME"),
            option_env!("AIRLIFT_IO_KEY"),
            option_env!("AIRLIFT_MQTT_HOST"),
        )
    }

    pub fn from_parts(
        wifi_ssid: Option<&'static str>,
        wifi_password: Option<&'static str>,
        io_username: Option<&'static str>,
        io_key: Option<&'static str>,
        mqtt_host: Option<&'static str>,
    ) -> Self {
        let host = match mqtt_host {
            Some(host) if !host.is_empty() => host,
            _ => DEFAULT_MQTT_HOST,
        };

        Self {
            credentials: Credentials::new(
                wifi_ssid.unwrap_or(""),
                wifi_password.unwrap_or(""),
                io_username.unwrap_or(""),
                io_key.unwrap_or(""),
            ),
            broker: BrokerConfig::new(host, CLIENT_ID),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials.validate()?;
        self.broker.validate()
    }
}

/// Loop cadence used on hardware.
pub const fn loop_config() -> LoopConfig {
    LoopConfig::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_provisioning_validates() {
        let provisioning = Provisioning::from_parts(
            Some("workshop"),
            Some("hunter2"),
            Some("maker"),
            Some("aio_key"),
            None,
        );
        assert_eq!(provisioning.validate(), Ok(()));
        assert_eq!(provisioning.broker.host, DEFAULT_MQTT_HOST);
        assert_eq!(provisioning.broker.port, 1883);
        assert_eq!(provisioning.broker.client_id, CLIENT_ID);
    }

    #[test]
    fn open_network_needs_no_password() {
        let provisioning =
            Provisioning::from_parts(Some("cafe"), None, Some("maker"), Some("aio_key"), None);
        assert_eq!(provisioning.validate(), Ok(()));
    }

    #[test]
    fn missing_secrets_are_reported_by_name() {
        let provisioning = Provisioning::from_parts(None, None, Some("maker"), Some("k"), None);
        assert_eq!(
            provisioning.validate(),
            Err(ConfigError::MissingField("wifi ssid"))
        );

        let provisioning = Provisioning::from_parts(Some("cafe"), None, Some("maker"), None, None);
        assert_eq!(
            provisioning.validate(),
            Err(ConfigError::MissingField("io key"))
        );
    }

    #[test]
    fn host_override_wins_unless_blank() {
        let custom = Provisioning::from_parts(None, None, None, None, Some("broker.local"));
        assert_eq!(custom.broker.host, "broker.local");

        let blank = Provisioning::from_parts(None, None, None, None, Some(""));
        assert_eq!(blank.broker.host, DEFAULT_MQTT_HOST);
    }

    #[test]
    fn hardware_cadence_is_the_default() {
        assert_eq!(loop_config(), LoopConfig::new());
    }
}
