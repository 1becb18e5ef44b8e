// ABOUTME: Static transport configuration, fixed at bind time
// ABOUTME: Validation runs before any network activity so bad config never half-starts a worker

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::datatypes::delivery_receipt::DEFAULT_DELIVERY_REPORT_REGEX;
use crate::datatypes::{DataCodingError, DataCodingMap, DeliveryReportParser};
use crate::operator::{OperatorNumbers, OperatorPrefixes};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration field '{0}' is required")]
    MissingField(&'static str),

    #[error("unsupported SMPP interface version '{0}' (only '34' is supported)")]
    UnsupportedInterfaceVersion(String),

    #[error("delivery_report_regex does not compile: {0}")]
    InvalidDeliveryReportRegex(#[from] regex::Error),

    #[error("data_coding_overrides invalid: {0}")]
    InvalidDataCodingOverride(#[from] DataCodingError),

    #[error("throttle_delay must be a non-negative number of seconds, got {0}")]
    InvalidThrottleDelay(f64),
}

/// Static configuration for one SMPP transport worker.
///
/// Field names match the deployment configuration; the upper-case aliases
/// accept the legacy operator-table spelling.
#[derive(Clone, Debug, Deserialize)]
pub struct SmppConfig {
    /// Hostname of the SMPP server
    pub host: String,
    /// Port the SMPP server is listening on
    pub port: u16,
    /// User id used to connect to the SMPP server
    pub system_id: String,
    /// Password for the system id
    pub password: String,

    /// Additional system metadata passed through on bind
    #[serde(default)]
    pub system_type: String,

    /// SMPP protocol version; only "34" (v3.4) is supported
    #[serde(default = "default_interface_version")]
    pub interface_version: String,

    /// The SMPP service type
    #[serde(default)]
    pub service_type: String,

    /// Destination TON (type of number)
    #[serde(default)]
    pub dest_addr_ton: u8,
    /// Destination NPI; default 1 (ISDN/E.164/E.163)
    #[serde(default = "default_dest_addr_npi")]
    pub dest_addr_npi: u8,
    /// Source TON
    #[serde(default)]
    pub source_addr_ton: u8,
    /// Source NPI
    #[serde(default)]
    pub source_addr_npi: u8,

    /// Whether to request delivery reports
    #[serde(default = "default_true")]
    pub registered_delivery: bool,

    /// How long to wait for a successful bind, in seconds
    #[serde(default = "default_bind_timeout")]
    pub smpp_bind_timeout: u64,

    /// Seconds between enquire_link keep-alives; a missed response within
    /// one interval drops the connection
    #[serde(default = "default_enquire_link_interval")]
    pub smpp_enquire_link_interval: u64,

    /// Seconds to wait between reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub initial_reconnect_delay: u64,

    /// Seconds to keep third-party message ids around for delivery-report
    /// matching; default one week
    #[serde(default = "default_third_party_id_expiry")]
    pub third_party_id_expiry: u64,

    /// Regex used for matching delivery reports
    #[serde(default = "default_delivery_report_regex")]
    pub delivery_report_regex: String,

    /// Overrides for the data_coding character set table. Useful for fixing
    /// the default encoding (0), filling undefined codings (such as 4 or 8)
    /// or working around SMSCs that violate the table.
    #[serde(default)]
    pub data_coding_overrides: HashMap<u8, String>,

    /// If true, messages longer than 254 octets are sent in the
    /// message_payload optional field instead of short_message
    #[serde(default)]
    pub send_long_messages: bool,

    /// Correlation-store prefix override. A connection split into separate
    /// RX and TX binds must use the same value on both sides so delivery
    /// reports received on one bind can find submits sent on the other.
    #[serde(default)]
    pub split_bind_prefix: String,

    /// Delay (in seconds) before retrying a message after ESME_RTHROTTLED
    #[serde(default = "default_throttle_delay")]
    pub throttle_delay: f64,

    /// Used to translate a leading zero in a destination MSISDN into a
    /// country code
    #[serde(default, alias = "COUNTRY_CODE")]
    pub country_code: String,

    /// Nested prefix -> network name tables
    #[serde(default, alias = "OPERATOR_PREFIX")]
    pub operator_prefix: OperatorPrefixes,

    /// Source MSISDN to use for each network in operator_prefix; networks
    /// not listed fall back to the message's from_addr
    #[serde(default, alias = "OPERATOR_NUMBER")]
    pub operator_number: OperatorNumbers,

    /// Connection configuration handed to the key/value store adapter
    #[serde(default)]
    pub kvstore: serde_json::Map<String, serde_json::Value>,
}

fn default_interface_version() -> String {
    "34".to_string()
}

fn default_dest_addr_npi() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_bind_timeout() -> u64 {
    30
}

fn default_enquire_link_interval() -> u64 {
    55
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_third_party_id_expiry() -> u64 {
    60 * 60 * 24 * 7
}

fn default_delivery_report_regex() -> String {
    DEFAULT_DELIVERY_REPORT_REGEX.to_string()
}

fn default_throttle_delay() -> f64 {
    0.1
}

impl SmppConfig {
    /// Minimal config for a given endpoint; everything else at defaults.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        SmppConfig {
            host: host.into(),
            port,
            system_id: system_id.into(),
            password: password.into(),
            system_type: String::new(),
            interface_version: default_interface_version(),
            service_type: String::new(),
            dest_addr_ton: 0,
            dest_addr_npi: default_dest_addr_npi(),
            source_addr_ton: 0,
            source_addr_npi: 0,
            registered_delivery: true,
            smpp_bind_timeout: default_bind_timeout(),
            smpp_enquire_link_interval: default_enquire_link_interval(),
            initial_reconnect_delay: default_reconnect_delay(),
            third_party_id_expiry: default_third_party_id_expiry(),
            delivery_report_regex: default_delivery_report_regex(),
            data_coding_overrides: HashMap::new(),
            send_long_messages: false,
            split_bind_prefix: String::new(),
            throttle_delay: default_throttle_delay(),
            country_code: String::new(),
            operator_prefix: OperatorPrefixes::new(),
            operator_number: OperatorNumbers::new(),
            kvstore: serde_json::Map::new(),
        }
    }

    /// Fail fast on anything that would misbehave after the bind is up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.system_id.is_empty() {
            return Err(ConfigError::MissingField("system_id"));
        }
        if self.interface_version != "34" {
            return Err(ConfigError::UnsupportedInterfaceVersion(
                self.interface_version.clone(),
            ));
        }
        if !self.throttle_delay.is_finite() || self.throttle_delay < 0.0 {
            return Err(ConfigError::InvalidThrottleDelay(self.throttle_delay));
        }
        DeliveryReportParser::new(&self.delivery_report_regex)?;
        DataCodingMap::with_overrides(&self.data_coding_overrides)?;
        Ok(())
    }

    /// Correlation-store prefix: the split-bind override when set, otherwise
    /// `<system_id>@<host>:<port>`.
    pub fn correlation_prefix(&self) -> String {
        if self.split_bind_prefix.is_empty() {
            format!("{}@{}:{}", self.system_id, self.host, self.port)
        } else {
            self.split_bind_prefix.clone()
        }
    }

    pub fn bind_timeout(&self) -> Duration {
        Duration::from_secs(self.smpp_bind_timeout)
    }

    pub fn enquire_link_interval(&self) -> Duration {
        Duration::from_secs(self.smpp_enquire_link_interval)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.initial_reconnect_delay)
    }

    pub fn throttle_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.throttle_delay)
    }

    /// interface_version byte for the bind PDU
    pub fn interface_version_byte(&self) -> u8 {
        0x34
    }
}
