//! Directory document model and the policy filter that turns it into
//! connection candidates and vetted tunnel options.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::settings::PolicySettings;

/// Port 53 is special-cased by some providers for DNS tunneling tricks and
/// is never used as a gateway port here.
const EXCLUDED_PORT: u16 = 53;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Gateway {gateway} references unknown location {location:?}")]
    UnknownLocation { gateway: String, location: String },

    #[error("Gateway {gateway} advertises unusable port {port:?}")]
    InvalidPort { gateway: String, port: String },
}

/// Remote-served description of the provider's gateways, locations, and
/// proposed tunnel options.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryDocument {
    pub locations: HashMap<String, Location>,
    pub gateways: Vec<Gateway>,

    /// serde_json::Map keeps keys sorted, so option emission is
    /// deterministic across runs.
    #[serde(default)]
    pub openvpn_configuration: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub country_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gateway {
    pub ip_address: String,
    pub location: String,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capabilities {
    pub transport: Vec<Transport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transport {
    #[serde(rename = "type")]
    pub kind: String,

    /// Providers serve ports as strings or numbers depending on version.
    pub ports: Vec<PortValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn parse(&self) -> Option<u16> {
        match self {
            PortValue::Number(n) => u16::try_from(*n).ok(),
            PortValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A (host, ports) pair eligible for connection after policy filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host: String,
    pub ports: Vec<u16>,
}

/// Filter the directory's gateways down to policy-compliant candidates.
///
/// Gateways outside the country allow-set are skipped; transports of the
/// wrong type are skipped; port 53 is dropped and a transport left with no
/// ports is skipped entirely. A gateway referencing a location the document
/// does not define is an integrity failure.
pub fn filter_gateways(
    document: &DirectoryDocument,
    policy: &PolicySettings,
) -> Result<Vec<Candidate>, TopologyError> {
    let mut candidates = Vec::new();

    for gateway in &document.gateways {
        let location = document.locations.get(&gateway.location).ok_or_else(|| {
            TopologyError::UnknownLocation {
                gateway: gateway.ip_address.clone(),
                location: gateway.location.clone(),
            }
        })?;

        if !policy
            .country_codes
            .iter()
            .any(|code| *code == location.country_code)
        {
            tracing::debug!(
                "Skipping gateway {} in {}",
                gateway.ip_address,
                location.country_code
            );
            continue;
        }

        for transport in &gateway.capabilities.transport {
            if transport.kind != policy.transport_type {
                continue;
            }

            let mut ports = Vec::with_capacity(transport.ports.len());
            for raw in &transport.ports {
                let port = raw.parse().ok_or_else(|| TopologyError::InvalidPort {
                    gateway: gateway.ip_address.clone(),
                    port: match raw {
                        PortValue::Number(n) => n.to_string(),
                        PortValue::Text(s) => s.clone(),
                    },
                })?;
                if port != EXCLUDED_PORT {
                    ports.push(port);
                }
            }

            if ports.is_empty() {
                continue;
            }

            candidates.push(Candidate {
                host: gateway.ip_address.clone(),
                ports,
            });
        }
    }

    Ok(candidates)
}

/// Render the provider-proposed tunnel options that pass the allow-list.
///
/// Unknown keys are dropped with a warning, never silently included. A
/// `true` or absent value renders as the bare key; anything else renders
/// as `key value`.
pub fn filter_options(document: &DirectoryDocument, policy: &PolicySettings) -> Vec<String> {
    let mut lines = Vec::new();

    for (key, value) in &document.openvpn_configuration {
        if !policy.allowed_options.iter().any(|allowed| allowed == key) {
            tracing::warn!("Ignoring unsafe tunnel option {:?}", key);
            continue;
        }

        match value {
            Value::Null | Value::Bool(true) => lines.push(key.clone()),
            Value::Bool(false) => lines.push(format!("{} false", key)),
            Value::String(s) => lines.push(format!("{} {}", key, s)),
            Value::Number(n) => lines.push(format!("{} {}", key, n)),
            other => {
                tracing::warn!("Ignoring unrenderable tunnel option {:?} = {}", key, other);
            }
        }
    }

    lines
}
