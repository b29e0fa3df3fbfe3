//! Engine configuration document
//!
//! Mirrors the JSON document the proxy engine reads from stdin:
//! `{ "log": {...}, "inbounds": [...], "outbounds": [...] }`.
//! Only the subset the supervisor populates is modelled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Complete engine configuration, regenerated for every attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub log: LogSection,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<OutboundDescriptor>,
}

impl EngineConfig {
    /// The single outbound built from the candidate under trial
    pub fn outbound(&self) -> Option<&OutboundDescriptor> {
        self.outbounds.first()
    }

    /// Serialize to the newline-terminated form written to the engine's stdin
    pub fn to_stdin_payload(&self) -> serde_json::Result<Vec<u8>> {
        let mut payload = serde_json::to_vec(self)?;
        payload.push(b'\n');
        Ok(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    pub loglevel: String,
}

/// Local listener definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    pub listen: String,
    pub protocol: String,
    pub settings: Value,
    pub port: String,
}

/// Protocol tag plus protocol-specific settings for one upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundDescriptor {
    pub protocol: String,
    pub tag: String,
    pub stream_settings: StreamSettings,
    pub settings: OutboundSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    pub security: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_settings: Option<TcpSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_settings: Option<TlsSettings>,
}

impl StreamSettings {
    /// Plain TCP without header obfuscation or TLS
    pub fn plain_tcp() -> Self {
        Self {
            network: "tcp".to_string(),
            security: "none".to_string(),
            tcp_settings: Some(TcpSettings::with_header_type("none")),
            ws_settings: None,
            tls_settings: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSettings {
    pub header: BTreeMap<String, String>,
}

impl TcpSettings {
    pub fn with_header_type(kind: &str) -> Self {
        let mut header = BTreeMap::new();
        header.insert("type".to_string(), kind.to_string());
        Self { header }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsSettings {
    pub path: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    pub server_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSettings {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vnext: Vec<VnextServer>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub servers: Vec<ShadowsocksServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnextServer {
    pub address: String,
    pub port: u16,
    pub users: Vec<VmessUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmessUser {
    pub id: String,
    pub alter_id: u32,
    pub level: u32,
    pub security: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowsocksServer {
    pub address: String,
    pub port: u16,
    pub method: String,
    pub password: String,
    pub level: u32,
    pub ota: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub email: String,
}
