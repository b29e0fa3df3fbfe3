use serde::Serialize;

use super::engine_config::{
    OutboundDescriptor, OutboundSettings, ShadowsocksServer, StreamSettings, TcpSettings,
    TlsSettings, VmessUser, VnextServer, WsSettings,
};

/// Tag carried by every generated outbound
pub const OUTBOUND_TAG: &str = "proxy";

/// Capabilities shared by every protocol variant
pub trait Endpoint {
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    fn display_name(&self) -> String;
    fn to_outbound(&self) -> OutboundDescriptor;

    /// `host:port`, with IPv6 hosts bracketed
    fn address(&self) -> String {
        format_tcp_addr(self.host(), self.port())
    }
}

/// One parsed proxy endpoint offered by the subscription feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Candidate {
    Vmess(VmessCandidate),
    Shadowsocks(ShadowsocksCandidate),
}

impl Candidate {
    pub fn protocol(&self) -> &'static str {
        match self {
            Candidate::Vmess(_) => "vmess",
            Candidate::Shadowsocks(_) => "shadowsocks",
        }
    }

    fn endpoint(&self) -> &dyn Endpoint {
        match self {
            Candidate::Vmess(v) => v,
            Candidate::Shadowsocks(s) => s,
        }
    }

    pub fn address(&self) -> String {
        self.endpoint().address()
    }

    pub fn display_name(&self) -> String {
        self.endpoint().display_name()
    }

    pub fn to_outbound(&self) -> OutboundDescriptor {
        self.endpoint().to_outbound()
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Vmess endpoint decoded from a `vmess://` link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmessCandidate {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub alter_id: u32,
    pub security: String,
    pub network: String,
    pub header_type: Option<String>,
    pub ws_host: Option<String>,
    pub ws_path: Option<String>,
    pub tls: bool,
    pub sni: Option<String>,
}

impl Endpoint for VmessCandidate {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("vmess://{}", self.address())
        } else {
            format!("vmess://{}", self.name)
        }
    }

    fn to_outbound(&self) -> OutboundDescriptor {
        let mut stream = StreamSettings::plain_tcp();
        stream.network = self.network.clone();

        match self.network.as_str() {
            "tcp" => {
                let header = self.header_type.as_deref().unwrap_or("none");
                stream.tcp_settings = Some(TcpSettings::with_header_type(header));
            }
            "ws" => {
                stream.tcp_settings = None;
                let mut headers = std::collections::BTreeMap::new();
                if let Some(host) = &self.ws_host {
                    headers.insert("Host".to_string(), host.clone());
                }
                stream.ws_settings = Some(WsSettings {
                    path: self.ws_path.clone().unwrap_or_else(|| "/".to_string()),
                    headers,
                });
            }
            _ => stream.tcp_settings = None,
        }

        if self.tls {
            stream.security = "tls".to_string();
            let server_name = self
                .sni
                .as_ref()
                .or(self.ws_host.as_ref())
                .unwrap_or(&self.host)
                .clone();
            stream.tls_settings = Some(TlsSettings { server_name });
        }

        OutboundDescriptor {
            protocol: "vmess".to_string(),
            tag: OUTBOUND_TAG.to_string(),
            stream_settings: stream,
            settings: OutboundSettings {
                vnext: vec![VnextServer {
                    address: self.host.clone(),
                    port: self.port,
                    users: vec![VmessUser {
                        id: self.user_id.clone(),
                        alter_id: self.alter_id,
                        level: 0,
                        security: self.security.clone(),
                    }],
                }],
                servers: Vec::new(),
            },
        }
    }
}

/// Shadowsocks endpoint decoded from an `ss://` link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowsocksCandidate {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub method: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Endpoint for ShadowsocksCandidate {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("ss://{}", name),
            _ => format!("ss://{}", self.address()),
        }
    }

    fn to_outbound(&self) -> OutboundDescriptor {
        OutboundDescriptor {
            protocol: "shadowsocks".to_string(),
            tag: OUTBOUND_TAG.to_string(),
            stream_settings: StreamSettings::plain_tcp(),
            settings: OutboundSettings {
                vnext: Vec::new(),
                servers: vec![ShadowsocksServer {
                    address: self.host.clone(),
                    port: self.port,
                    method: self.method.clone(),
                    password: self.password.clone(),
                    level: 0,
                    ota: false,
                    email: String::new(),
                }],
            },
        }
    }
}

pub fn format_tcp_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
