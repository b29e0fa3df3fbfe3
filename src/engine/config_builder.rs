use serde_json::json;

use crate::config::EngineSettings;
use crate::models::{Candidate, EngineConfig, Inbound, LogSection};

/// Maps a candidate to a complete engine configuration document
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    listen: String,
    http_port: u16,
    socks_port: u16,
    log_level: String,
}

impl ConfigBuilder {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            listen: settings.listen.clone(),
            http_port: settings.http_port,
            socks_port: settings.socks_port,
            log_level: settings.log_level.clone(),
        }
    }

    /// Fixed HTTP + SOCKS inbounds plus one outbound for `candidate`
    pub fn build(&self, candidate: &Candidate) -> EngineConfig {
        EngineConfig {
            log: LogSection {
                loglevel: self.log_level.clone(),
            },
            inbounds: self.inbounds(),
            outbounds: vec![candidate.to_outbound()],
        }
    }

    fn inbounds(&self) -> Vec<Inbound> {
        vec![
            Inbound {
                listen: self.listen.clone(),
                protocol: "http".to_string(),
                settings: json!({ "timeout": 600 }),
                port: self.http_port.to_string(),
            },
            Inbound {
                listen: self.listen.clone(),
                protocol: "socks".to_string(),
                settings: json!({ "udp": false, "auth": "noauth" }),
                port: self.socks_port.to_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShadowsocksCandidate;

    fn settings() -> EngineSettings {
        EngineSettings {
            binary: "v2ray".to_string(),
            args: vec!["run".to_string()],
            listen: "0.0.0.0".to_string(),
            http_port: 1087,
            socks_port: 1080,
            log_level: "warning".to_string(),
        }
    }

    #[test]
    fn test_build_document_shape() {
        let candidate = Candidate::Shadowsocks(ShadowsocksCandidate {
            name: None,
            host: "ss.example.com".to_string(),
            port: 8388,
            method: "aes-256-gcm".to_string(),
            password: "pw".to_string(),
        });

        let config = ConfigBuilder::new(&settings()).build(&candidate);
        let value = serde_json::to_value(&config).unwrap();

        assert_eq!(value["log"]["loglevel"], "warning");

        let inbounds = value["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 2);
        assert_eq!(inbounds[0]["protocol"], "http");
        assert_eq!(inbounds[0]["port"], "1087");
        assert_eq!(inbounds[0]["listen"], "0.0.0.0");
        assert_eq!(inbounds[0]["settings"]["timeout"], 600);
        assert_eq!(inbounds[1]["protocol"], "socks");
        assert_eq!(inbounds[1]["port"], "1080");
        assert_eq!(inbounds[1]["settings"]["auth"], "noauth");

        assert_eq!(value["outbounds"].as_array().unwrap().len(), 1);
        assert_eq!(config.outbound(), Some(&candidate.to_outbound()));
    }

    #[test]
    fn test_build_is_pure() {
        let candidate = Candidate::Shadowsocks(ShadowsocksCandidate {
            name: Some("a".to_string()),
            host: "10.0.0.1".to_string(),
            port: 1,
            method: "none".to_string(),
            password: String::new(),
        });
        let builder = ConfigBuilder::new(&settings());
        assert_eq!(builder.build(&candidate), builder.build(&candidate));
    }
}
