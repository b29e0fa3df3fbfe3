//! Subscription link parsing
//!
//! Turns one `<scheme>://<payload>` line into a [`Candidate`]. Supported forms:
//!
//! ```text
//! vmess://base64({"ps":..,"add":..,"port":..,"id":..,"aid":..,"net":..,"tls":..})
//! ss://base64(method:password@host:port)#tag          (legacy)
//! ss://base64(method:password)@host:port#tag          (SIP002)
//! ss://method:password@host:port#tag                  (SIP002, plain userinfo)
//! ```
//!
//! Parsing is a pure function of the line.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Result, SubvisorError};
use crate::models::{format_tcp_addr, Candidate, ShadowsocksCandidate, VmessCandidate};

/// Standard alphabet, padding optional
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// URL-safe alphabet, padding optional
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode base64 that may be unpadded, URL-safe, or wrapped across lines
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    match LENIENT_STANDARD.decode(&compact) {
        Ok(bytes) => Ok(bytes),
        Err(e) => LENIENT_URL_SAFE.decode(&compact).map_err(|_| e.into()),
    }
}

/// Parse one subscription line into a candidate
pub fn parse_candidate(line: &str) -> Result<Candidate> {
    let line = line.trim();

    let Some((scheme, payload)) = line.split_once("://") else {
        return Err(SubvisorError::UnsupportedProtocol(
            "missing scheme separator".to_string(),
        ));
    };

    match scheme.to_ascii_lowercase().as_str() {
        "vmess" => parse_vmess(payload).map(Candidate::Vmess),
        "ss" => parse_shadowsocks(payload).map(Candidate::Shadowsocks),
        other => Err(SubvisorError::UnsupportedProtocol(other.to_string())),
    }
}

/// JSON body of a `vmess://` link
#[derive(Debug, Deserialize)]
struct VmessLink {
    #[serde(default)]
    ps: String,
    #[serde(default)]
    add: String,
    #[serde(default, deserialize_with = "string_or_number")]
    port: String,
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    aid: String,
    #[serde(default)]
    scy: String,
    #[serde(default)]
    net: String,
    #[serde(default, rename = "type")]
    header_type: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    tls: String,
    #[serde(default)]
    sni: String,
}

/// Vmess generators disagree on whether `port` and `aid` are strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn parse_vmess(payload: &str) -> Result<VmessCandidate> {
    let json = decode_base64(payload)?;
    let link: VmessLink = serde_json::from_slice(&json)
        .map_err(|e| SubvisorError::MalformedCandidate(format!("invalid vmess json: {}", e)))?;

    if link.add.trim().is_empty() {
        return Err(SubvisorError::MalformedCandidate(
            "vmess link has no address".to_string(),
        ));
    }
    if link.id.trim().is_empty() {
        return Err(SubvisorError::MalformedCandidate(
            "vmess link has no user id".to_string(),
        ));
    }

    let port = parse_port(&link.port)?;
    let (host, port) = parse_host_port(&format_tcp_addr(link.add.trim(), port))?;
    let alter_id = if link.aid.trim().is_empty() {
        0
    } else {
        link.aid.trim().parse().map_err(|_| {
            SubvisorError::MalformedCandidate(format!("invalid vmess alter id '{}'", link.aid))
        })?
    };

    Ok(VmessCandidate {
        name: link.ps,
        host,
        port,
        user_id: link.id.trim().to_string(),
        alter_id,
        security: non_empty(link.scy).unwrap_or_else(|| "auto".to_string()),
        network: non_empty(link.net).unwrap_or_else(|| "tcp".to_string()),
        header_type: non_empty(link.header_type),
        ws_host: non_empty(link.host),
        ws_path: non_empty(link.path),
        tls: link.tls.eq_ignore_ascii_case("tls"),
        sni: non_empty(link.sni),
    })
}

fn parse_shadowsocks(payload: &str) -> Result<ShadowsocksCandidate> {
    let (body, name) = match payload.split_once('#') {
        Some((body, tag)) => (body, decode_tag(tag)),
        None => (payload, None),
    };

    // Plugin options are not forwarded to the engine.
    let body = body.split('?').next().unwrap_or(body);

    let (credentials, server) = match body.rsplit_once('@') {
        Some((userinfo, server)) => (decode_userinfo(userinfo)?, server.to_string()),
        None => {
            let decoded = decode_utf8(body)?;
            let (credentials, server) = decoded.rsplit_once('@').ok_or_else(|| {
                SubvisorError::MalformedCandidate("ss link has no server part".to_string())
            })?;
            (credentials.to_string(), server.to_string())
        }
    };

    let (method, password) = credentials.split_once(':').ok_or_else(|| {
        SubvisorError::MalformedCandidate("ss credentials must be method:password".to_string())
    })?;
    if method.is_empty() {
        return Err(SubvisorError::MalformedCandidate(
            "ss link has no cipher method".to_string(),
        ));
    }

    let (host, port) = parse_host_port(&server)?;

    Ok(ShadowsocksCandidate {
        name,
        host,
        port,
        method: method.to_string(),
        password: password.to_string(),
    })
}

fn decode_userinfo(userinfo: &str) -> Result<String> {
    let userinfo = urlencoding::decode(userinfo)
        .map_err(|e| SubvisorError::MalformedCandidate(format!("invalid ss userinfo: {}", e)))?;

    if userinfo.contains(':') {
        Ok(userinfo.into_owned())
    } else {
        decode_utf8(&userinfo)
    }
}

fn decode_utf8(encoded: &str) -> Result<String> {
    String::from_utf8(decode_base64(encoded)?)
        .map_err(|_| SubvisorError::MalformedCandidate("payload is not valid UTF-8".to_string()))
}

fn decode_tag(tag: &str) -> Option<String> {
    let decoded = urlencoding::decode(tag)
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| tag.to_string());
    non_empty(decoded)
}

fn parse_host_port(addr: &str) -> Result<(String, u16)> {
    // A scheme without a default port keeps explicit ports like 80 visible.
    let url = url::Url::parse(&format!("tcp://{}", addr)).map_err(|e| {
        SubvisorError::MalformedCandidate(format!("invalid address '{}': {}", addr, e))
    })?;

    let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
        SubvisorError::MalformedCandidate(format!("invalid address '{}': missing host", addr))
    })?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let port = url.port().filter(|&p| p != 0).ok_or_else(|| {
        SubvisorError::MalformedCandidate(format!("invalid address '{}': missing port", addr))
    })?;

    Ok((host.to_string(), port))
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .ok()
        .filter(|&p| p != 0)
        .ok_or_else(|| SubvisorError::MalformedCandidate(format!("invalid port '{}'", raw)))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use serde_json::json;

    fn vmess_line(body: serde_json::Value) -> String {
        format!("vmess://{}", STANDARD.encode(body.to_string()))
    }

    #[test]
    fn test_parse_vmess_with_string_port() {
        let line = vmess_line(json!({
            "v": "2",
            "ps": "hk-02",
            "add": "hk.example.com",
            "port": "10086",
            "id": "b831381d-6324-4d53-ad4f-8cda48b30811",
            "aid": "0",
            "net": "tcp",
            "type": "none",
            "tls": ""
        }));

        let Candidate::Vmess(v) = parse_candidate(&line).unwrap() else {
            panic!("expected vmess candidate");
        };
        assert_eq!(v.name, "hk-02");
        assert_eq!(v.host, "hk.example.com");
        assert_eq!(v.port, 10086);
        assert_eq!(v.alter_id, 0);
        assert_eq!(v.security, "auto");
        assert_eq!(v.network, "tcp");
        assert!(!v.tls);
    }

    #[test]
    fn test_parse_vmess_with_numeric_fields_and_no_padding() {
        let body = json!({
            "ps": "jp",
            "add": "203.0.113.7",
            "port": 443,
            "id": "uuid-1",
            "aid": 64,
            "net": "ws",
            "host": "cdn.example.com",
            "path": "/ray",
            "tls": "tls"
        });
        let line = format!("vmess://{}", STANDARD_NO_PAD.encode(body.to_string()));

        let candidate = parse_candidate(&line).unwrap();
        assert_eq!(candidate.address(), "203.0.113.7:443");

        let Candidate::Vmess(v) = candidate else {
            panic!("expected vmess candidate");
        };
        assert_eq!(v.alter_id, 64);
        assert_eq!(v.ws_path.as_deref(), Some("/ray"));
        assert!(v.tls);
    }

    #[test]
    fn test_parse_vmess_rejects_missing_id() {
        let line = vmess_line(json!({ "add": "a.example.com", "port": "443" }));
        let err = parse_candidate(&line).unwrap_err();
        assert!(matches!(err, SubvisorError::MalformedCandidate(_)));
    }

    #[test]
    fn test_parse_vmess_rejects_bad_port() {
        let line = vmess_line(json!({ "add": "a.example.com", "port": "70000", "id": "x" }));
        assert!(matches!(
            parse_candidate(&line).unwrap_err(),
            SubvisorError::MalformedCandidate(_)
        ));
    }

    #[test]
    fn test_parse_vmess_rejects_invalid_host() {
        for add in ["bad host.example.com", "1.2.3.4:8080", "evil/path"] {
            let line = vmess_line(json!({ "add": add, "port": "443", "id": "u" }));
            let err = parse_candidate(&line).unwrap_err();
            assert!(
                matches!(err, SubvisorError::MalformedCandidate(_)),
                "accepted host {:?}",
                add
            );
        }
    }

    #[test]
    fn test_parse_vmess_ipv6_host() {
        let line = vmess_line(json!({ "add": "2001:db8::1", "port": 443, "id": "u" }));
        let candidate = parse_candidate(&line).unwrap();
        assert_eq!(candidate.address(), "[2001:db8::1]:443");
    }

    #[test]
    fn test_parse_vmess_rejects_garbage() {
        assert!(matches!(
            parse_candidate("vmess://%%%not-base64%%%").unwrap_err(),
            SubvisorError::MalformedCandidate(_)
        ));
        let not_json = format!("vmess://{}", STANDARD.encode("hello"));
        assert!(matches!(
            parse_candidate(&not_json).unwrap_err(),
            SubvisorError::MalformedCandidate(_)
        ));
    }

    #[test]
    fn test_parse_legacy_shadowsocks() {
        let line = format!(
            "ss://{}#Frankfurt%2001",
            STANDARD_NO_PAD.encode("aes-256-gcm:p@ss:word@ss.example.com:8388")
        );

        let Candidate::Shadowsocks(s) = parse_candidate(&line).unwrap() else {
            panic!("expected shadowsocks candidate");
        };
        assert_eq!(s.method, "aes-256-gcm");
        assert_eq!(s.password, "p@ss:word");
        assert_eq!(s.host, "ss.example.com");
        assert_eq!(s.port, 8388);
        assert_eq!(s.name.as_deref(), Some("Frankfurt 01"));
    }

    #[test]
    fn test_parse_sip002_shadowsocks() {
        let line = format!(
            "ss://{}@198.51.100.4:80/?plugin=obfs-local#edge",
            STANDARD.encode("chacha20-ietf-poly1305:secret")
        );

        let candidate = parse_candidate(&line).unwrap();
        assert_eq!(candidate.address(), "198.51.100.4:80");
        assert_eq!(candidate.display_name(), "ss://edge");
    }

    #[test]
    fn test_parse_sip002_plain_userinfo_ipv6() {
        let candidate = parse_candidate("ss://aes-128-gcm:pw@[2001:db8::1]:8443").unwrap();
        assert_eq!(candidate.address(), "[2001:db8::1]:8443");

        let Candidate::Shadowsocks(s) = candidate else {
            panic!("expected shadowsocks candidate");
        };
        assert_eq!(s.host, "2001:db8::1");
        assert!(s.name.is_none());
    }

    #[test]
    fn test_parse_shadowsocks_rejects_missing_port() {
        let line = format!("ss://{}", STANDARD.encode("aes-256-gcm:pw@ss.example.com"));
        assert!(matches!(
            parse_candidate(&line).unwrap_err(),
            SubvisorError::MalformedCandidate(_)
        ));
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        assert!(matches!(
            parse_candidate("trojan://password@host:443").unwrap_err(),
            SubvisorError::UnsupportedProtocol(p) if p == "trojan"
        ));
        assert!(matches!(
            parse_candidate("STATUS=remaining 20GB").unwrap_err(),
            SubvisorError::UnsupportedProtocol(_)
        ));
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let line = vmess_line(json!({ "ps": "a", "add": "h", "port": 1, "id": "u" }));
        assert_eq!(parse_candidate(&line).unwrap(), parse_candidate(&line).unwrap());
    }

    #[test]
    fn test_decode_base64_tolerates_wrapping_and_url_safe() {
        let wrapped = "aGVsbG8g\nd29ybGQ=\r\n";
        assert_eq!(decode_base64(wrapped).unwrap(), b"hello world");
        assert_eq!(decode_base64("-_8").unwrap(), vec![0xfb, 0xff]);
    }
}
