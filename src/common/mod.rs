//! Common utilities shared by the supervisor, the RPC layer and the CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Parse the address out of an "... listening at <addr>" log line.
/// Handles IPv6 wildcard forms `[::]:PORT` by converting to 127.0.0.1:PORT
pub fn parse_listen_address(line: &str) -> Option<String> {
    let lower = line.to_ascii_lowercase();
    let start = lower.find("listening at")?;
    let rest = line[start + "listening at".len()..].trim_start_matches(':').trim();
    let addr = rest
        .split(|c: char| c.is_whitespace() || c == '"')
        .next()
        .filter(|a| !a.is_empty())?;

    let addr = if let Some(port) = addr.strip_prefix("[::]:") {
        format!("127.0.0.1:{}", port)
    } else if let Some(port) = addr.strip_prefix(':') {
        format!("127.0.0.1:{}", port)
    } else {
        addr.to_string()
    };
    Some(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_address_variants() {
        assert_eq!(
            parse_listen_address("API listening at 127.0.0.1:50051").as_deref(),
            Some("127.0.0.1:50051")
        );
        assert_eq!(
            parse_listen_address("API listening at [::]:50051").as_deref(),
            Some("127.0.0.1:50051")
        );
        assert_eq!(
            parse_listen_address(r#"{"level":"INFO","msg":"API listening at :50051"}"#).as_deref(),
            Some("127.0.0.1:50051")
        );
        assert_eq!(parse_listen_address("Supported chains: [ETH]"), None);
    }
}
