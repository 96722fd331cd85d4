// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Gateway address parsing (spec §3 key format `family/gateway/path`, §4.1
//! "parsing `gateway` as `host[:port]`").
//!
//! `str_cmp_i`-style ambiguity aside, this is the one piece of string
//! handling `get_or_create` does before it ever touches the registry: split
//! the `host[:port]` the caller passed, fall back to the family's own
//! default port when none is given, and reject a port outside `1..=65535`
//! synchronously rather than letting a bogus value reach the socket layer.

use crate::error::{PlcError, PlcResult};

/// Splits `gateway` into `(host, port)`. `default_port` is used when
/// `gateway` carries no `:port` suffix. A port of `0` or greater than
/// `65535` is rejected with [`PlcError::BadGateway`], matching spec §4.1's
/// "reject >65535 or ≤0".
pub fn parse_gateway(gateway: &str, default_port: u16) -> PlcResult<(String, u16)> {
    let gateway = gateway.trim();
    if gateway.is_empty() {
        return Err(PlcError::BadGateway("empty gateway".into()));
    }

    match gateway.rsplit_once(':') {
        Some((host, port_str)) => {
            if host.is_empty() {
                return Err(PlcError::BadGateway(format!("missing host in {gateway:?}")));
            }
            let port: i64 = port_str
                .parse()
                .map_err(|_| PlcError::BadGateway(format!("bad port in {gateway:?}")))?;
            if port <= 0 || port > i64::from(u16::MAX) {
                return Err(PlcError::BadGateway(format!("port out of range in {gateway:?}")));
            }
            Ok((host.to_string(), port as u16))
        }
        None => {
            if default_port == 0 {
                return Err(PlcError::BadGateway(format!(
                    "{gateway:?} has no port and no default was given"
                )));
            }
            Ok((gateway.to_string(), default_port))
        }
    }
}

/// Builds the registry key `family/gateway/path` (spec §3, "PLC instance").
pub fn make_key(family: &str, gateway: &str, path: &str) -> String {
    format!("{family}/{gateway}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_uses_default_port() {
        assert_eq!(parse_gateway("10.0.0.1", 44818).unwrap(), ("10.0.0.1".to_string(), 44818));
    }

    #[test]
    fn host_and_port_overrides_default() {
        assert_eq!(parse_gateway("10.0.0.1:502", 44818).unwrap(), ("10.0.0.1".to_string(), 502));
    }

    #[test]
    fn rejects_zero_port() {
        assert!(parse_gateway("10.0.0.1:0", 44818).is_err());
    }

    #[test]
    fn rejects_port_above_65535() {
        assert!(parse_gateway("10.0.0.1:70000", 44818).is_err());
    }

    #[test]
    fn rejects_negative_port() {
        assert!(parse_gateway("10.0.0.1:-1", 44818).is_err());
    }

    #[test]
    fn rejects_empty_gateway() {
        assert!(parse_gateway("", 44818).is_err());
    }

    #[test]
    fn rejects_missing_host_before_colon() {
        assert!(parse_gateway(":502", 44818).is_err());
    }

    #[test]
    fn rejects_no_port_and_no_default() {
        assert!(parse_gateway("10.0.0.1", 0).is_err());
    }

    #[test]
    fn key_joins_family_gateway_path() {
        assert_eq!(make_key("eip", "10.0.0.1:44818", "1,0"), "eip/10.0.0.1:44818/1,0");
    }
}
