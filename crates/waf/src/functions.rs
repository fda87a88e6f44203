//! String transforms and the CIDR predicate exposed to rules.
//!
//! Everything here is a plain function over strings so it can be tested
//! without an expression environment. The bindings that adapt these to
//! engine values live at the bottom of the module.

use std::fmt::Write as _;
use std::net::IpAddr;

use armor_rules::{RuleError, Value};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::{DecodeError, Engine as _};
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// A transform rejected its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("{0}")]
    Base64(String),

    #[error("invalid URL escape {0:?}")]
    InvalidEscape(String),

    #[error("invalid URL escape sequence")]
    InvalidEscapeSequence,

    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("invalid IP range: {0}")]
    InvalidRange(String),
}

impl From<FunctionError> for RuleError {
    fn from(err: FunctionError) -> Self {
        Self::Function(err.to_string())
    }
}

/// Lowercase ASCII letters, leaving every other code point untouched.
pub fn lower_ascii(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// Uppercase ASCII letters, leaving every other code point untouched.
pub fn upper_ascii(s: &str) -> String {
    s.to_ascii_uppercase()
}

/// Decode standard-alphabet base64, accepting both padded and unpadded
/// input. Bytes that are not valid UTF-8 are replaced with U+FFFD.
pub fn base64_decode(s: &str) -> Result<String, FunctionError> {
    let bytes = match STANDARD.decode(s) {
        Ok(bytes) => bytes,
        Err(
            DecodeError::InvalidByte(..)
            | DecodeError::InvalidPadding
            | DecodeError::InvalidLastSymbol(..),
        ) => STANDARD_NO_PAD
            .decode(s)
            .map_err(|e| FunctionError::Base64(e.to_string()))?,
        Err(e) => return Err(FunctionError::Base64(e.to_string())),
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Strict percent-decoding. Every `%` must start a two-digit hex escape;
/// `+` is left as is.
pub fn url_decode(s: &str) -> Result<String, FunctionError> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while let Some(offset) = bytes[i..].iter().position(|&b| b == b'%') {
        let start = i + offset;
        let escape = bytes.get(start + 1..start + 3);
        if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
            let end = (start + 3).min(bytes.len());
            return Err(FunctionError::InvalidEscape(
                String::from_utf8_lossy(&bytes[start..end]).into_owned(),
            ));
        }
        i = start + 3;
    }
    Ok(percent_decode_str(s).decode_utf8_lossy().into_owned())
}

/// IIS-style decoding: `%uXXXX` code points, `%XX` bytes, and `+` as space.
///
/// A `%` that does not start a valid byte escape is copied literally. A
/// `%u` escape that is truncated or not followed by four hex digits is an
/// error, as is a trailing `%` with fewer than two characters after it.
/// A `%u` escape naming a surrogate is treated like any other non-byte
/// escape and its `%` is copied.
pub fn url_decode_uni(s: &str) -> Result<String, FunctionError> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let next = *bytes
                    .get(i + 1)
                    .ok_or(FunctionError::InvalidEscapeSequence)?;
                if matches!(next, b'u' | b'U') {
                    let digits = bytes
                        .get(i + 2..i + 6)
                        .ok_or(FunctionError::InvalidEscapeSequence)?;
                    let code = hex_value(digits).ok_or(FunctionError::InvalidEscapeSequence)?;
                    if let Some(c) = char::from_u32(code) {
                        let mut buf = [0; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        i += 6;
                        continue;
                    }
                }
                let escape = bytes
                    .get(i + 1..i + 3)
                    .ok_or(FunctionError::InvalidEscapeSequence)?;
                if let Some(byte) = hex_value(escape).and_then(|v| u8::try_from(v).ok()) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn hex_value(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0_u32, |acc, &b| {
        char::from(b).to_digit(16).map(|d| (acc << 4) | d)
    })
}

/// Re-encode every non-ASCII code point as `%u` followed by lowercase hex.
///
/// The low four hex digits are always written. A fifth digit is written
/// when the code point exceeds `0xffff` and a sixth when it exceeds
/// `0xfffff`.
pub fn utf8_to_unicode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        let code = u32::from(c);
        match code {
            0..0x80 | 0xd800..=0xdfff | 0x11_0000.. => out.push(c),
            _ => write_unicode_escape(&mut out, code),
        }
    }
    out
}

fn write_unicode_escape(out: &mut String, code: u32) {
    out.push_str("%u");
    if code > 0xf_ffff {
        let _ = write!(out, "{:x}", code >> 20);
    }
    if code > 0xffff {
        let _ = write!(out, "{:x}", (code >> 16) & 0xf);
    }
    let _ = write!(out, "{:04x}", code & 0xffff);
}

/// Whether `ip` falls inside the network `range` (CIDR notation).
///
/// IPv4-mapped IPv6 addresses are matched against IPv4 networks. An IPv4
/// address never falls inside an IPv6 network.
pub fn in_ip_range(ip: &str, range: &str) -> Result<bool, FunctionError> {
    let addr: IpAddr = ip
        .parse()
        .map_err(|_| FunctionError::InvalidAddress(ip.to_owned()))?;
    let (network, prefix) = parse_cidr(range)
        .ok_or_else(|| FunctionError::InvalidRange(range.to_owned()))?;

    let addr = match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
        v4 @ IpAddr::V4(_) => v4,
    };
    Ok(match (addr, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            u32::from(a) & mask == u32::from(n) & mask
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            u128::from(a) & mask == u128::from(n) & mask
        }
        _ => false,
    })
}

fn parse_cidr(range: &str) -> Option<(IpAddr, u32)> {
    let (addr, prefix) = range.split_once('/')?;
    let network: IpAddr = addr.parse().ok()?;
    let digits = prefix.bytes().all(|b| b.is_ascii_digit());
    if prefix.is_empty() || !digits || (prefix.len() > 1 && prefix.starts_with('0')) {
        return None;
    }
    let prefix: u32 = prefix.parse().ok()?;
    let max = if network.is_ipv4() { 32 } else { 128 };
    (prefix <= max).then_some((network, prefix))
}

// Engine bindings. The checker guarantees string arguments; anything else
// reaching these is reported as a missing overload.

fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> Result<&'a str, RuleError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(RuleError::NoSuchOverload {
            function: function.to_owned(),
            args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
        }),
    }
}

pub(crate) fn lower_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(lower_ascii(string_arg("lower", args, 0)?)))
}

pub(crate) fn upper_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(upper_ascii(string_arg("upper", args, 0)?)))
}

pub(crate) fn base64_decode_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(base64_decode(string_arg("base64Decode", args, 0)?)?))
}

pub(crate) fn url_decode_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(url_decode(string_arg("urlDecode", args, 0)?)?))
}

pub(crate) fn url_decode_uni_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(url_decode_uni(string_arg("urlDecodeUni", args, 0)?)?))
}

pub(crate) fn utf8_to_unicode_binding(args: &[Value]) -> Result<Value, RuleError> {
    Ok(Value::String(utf8_to_unicode(string_arg("utf8ToUnicode", args, 0)?)))
}

pub(crate) fn in_ip_range_binding(args: &[Value]) -> Result<Value, RuleError> {
    let ip = string_arg("inIpRange", args, 0)?;
    let range = string_arg("inIpRange", args, 1)?;
    Ok(Value::Bool(in_ip_range(ip, range)?))
}
