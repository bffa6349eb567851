//! Value types a schema node can declare, and the per-type matchers.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

/// Declared value type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Void,
    Text,
    Int,
    UInt,
    ULong,
    UIntRange,
    ULongRange,
    Bool,
    Ipv4,
    Ipv4Net,
    Ipv4Range,
    Ipv6,
    Ipv6Net,
    Ipv6Range,
    MacAddr,
    UrlFile,
    UrlFtp,
    UrlHttp,
    UrlTftp,
}

/// Reason a raw token was rejected by a type matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TypeError(pub String);

impl TypeError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Void => "void",
            NodeType::Text => "txt",
            NodeType::Int => "int",
            NodeType::UInt => "u32",
            NodeType::ULong => "u64",
            NodeType::UIntRange => "u32range",
            NodeType::ULongRange => "u64range",
            NodeType::Bool => "bool",
            NodeType::Ipv4 => "ipv4",
            NodeType::Ipv4Net => "ipv4net",
            NodeType::Ipv4Range => "ipv4range",
            NodeType::Ipv6 => "ipv6",
            NodeType::Ipv6Net => "ipv6net",
            NodeType::Ipv6Range => "ipv6range",
            NodeType::MacAddr => "macaddr",
            NodeType::UrlFile => "url_file",
            NodeType::UrlFtp => "url_ftp",
            NodeType::UrlHttp => "url_http",
            NodeType::UrlTftp => "url_tftp",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            NodeType::Int | NodeType::UInt | NodeType::ULong | NodeType::UIntRange | NodeType::ULongRange
        )
    }

    pub fn is_url(&self) -> bool {
        matches!(
            self,
            NodeType::UrlFile | NodeType::UrlFtp | NodeType::UrlHttp | NodeType::UrlTftp
        )
    }

    /// Check `raw` against this type and return its normalized form.
    ///
    /// Quotes are removed before matching. Allowed-value restrictions are
    /// applied by the schema node, not here.
    pub fn type_match(&self, raw: &str) -> Result<String, TypeError> {
        let value = unquote(raw);
        let value = value.as_str();
        match self {
            NodeType::Void => {
                if value.is_empty() {
                    Ok(String::new())
                } else {
                    Err(TypeError::new("node does not take a value"))
                }
            }
            NodeType::Text => Ok(value.to_string()),
            NodeType::Int => match_int(value).map(|v| v.to_string()),
            NodeType::UInt => match_unsigned(value, u64::from(u32::MAX)).map(|v| v.to_string()),
            NodeType::ULong => match_unsigned(value, u64::MAX).map(|v| v.to_string()),
            NodeType::UIntRange => match_unsigned_range(value, u64::from(u32::MAX), 32),
            NodeType::ULongRange => match_unsigned_range(value, u64::MAX, 64),
            NodeType::Bool => match value {
                "true" | "false" => Ok(value.to_string()),
                _ => Err(TypeError::new("value must be \"true\" or \"false\"")),
            },
            NodeType::Ipv4 => Ipv4Addr::from_str(value)
                .map(|a| a.to_string())
                .map_err(|_| TypeError::new("value must be an IP address in dotted decimal form")),
            NodeType::Ipv6 => Ipv6Addr::from_str(value)
                .map(|a| a.to_string())
                .map_err(|_| TypeError::new("value must be an IPv6 address")),
            NodeType::Ipv4Net => match_ipv4_net(value),
            NodeType::Ipv6Net => match_ipv6_net(value),
            NodeType::Ipv4Range => match_addr_range::<Ipv4Addr>(value, "IPv4"),
            NodeType::Ipv6Range => match_addr_range::<Ipv6Addr>(value, "IPv6"),
            NodeType::MacAddr => parse_mac(value).ok_or_else(|| {
                TypeError::new("value must be a MAC address (six hex digits separated by colons)")
            }),
            NodeType::UrlFile => match_url(value, "file", true),
            NodeType::UrlFtp => match_url(value, "ftp", false),
            NodeType::UrlHttp => match_url(value, "http", false),
            NodeType::UrlTftp => match_url(value, "tftp", false),
        }
    }

    /// Whether a bare token of syntactic class `class` may be offered to a
    /// node of this type. Quoted tokens always get a secondary parse.
    pub fn accepts_class(&self, class: NodeType) -> bool {
        if *self == class || *self == NodeType::Text || class == NodeType::Text || self.is_url() {
            return true;
        }
        match (self, class) {
            (t, NodeType::UInt | NodeType::Int | NodeType::UIntRange) if t.is_numeric() => true,
            (NodeType::Ipv4Range, NodeType::Ipv4) => true,
            (NodeType::Ipv6Range, NodeType::Ipv6) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "void" => NodeType::Void,
            "txt" | "text" => NodeType::Text,
            "int" | "i32" => NodeType::Int,
            "u32" | "uint" => NodeType::UInt,
            "u64" | "ulong" => NodeType::ULong,
            "u32range" => NodeType::UIntRange,
            "u64range" => NodeType::ULongRange,
            "bool" | "toggle" => NodeType::Bool,
            "ipv4" => NodeType::Ipv4,
            "ipv4net" => NodeType::Ipv4Net,
            "ipv4range" => NodeType::Ipv4Range,
            "ipv6" => NodeType::Ipv6,
            "ipv6net" => NodeType::Ipv6Net,
            "ipv6range" => NodeType::Ipv6Range,
            "macaddr" => NodeType::MacAddr,
            "url_file" => NodeType::UrlFile,
            "url_ftp" => NodeType::UrlFtp,
            "url_http" => NodeType::UrlHttp,
            "url_tftp" => NodeType::UrlTftp,
            other => return Err(TypeError(format!("unknown type \"{other}\""))),
        };
        Ok(ty)
    }
}

/// Syntactic class of a bare (unquoted) token.
pub fn classify(token: &str) -> NodeType {
    if token.is_empty() {
        return NodeType::Void;
    }
    if token == "true" || token == "false" {
        return NodeType::Bool;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return NodeType::UInt;
    }
    if let Some(rest) = token.strip_prefix('-') {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            return NodeType::Int;
        }
    }
    if let Some((lo, hi)) = token.split_once("..") {
        return match (classify(lo), classify(hi)) {
            (NodeType::UInt, NodeType::UInt) => NodeType::UIntRange,
            (NodeType::Ipv4, NodeType::Ipv4) => NodeType::Ipv4Range,
            (NodeType::Ipv6, NodeType::Ipv6) => NodeType::Ipv6Range,
            _ => NodeType::Text,
        };
    }
    if token.contains("://") {
        return match token.split_once("://").map(|(scheme, _)| scheme) {
            Some("file") => NodeType::UrlFile,
            Some("ftp") => NodeType::UrlFtp,
            Some("http") => NodeType::UrlHttp,
            Some("tftp") => NodeType::UrlTftp,
            _ => NodeType::Text,
        };
    }
    if let Some((addr, len)) = token.split_once('/') {
        let len_ok = !len.is_empty() && len.bytes().all(|b| b.is_ascii_digit());
        if len_ok && Ipv4Addr::from_str(addr).is_ok() {
            return NodeType::Ipv4Net;
        }
        if len_ok && Ipv6Addr::from_str(addr).is_ok() {
            return NodeType::Ipv6Net;
        }
        return NodeType::Text;
    }
    if Ipv4Addr::from_str(token).is_ok() {
        return NodeType::Ipv4;
    }
    if parse_mac(token).is_some() {
        return NodeType::MacAddr;
    }
    if Ipv6Addr::from_str(token).is_ok() {
        return NodeType::Ipv6;
    }
    NodeType::Text
}

/// Remove surrounding double quotes and undo `\"` / `\\` escapes.
pub fn unquote(s: &str) -> String {
    let inner = match s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) if s.len() >= 2 => inner,
        _ => return s.to_string(),
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Surround with double quotes, escaping embedded quotes and backslashes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn match_unsigned(value: &str, max: u64) -> Result<u64, TypeError> {
    if value.is_empty() {
        return Err(TypeError::new("value must be numeric"));
    }
    if let Some(c) = value.chars().find(|c| !c.is_ascii_digit()) {
        return Err(match c {
            '-' => TypeError::new("value cannot be negative"),
            '.' => TypeError::new("value must be an integer"),
            _ => TypeError::new("value must be numeric"),
        });
    }
    match value.parse::<u64>() {
        Ok(v) if v <= max => Ok(v),
        _ => Err(TypeError::new("value is out of range")),
    }
}

fn match_int(value: &str) -> Result<i32, TypeError> {
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() {
        return Err(TypeError::new("value must be an integer"));
    }
    if let Some(c) = digits.chars().find(|c| !c.is_ascii_digit()) {
        return Err(match c {
            '.' | '-' => TypeError::new("value must be an integer"),
            _ => TypeError::new("value must be numeric"),
        });
    }
    value
        .parse::<i32>()
        .map_err(|_| TypeError::new("value is out of range"))
}

fn match_unsigned_range(value: &str, max: u64, bits: u8) -> Result<String, TypeError> {
    let invalid = || TypeError(format!("value must be a valid range of unsigned {bits}-bit integers"));
    let (lo, hi) = value.split_once("..").unwrap_or((value, value));
    let lo = match_unsigned(lo, max).map_err(|_| invalid())?;
    let hi = match_unsigned(hi, max).map_err(|_| invalid())?;
    if lo > hi {
        return Err(TypeError::new("range lower bound exceeds upper bound"));
    }
    Ok(format!("{lo}..{hi}"))
}

fn match_ipv4_net(value: &str) -> Result<String, TypeError> {
    let form = || TypeError::new("value must be an IPv4 subnet in address/prefix-length form");
    let (addr, len) = value.split_once('/').ok_or_else(form)?;
    let addr = Ipv4Addr::from_str(addr).map_err(|_| form())?;
    let len = parse_prefix_len(len, 32)?;
    let bits = u32::from(addr);
    let mask = if len == 0 { 0 } else { u32::MAX << (32 - u32::from(len)) };
    if bits & mask != bits {
        return Err(TypeError::new(
            "there is a mismatch between the masked address value and the prefix length",
        ));
    }
    Ok(format!("{addr}/{len}"))
}

fn match_ipv6_net(value: &str) -> Result<String, TypeError> {
    let form = || TypeError::new("value must be an IPv6 subnet in address/prefix-length form");
    let (addr, len) = value.split_once('/').ok_or_else(form)?;
    let addr = Ipv6Addr::from_str(addr).map_err(|_| form())?;
    let len = parse_prefix_len(len, 128)?;
    let bits = u128::from(addr);
    let mask = if len == 0 { 0 } else { u128::MAX << (128 - u32::from(len)) };
    if bits & mask != bits {
        return Err(TypeError::new(
            "there is a mismatch between the masked address value and the prefix length",
        ));
    }
    Ok(format!("{addr}/{len}"))
}

fn parse_prefix_len(len: &str, max: u8) -> Result<u8, TypeError> {
    let err = || TypeError(format!("prefix length must be an integer between 0 and {max}"));
    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    match len.parse::<u8>() {
        Ok(v) if v <= max => Ok(v),
        _ => Err(err()),
    }
}

fn match_addr_range<A>(value: &str, family: &str) -> Result<String, TypeError>
where
    A: FromStr + Ord + fmt::Display,
{
    let form = || TypeError(format!("value must be an {family} range in address..address form"));
    let (lo, hi) = value.split_once("..").unwrap_or((value, value));
    let lo = A::from_str(lo).map_err(|_| form())?;
    let hi = A::from_str(hi).map_err(|_| form())?;
    if lo > hi {
        return Err(TypeError::new("range lower bound exceeds upper bound"));
    }
    Ok(format!("{lo}..{hi}"))
}

fn parse_mac(value: &str) -> Option<String> {
    let octets: Vec<&str> = value.split(':').collect();
    if octets.len() != 6 {
        return None;
    }
    let mut normalized = Vec::with_capacity(6);
    for octet in octets {
        if octet.is_empty() || octet.len() > 2 {
            return None;
        }
        let byte = u8::from_str_radix(octet, 16).ok()?;
        normalized.push(format!("{byte:02x}"));
    }
    Some(normalized.join(":"))
}

fn match_url(value: &str, scheme: &str, allow_bare_path: bool) -> Result<String, TypeError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == scheme => Ok(value.to_string()),
        _ if allow_bare_path && !value.is_empty() && !value.contains("://") => Ok(value.to_string()),
        _ => Err(TypeError(format!("value must be a {scheme} URL"))),
    }
}
