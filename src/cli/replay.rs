//! Frame files for `netsift replay`
//!
//! One frame per line:
//!
//! ```text
//! # comment
//! egress netns=4026531840 0000000000000000000000000800 4500...
//! ingress ffffffffffff...
//! ```
//!
//! The first token names the hook. An optional `netns=<id>` token follows;
//! every remaining token is hex and the tokens are concatenated, so bytes
//! may be grouped freely. `:` separators inside a token are ignored.

use crate::{NetsiftError, Result};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Ingress,
    Egress,
    Socket,
}

impl FromStr for Hook {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ingress" => Ok(Hook::Ingress),
            "egress" => Ok(Hook::Egress),
            "socket" => Ok(Hook::Socket),
            other => Err(format!("unknown hook {:?}", other)),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Ingress => write!(f, "ingress"),
            Hook::Egress => write!(f, "egress"),
            Hook::Socket => write!(f, "socket"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based line number in the source file
    pub line: usize,
    pub hook: Hook,
    pub netns: u32,
    pub bytes: Bytes,
}

pub fn parse_frames(text: &str) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        frames.push(parse_line(line, content)?);
    }
    Ok(frames)
}

fn parse_line(line: usize, content: &str) -> Result<Frame> {
    let invalid = |reason: String| NetsiftError::InvalidFrame { line, reason };

    let mut tokens = content.split_whitespace();
    let hook = tokens
        .next()
        .ok_or_else(|| invalid("missing hook".to_string()))?
        .parse::<Hook>()
        .map_err(invalid)?;

    let mut netns = 0;
    let mut hex_text = String::new();
    for token in tokens {
        if let Some(value) = token.strip_prefix("netns=") {
            netns = value
                .parse()
                .map_err(|e| invalid(format!("bad netns {:?}: {}", value, e)))?;
        } else {
            hex_text.extend(token.chars().filter(|c| *c != ':'));
        }
    }

    if hex_text.is_empty() {
        return Err(invalid("no frame bytes".to_string()));
    }
    let bytes = hex::decode(&hex_text).map_err(|e| invalid(e.to_string()))?;

    Ok(Frame {
        line,
        hook,
        netns,
        bytes: Bytes::from(bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frames() {
        let text = "\
# capture
egress netns=7 0a0b 0c:0d

ingress ff # trailing comment
socket 00
";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].hook, Hook::Egress);
        assert_eq!(frames[0].netns, 7);
        assert_eq!(frames[0].line, 2);
        assert_eq!(&frames[0].bytes[..], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(frames[1].hook, Hook::Ingress);
        assert_eq!(frames[1].netns, 0);
        assert_eq!(frames[2].hook, Hook::Socket);
    }

    #[test]
    fn test_errors_name_the_line() {
        let err = parse_frames("ingress 00\nbogus 00\n").unwrap_err();
        assert!(matches!(err, NetsiftError::InvalidFrame { line: 2, .. }));

        assert!(matches!(
            parse_frames("egress abc"),
            Err(NetsiftError::InvalidFrame { line: 1, .. })
        ));
        assert!(matches!(
            parse_frames("egress netns=x 00"),
            Err(NetsiftError::InvalidFrame { .. })
        ));
        assert!(matches!(
            parse_frames("socket"),
            Err(NetsiftError::InvalidFrame { .. })
        ));
    }
}
