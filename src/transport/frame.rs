//! STOMP 1.2 frames as carried in WebSocket text messages.
//!
//! A frame is a command line, header lines, a blank line, the body and a
//! terminating NUL. A message consisting only of end-of-line characters is a
//! heartbeat.

use std::fmt::Write as _;

use crate::utils::error::ProtocolError;

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const SEND: &str = "SEND";
pub const DISCONNECT: &str = "DISCONNECT";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";
pub const ERROR: &str = "ERROR";

/// The heartbeat payload sent on an idle connection.
pub const HEARTBEAT: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value for `name`; repeated headers keep the first.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT and CONNECTED frames are exempt from header escaping.
    fn escapes_headers(command: &str) -> bool {
        command != CONNECT && command != CONNECTED
    }

    pub fn encode(&self) -> String {
        let escape = Self::escapes_headers(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                let _ = writeln!(out, "{}:{}", escape_header(name), escape_header(value));
            } else {
                let _ = writeln!(out, "{}:{}", name, value);
            }
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            let _ = writeln!(out, "content-length:{}", self.body.len());
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    pub fn parse(text: &str) -> Result<Frame, ProtocolError> {
        // heartbeats may precede the command
        let text = text.trim_start_matches(['\r', '\n']);
        let (head, rest) = split_head(text)
            .ok_or_else(|| ProtocolError::MalformedFrame("missing header terminator".into()))?;

        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command = match lines.next() {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => return Err(ProtocolError::MalformedFrame("missing command".into())),
        };
        let escape = Self::escapes_headers(&command);

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ProtocolError::MalformedFrame(format!("header without ':' in {command}: {line}"))
            })?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let body = match frame.get("content-length") {
            Some(len) => {
                let len: usize = len.trim().parse().map_err(|_| {
                    ProtocolError::MalformedFrame(format!("bad content-length '{len}'"))
                })?;
                rest.get(..len).ok_or_else(|| {
                    ProtocolError::MalformedFrame("body shorter than content-length".into())
                })?
            }
            None => {
                let end = rest.find('\0').ok_or_else(|| {
                    ProtocolError::MalformedFrame("missing NUL terminator".into())
                })?;
                &rest[..end]
            }
        };
        frame.body = body.to_string();
        Ok(frame)
    }
}

/// True when the message carries no frame, only end-of-line heartbeats.
pub fn is_heartbeat(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c == '\n' || c == '\r')
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    if let Some(idx) = text.find("\n\n") {
        let crlf = text.find("\r\n\r\n").filter(|&c| c < idx);
        return Some(match crlf {
            Some(c) => (&text[..c], &text[c + 4..]),
            None => (&text[..idx], &text[idx + 2..]),
        });
    }
    text.find("\r\n\r\n").map(|c| (&text[..c], &text[c + 4..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ProtocolError::MalformedFrame(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
