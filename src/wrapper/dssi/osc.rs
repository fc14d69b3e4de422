//! A minimal OSC 1.0 codec, covering the message types DSSI hosts and UIs exchange. Bundles and
//! the less common type tags are not supported.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("the packet is truncated")]
    Truncated,
    #[error("the packet contains an unterminated or non-UTF-8 string")]
    InvalidString,
    #[error("the type tag string does not start with ','")]
    MissingTypeTags,
    #[error("unsupported OSC type tag '{0}'")]
    UnsupportedType(char),
    #[error("OSC bundles are not supported")]
    Bundle,
    #[error("'{0}' is not a valid 'osc.udp://host:port/path' URL")]
    InvalidUrl(String),
}

/// A single OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
    /// A MIDI message as `[port, status, data1, data2]`.
    Midi([u8; 4]),
}

impl OscArg {
    fn type_tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::String(_) => 's',
            OscArg::Midi(_) => 'm',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub path: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    /// The message's type tags without the leading comma, e.g. `if` for a `/control` message.
    pub fn type_tags(&self) -> String {
        self.args.iter().map(OscArg::type_tag).collect()
    }

    pub fn int(&self, index: usize) -> Option<i32> {
        match self.args.get(index) {
            Some(OscArg::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn float(&self, index: usize) -> Option<f32> {
        match self.args.get(index) {
            Some(OscArg::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        match self.args.get(index) {
            Some(OscArg::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn midi(&self, index: usize) -> Option<[u8; 4]> {
        match self.args.get(index) {
            Some(OscArg::Midi(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(64);
        write_string(&mut packet, &self.path);
        write_string(&mut packet, &format!(",{}", self.type_tags()));
        for arg in &self.args {
            match arg {
                OscArg::Int(value) => packet.extend_from_slice(&value.to_be_bytes()),
                OscArg::Float(value) => packet.extend_from_slice(&value.to_be_bytes()),
                OscArg::String(value) => write_string(&mut packet, value),
                OscArg::Midi(value) => packet.extend_from_slice(value),
            }
        }

        packet
    }

    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        if packet.starts_with(b"#bundle") {
            return Err(OscError::Bundle);
        }

        let mut reader = Reader { data: packet };
        let path = reader.string()?;

        // Some old implementations omit the type tag string for messages without arguments
        if reader.data.is_empty() {
            return Ok(Self::new(path));
        }

        let type_tags = reader.string()?;
        let type_tags = type_tags
            .strip_prefix(',')
            .ok_or(OscError::MissingTypeTags)?;

        let mut args = Vec::with_capacity(type_tags.len());
        for tag in type_tags.chars() {
            args.push(match tag {
                'i' => OscArg::Int(i32::from_be_bytes(reader.bytes4()?)),
                'f' => OscArg::Float(f32::from_be_bytes(reader.bytes4()?)),
                's' => OscArg::String(reader.string()?),
                'm' => OscArg::Midi(reader.bytes4()?),
                tag => return Err(OscError::UnsupportedType(tag)),
            });
        }

        Ok(Self { path, args })
    }
}

/// Write a NUL-terminated string, padded with NUL bytes to a multiple of four bytes.
fn write_string(packet: &mut Vec<u8>, value: &str) {
    packet.extend_from_slice(value.as_bytes());
    let padding = 4 - (value.len() % 4);
    packet.extend(std::iter::repeat(0).take(padding));
}

struct Reader<'a> {
    data: &'a [u8],
}

impl Reader<'_> {
    fn bytes4(&mut self) -> Result<[u8; 4], OscError> {
        if self.data.len() < 4 {
            return Err(OscError::Truncated);
        }

        let (bytes, rest) = self.data.split_at(4);
        self.data = rest;

        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn string(&mut self) -> Result<String, OscError> {
        let len = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or(OscError::InvalidString)?;
        let value = std::str::from_utf8(&self.data[..len])
            .map_err(|_| OscError::InvalidString)?
            .to_owned();

        let padded_len = (len / 4 + 1) * 4;
        self.data = self.data.get(padded_len..).ok_or(OscError::Truncated)?;

        Ok(value)
    }
}

/// The parts of an `osc.udp://host:port/path` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscUrl {
    pub host: String,
    pub port: u16,
    /// Always starts with a slash, and never ends with one.
    pub path: String,
}

impl OscUrl {
    pub fn parse(url: &str) -> Result<Self, OscError> {
        let invalid = || OscError::InvalidUrl(url.to_owned());

        let rest = url.strip_prefix("osc.udp://").ok_or_else(invalid)?;
        let (authority, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, ""),
        };
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }

        let path = path.trim_end_matches('/');
        Ok(Self {
            host: host.to_owned(),
            port,
            path: if path.is_empty() {
                String::new()
            } else {
                path.to_owned()
            },
        })
    }

    /// `path` appended to this URL's path, e.g. `/dssi/plugin/control`.
    pub fn method(&self, method: &str) -> String {
        format!("{}/{}", self.path, method)
    }
}

impl std::fmt::Display for OscUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "osc.udp://{}:{}{}", self.host, self.port, self.path)
    }
}
