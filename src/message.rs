use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Server,
    Client,
}

/// One payload on the wire from server to client. Chat lines and system
/// notices share this shape; `origin` tells the receiver how to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub body: String,
    pub origin: Origin,
}

impl Message {
    pub fn new<S: Into<String>>(body: S, origin: Origin) -> Self {
        Self {
            body: body.into(),
            origin,
        }
    }

    pub fn server<S: Into<String>>(body: S) -> Self {
        Self::new(body, Origin::Server)
    }

    pub fn client<S: Into<String>>(body: S) -> Self {
        Self::new(body, Origin::Client)
    }

    /// Chat line authored by `username`, as every session sees it.
    pub fn chat(username: &str, body: &str) -> Self {
        Self::client(format!("{} > {}", username, body))
    }

    /// JSON encoding terminated by a newline.
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}
