//! Per-connection client context
//!
//! The listener creates one `ClientContext` per accepted connection and
//! hands it to every request served on that connection. It carries what the
//! broker learned about the client across requests: its client id, which
//! listener it connected to, and its member id in each group it joined.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    /// From the most recent request header
    pub client_id: String,
    /// Remote host of the connection
    pub host: String,
    /// Local port the client connected to; identifies the serving broker
    pub server_port: i32,
    /// Group name -> member id assigned on this connection
    pub members: HashMap<String, String>,
    /// Last `allow_auto_topic_creation` sent in a Metadata request
    pub allow_auto_topic_creation: bool,
}

impl ClientContext {
    pub fn new(host: impl Into<String>, server_port: i32) -> Self {
        Self {
            host: host.into(),
            server_port,
            ..Default::default()
        }
    }

    pub fn member_id(&self, group: &str) -> Option<&str> {
        self.members.get(group).map(String::as_str)
    }

    pub fn set_member_id(&mut self, group: &str, member_id: impl Into<String>) {
        self.members.insert(group.to_string(), member_id.into());
    }
}
