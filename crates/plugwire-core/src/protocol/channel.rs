//! Conversation context attached to an envelope.
//!
//! Purely advisory: neither the codec nor the router interprets it. The
//! dispatcher copies a request's channel onto its response.

use serde::{Deserialize, Serialize};

/// Kind of conversation a channel represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// Multi-user conversation.
    Group,
    /// One-on-one conversation.
    Direct,
    /// Restricted or hidden conversation.
    Private,
}

/// Logical conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier.
    pub id: String,
    /// Channel kind (field name is `type` on the wire).
    #[serde(rename = "type")]
    pub ty: ChannelType,
    /// Display name.
    pub name: String,
    /// Parent channel, e.g. the group a direct conversation started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Account the channel is observed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_id: Option<String>,
}

impl Channel {
    pub fn new(id: impl Into<String>, ty: ChannelType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ty,
            name: name.into(),
            parent_id: None,
            self_id: None,
        }
    }

    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, ChannelType::Group, name)
    }

    pub fn direct(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, ChannelType::Direct, name)
    }

    pub fn private(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, ChannelType::Private, name)
    }

    /// Direct conversation that originated inside a group.
    pub fn direct_from_group(
        group_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::direct(id, name).with_parent(group_id)
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_self_id(mut self, self_id: impl Into<String>) -> Self {
        self.self_id = Some(self_id.into());
        self
    }
}
