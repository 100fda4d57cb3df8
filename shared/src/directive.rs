//! Inbound Alexa Smart Home directive model.

use serde::Deserialize;
use serde_json::Value;

/// An inbound command envelope from the voice platform. Created per
/// request and discarded after handling.
#[derive(Debug, Clone, Deserialize)]
pub struct Directive {
    pub header: DirectiveHeader,
    pub endpoint: Option<DirectiveEndpoint>,
    #[serde(default)]
    pub payload: Value,
}

/// The (namespace, name) pair is the dispatch discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveHeader {
    pub namespace: String,
    pub name: String,
    pub payload_version: String,
    pub correlation_token: Option<String>,
    pub message_id: Option<String>,
}

/// The endpoint a directive targets, with its bearer-token scope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveEndpoint {
    pub endpoint_id: String,
    pub scope: Option<DirectiveScope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveScope {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub token: String,
}
