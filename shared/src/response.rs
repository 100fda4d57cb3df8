//! Alexa Smart Home response envelope builder.
//!
//! Assembles the v3 response envelope from high-level intent. Builder
//! operations never fail: missing or empty option values fall back to
//! their documented defaults so the skill always produces *a* response.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Response envelope header.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
    pub payload_version: String,
}

/// Bearer-token scope attached to a response endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub token: String,
}

/// The endpoint a response concerns.
///
/// Absent entirely for `AcceptGrant.Response` and `Discover.Response`;
/// carries no `scope` for `StateReport`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEndpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    pub cookie: Map<String, Value>,
    pub endpoint_id: String,
}

/// The `event` half of the response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub header: Header,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<ResponseEndpoint>,
    pub payload: Value,
}

/// A point-in-time observed state value attached to a response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextProperty {
    pub namespace: String,
    pub name: String,
    pub value: Value,
    pub time_of_sample: String,
    pub uncertainty_in_milliseconds: u64,
}

/// The `context` half of the response envelope. Properties are append-only
/// and insertion order is preserved; the receiving system treats the first
/// property as the primary sensor state.
#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub properties: Vec<ContextProperty>,
}

/// A declared feature-interface an endpoint supports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(rename = "type")]
    pub capability_type: String,
    pub interface: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<CapabilityProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_intents: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proactively_reported: Option<bool>,
}

/// Property support block within a capability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProperties {
    pub supported: Vec<SupportedProperty>,
    pub proactively_reported: bool,
    pub retrievable: bool,
}

/// A named property within a capability's `supported` list.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedProperty {
    pub name: String,
}

impl SupportedProperty {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A device descriptor within a `Discover.Response` payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub capabilities: Vec<Capability>,
    pub description: String,
    pub display_categories: Vec<String>,
    pub endpoint_id: String,
    pub friendly_name: String,
    pub manufacturer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<Map<String, Value>>,
}

/// Options for [`AlexaResponse::new`]. Every field is optional; `None` or
/// an empty string resolves to the stated default. Supplying `event`
/// bypasses assembly and is used verbatim.
#[derive(Debug, Default)]
pub struct ResponseOptions {
    /// Default `"Alexa"`
    pub namespace: Option<String>,
    /// Default `"Response"`
    pub name: Option<String>,
    /// Default: freshly generated UUID
    pub message_id: Option<String>,
    /// Default: absent
    pub correlation_token: Option<String>,
    /// Default `"3"`
    pub payload_version: Option<String>,
    /// Bearer token, default `"INVALID"`
    pub token: Option<String>,
    /// Default: empty map
    pub cookie: Option<Map<String, Value>>,
    /// Default `"INVALID"`
    pub endpoint_id: Option<String>,
    /// Default: empty object
    pub payload: Option<Value>,
    /// Pre-built event, used verbatim when present
    pub event: Option<Event>,
    /// Pre-built context, used verbatim when present
    pub context: Option<Context>,
}

/// Options for [`AlexaResponse::add_context_property`].
#[derive(Debug, Default)]
pub struct ContextPropertyOptions {
    /// Default `"Alexa.EndpointHealth"`
    pub namespace: Option<String>,
    /// Default `"connectivity"`
    pub name: Option<String>,
    /// Default `{"value": "OK"}`
    pub value: Option<Value>,
    /// Default 0
    pub uncertainty_in_milliseconds: Option<u64>,
}

/// Options for [`AlexaResponse::add_payload_endpoint`].
#[derive(Debug, Default)]
pub struct EndpointOptions {
    pub capabilities: Option<Vec<Capability>>,
    /// Default `"Control Roku TV with Alexa"`
    pub description: Option<String>,
    /// Default `["TV"]`
    pub display_categories: Option<Vec<String>>,
    /// Default `"endpoint-001"`
    pub endpoint_id: Option<String>,
    /// Default `"TV"`
    pub friendly_name: Option<String>,
    /// Default `"Roku"`
    pub manufacturer_name: Option<String>,
    /// Emitted only when supplied
    pub cookie: Option<Map<String, Value>>,
}

/// Options for [`Capability::new`].
#[derive(Debug, Default)]
pub struct CapabilityOptions {
    /// Default `"AlexaInterface"`
    pub capability_type: Option<String>,
    /// Default `"Alexa"`
    pub interface: Option<String>,
    /// Default `"3"`
    pub version: Option<String>,
    /// When present, emits the `properties` block
    pub supported: Option<Vec<SupportedProperty>>,
    /// Within `properties` defaults to true; bare flag otherwise
    pub proactively_reported: Option<bool>,
    /// Default true (within `properties`)
    pub retrievable: Option<bool>,
    pub supported_operations: Option<Vec<String>>,
    pub supported_intents: Option<Vec<Value>>,
}

/// Resolve an optional string, treating empty strings as missing.
fn resolve(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// An optional field stays absent when missing or empty.
fn resolve_opt(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Capability {
    /// Build a capability descriptor. Pure; never fails.
    pub fn new(opts: CapabilityOptions) -> Self {
        let bare_flag = opts.supported.is_none();
        let properties = opts.supported.map(|supported| CapabilityProperties {
            supported,
            proactively_reported: opts.proactively_reported.unwrap_or(true),
            retrievable: opts.retrievable.unwrap_or(true),
        });

        Self {
            capability_type: resolve(opts.capability_type, "AlexaInterface"),
            interface: resolve(opts.interface, "Alexa"),
            version: resolve(opts.version, "3"),
            properties,
            supported_operations: opts.supported_operations,
            supported_intents: opts.supported_intents,
            proactively_reported: if bare_flag {
                opts.proactively_reported
            } else {
                None
            },
        }
    }
}

impl Endpoint {
    /// Build an endpoint descriptor from options, applying defaults.
    pub fn new(opts: EndpointOptions) -> Self {
        Self {
            capabilities: opts.capabilities.unwrap_or_default(),
            description: resolve(opts.description, "Control Roku TV with Alexa"),
            display_categories: opts
                .display_categories
                .unwrap_or_else(|| vec!["TV".to_string()]),
            endpoint_id: resolve(opts.endpoint_id, "endpoint-001"),
            friendly_name: resolve(opts.friendly_name, "TV"),
            manufacturer_name: resolve(opts.manufacturer_name, "Roku"),
            cookie: opts.cookie,
        }
    }
}

/// An Alexa Smart Home v3 response envelope, built incrementally and
/// handed off immutable once serialized.
#[derive(Debug, Clone, Serialize)]
pub struct AlexaResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    pub event: Event,
}

impl AlexaResponse {
    /// Construct a response envelope from options.
    pub fn new(opts: ResponseOptions) -> Self {
        if let Some(event) = opts.event {
            return Self {
                context: opts.context,
                event,
            };
        }

        let name = resolve(opts.name, "Response");

        // No endpoint concept applies to authorization/discovery responses,
        // and state reports carry no nested auth scope.
        let endpoint = match name.as_str() {
            "AcceptGrant.Response" | "Discover.Response" => None,
            _ => Some(ResponseEndpoint {
                scope: if name == "StateReport" {
                    None
                } else {
                    Some(Scope {
                        scope_type: "BearerToken".to_string(),
                        token: resolve(opts.token, "INVALID"),
                    })
                },
                cookie: opts.cookie.unwrap_or_default(),
                endpoint_id: resolve(opts.endpoint_id, "INVALID"),
            }),
        };

        Self {
            context: opts.context,
            event: Event {
                header: Header {
                    namespace: resolve(opts.namespace, "Alexa"),
                    name,
                    message_id: resolve_opt(opts.message_id)
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                    correlation_token: resolve_opt(opts.correlation_token),
                    payload_version: resolve(opts.payload_version, "3"),
                },
                endpoint,
                payload: opts.payload.unwrap_or_else(|| json!({})),
            },
        }
    }

    /// Shorthand for a well-formed `ErrorResponse` envelope.
    pub fn error(error_type: &str, message: &str) -> Self {
        Self::new(ResponseOptions {
            name: Some("ErrorResponse".to_string()),
            payload: Some(json!({ "type": error_type, "message": message })),
            ..Default::default()
        })
    }

    /// Append a property to the context, stamping `timeOfSample` with the
    /// current instant. Call order is preserved.
    pub fn add_context_property(&mut self, opts: ContextPropertyOptions) {
        let context = self.context.get_or_insert_with(|| Context {
            properties: Vec::new(),
        });
        context.properties.push(ContextProperty {
            namespace: resolve(opts.namespace, "Alexa.EndpointHealth"),
            name: resolve(opts.name, "connectivity"),
            value: opts.value.unwrap_or_else(|| json!({ "value": "OK" })),
            time_of_sample: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uncertainty_in_milliseconds: opts.uncertainty_in_milliseconds.unwrap_or(0),
        });
    }

    /// Append an endpoint descriptor to `payload.endpoints`.
    pub fn add_payload_endpoint(&mut self, opts: EndpointOptions) {
        let endpoint = Endpoint::new(opts);

        if !self.event.payload.is_object() {
            self.event.payload = Value::Object(Map::new());
        }
        if let Some(payload) = self.event.payload.as_object_mut() {
            let endpoints = payload
                .entry("endpoints")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let (Value::Array(list), Ok(value)) = (endpoints, serde_json::to_value(&endpoint)) {
                list.push(value);
            }
        }
    }
}
