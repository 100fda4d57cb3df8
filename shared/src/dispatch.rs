//! Directive dispatch: classify an inbound directive by (namespace, name),
//! drive the collaborators, and produce the response envelope.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::directive::Directive;
use crate::response::{
    AlexaResponse, Capability, CapabilityOptions, ContextPropertyOptions, EndpointOptions,
    ResponseOptions, SupportedProperty,
};
use crate::store::TokenStore;
use crate::wyze::{Device, DeviceApi};
use crate::{Error, Result};

const CONTACT_SENSOR: &str = "ContactSensor";

/// Endpoint id derived from a device nickname: lowercase, whitespace
/// stripped, `-01` suffix. Duplicate nicknames collide silently.
fn endpoint_id(nickname: &str) -> String {
    let slug: String = nickname.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{}-01", slug.to_lowercase())
}

/// Handles one directive per call. Collaborators are injected so tests can
/// substitute doubles; the handles themselves live for the process.
pub struct Dispatcher {
    tokens: Arc<dyn TokenStore>,
    api: Arc<dyn DeviceApi>,
}

impl Dispatcher {
    pub fn new(tokens: Arc<dyn TokenStore>, api: Arc<dyn DeviceApi>) -> Self {
        Self { tokens, api }
    }

    /// Handle one inbound envelope. Malformed envelopes and unsupported
    /// directives come back as `ErrorResponse`; collaborator failures
    /// propagate and fail the invocation.
    pub async fn handle(&self, event: &Value) -> Result<AlexaResponse> {
        let Some(raw) = event.get("directive") else {
            return Ok(AlexaResponse::error(
                "INVALID_DIRECTIVE",
                "Missing key: directive, Is request a valid Alexa directive?",
            ));
        };

        if raw.pointer("/header/payloadVersion").and_then(Value::as_str) != Some("3") {
            return Ok(AlexaResponse::error(
                "INTERNAL_ERROR",
                "This skill only supports Smart Home API version 3",
            ));
        }

        let directive: Directive = serde_json::from_value(raw.clone())?;
        let namespace = directive.header.namespace.to_lowercase();

        match (namespace.as_str(), directive.header.name.as_str()) {
            ("alexa.authorization", _) => self.accept_grant(&directive),
            ("alexa.discovery", _) => self.discover().await,
            ("alexa", "ReportState") => self.report_state(&directive).await,
            _ => Ok(AlexaResponse::error(
                "INVALID_DIRECTIVE",
                &format!(
                    "Unsupported directive: {}/{}",
                    directive.header.namespace, directive.header.name
                ),
            )),
        }
    }

    /// Accept an authorization grant. The grantee token is accepted but not
    /// exchanged; device calls authenticate with the Wyze credentials.
    fn accept_grant(&self, directive: &Directive) -> Result<AlexaResponse> {
        let grantee = directive
            .payload
            .pointer("/grantee/token")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(token = grantee, "Received authorization grant");

        Ok(AlexaResponse::new(ResponseOptions {
            namespace: Some("Alexa.Authorization".to_string()),
            name: Some("AcceptGrant.Response".to_string()),
            ..Default::default()
        }))
    }

    /// Report every contact sensor on the account as an endpoint.
    async fn discover(&self) -> Result<AlexaResponse> {
        let mut response = AlexaResponse::new(ResponseOptions {
            namespace: Some("Alexa.Discovery".to_string()),
            name: Some("Discover.Response".to_string()),
            ..Default::default()
        });

        let alexa = Capability::new(CapabilityOptions::default());
        let contact_sensor = Capability::new(CapabilityOptions {
            interface: Some("Alexa.ContactSensor".to_string()),
            supported: Some(vec![SupportedProperty::new("detectionState")]),
            ..Default::default()
        });
        let endpoint_health = Capability::new(CapabilityOptions {
            interface: Some("Alexa.EndpointHealth".to_string()),
            supported: Some(vec![SupportedProperty::new("connectivity")]),
            ..Default::default()
        });

        for device in self.contact_sensors().await? {
            response.add_payload_endpoint(EndpointOptions {
                endpoint_id: Some(endpoint_id(&device.nickname)),
                friendly_name: Some(device.nickname.clone()),
                description: Some(format!(
                    "Check the {} status",
                    device.nickname.to_lowercase()
                )),
                manufacturer_name: Some("Wyze".to_string()),
                display_categories: Some(vec!["CONTACT_SENSOR".to_string()]),
                capabilities: Some(vec![
                    alexa.clone(),
                    contact_sensor.clone(),
                    endpoint_health.clone(),
                ]),
                ..Default::default()
            });
        }

        Ok(response)
    }

    /// Report the live open/close state of one endpoint.
    async fn report_state(&self, directive: &Directive) -> Result<AlexaResponse> {
        let endpoint = directive
            .endpoint
            .as_ref()
            .ok_or_else(|| Error::Validation("ReportState directive has no endpoint".to_string()))?;
        let token = endpoint.scope.as_ref().map(|scope| scope.token.clone());

        let device = self.find_device(&endpoint.endpoint_id).await?;
        let detection = if device.device_params.open_close_state == 0 {
            "NOT_DETECTED"
        } else {
            "DETECTED"
        };

        let mut response = AlexaResponse::new(ResponseOptions {
            name: Some("StateReport".to_string()),
            endpoint_id: Some(endpoint.endpoint_id.clone()),
            token,
            correlation_token: directive.header.correlation_token.clone(),
            ..Default::default()
        });

        // The contact reading first; the receiver treats it as primary.
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.ContactSensor".to_string()),
            name: Some("detectionState".to_string()),
            value: Some(json!(detection)),
            ..Default::default()
        });
        response.add_context_property(ContextPropertyOptions {
            namespace: Some("Alexa.EndpointHealth".to_string()),
            name: Some("connectivity".to_string()),
            value: Some(json!({ "value": "OK" })),
            ..Default::default()
        });

        Ok(response)
    }

    /// Load the stored token pair (logging in and persisting a fresh pair
    /// if there is none), fetch the device list, and persist the pair again
    /// only if the API rotated it.
    async fn fetch_devices(&self) -> Result<Vec<Device>> {
        let stored = match self.tokens.load().await? {
            Some(tokens) => tokens,
            None => {
                info!("No stored Wyze tokens, logging in");
                let fresh = self.api.login().await?;
                self.tokens.save(&fresh).await?;
                fresh
            }
        };

        let list = self.api.list_devices(&stored).await?;
        if list.tokens != stored {
            info!("Wyze rotated the credential pair, persisting it");
            self.tokens.save(&list.tokens).await?;
        }

        Ok(list.devices)
    }

    async fn contact_sensors(&self) -> Result<Vec<Device>> {
        Ok(self
            .fetch_devices()
            .await?
            .into_iter()
            .filter(|device| device.product_type == CONTACT_SENSOR)
            .collect())
    }

    async fn find_device(&self, id: &str) -> Result<Device> {
        self.fetch_devices()
            .await?
            .into_iter()
            .find(|device| endpoint_id(&device.nickname) == id)
            .ok_or_else(|| Error::NotFound(format!("No device for endpoint {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TokenPair;
    use crate::wyze::{DeviceList, DeviceParams};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeStore {
        stored: Mutex<Option<TokenPair>>,
        saves: Mutex<Vec<TokenPair>>,
    }

    impl FakeStore {
        fn holding(tokens: Option<TokenPair>) -> Arc<Self> {
            Arc::new(Self {
                stored: Mutex::new(tokens),
                saves: Mutex::new(Vec::new()),
            })
        }

        fn saved(&self) -> Vec<TokenPair> {
            self.saves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenStore for FakeStore {
        async fn load(&self) -> Result<Option<TokenPair>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn save(&self, tokens: &TokenPair) -> Result<()> {
            *self.stored.lock().unwrap() = Some(tokens.clone());
            self.saves.lock().unwrap().push(tokens.clone());
            Ok(())
        }
    }

    struct FakeApi {
        devices: Vec<Device>,
        returns: TokenPair,
    }

    #[async_trait]
    impl DeviceApi for FakeApi {
        async fn login(&self) -> Result<TokenPair> {
            Ok(pair("login-access", "login-refresh"))
        }

        async fn list_devices(&self, _tokens: &TokenPair) -> Result<DeviceList> {
            Ok(DeviceList {
                devices: self.devices.clone(),
                tokens: self.returns.clone(),
            })
        }
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    fn sensor(nickname: &str, open_close_state: i64) -> Device {
        Device {
            mac: format!("MAC-{}", nickname),
            nickname: nickname.to_string(),
            product_type: "ContactSensor".to_string(),
            device_params: DeviceParams { open_close_state },
        }
    }

    fn dispatcher_with(
        stored: Option<TokenPair>,
        devices: Vec<Device>,
        returns: TokenPair,
    ) -> (Dispatcher, Arc<FakeStore>) {
        let store = FakeStore::holding(stored);
        let api = Arc::new(FakeApi { devices, returns });
        (Dispatcher::new(store.clone(), api), store)
    }

    fn directive(namespace: &str, name: &str, payload: Value) -> Value {
        json!({
            "directive": {
                "header": {
                    "namespace": namespace,
                    "name": name,
                    "payloadVersion": "3",
                    "messageId": "message-1"
                },
                "payload": payload
            }
        })
    }

    fn report_state_directive(endpoint_id: &str) -> Value {
        json!({
            "directive": {
                "header": {
                    "namespace": "Alexa",
                    "name": "ReportState",
                    "payloadVersion": "3",
                    "messageId": "message-1",
                    "correlationToken": "corr-1"
                },
                "endpoint": {
                    "endpointId": endpoint_id,
                    "scope": { "type": "BearerToken", "token": "bearer-1" }
                },
                "payload": {}
            }
        })
    }

    async fn handle(dispatcher: &Dispatcher, event: Value) -> Value {
        let response = dispatcher.handle(&event).await.unwrap();
        serde_json::to_value(&response).unwrap()
    }

    #[tokio::test]
    async fn missing_directive_key_is_invalid() {
        let (dispatcher, _) = dispatcher_with(None, vec![], pair("a", "r"));
        let json = handle(&dispatcher, json!({"something": "else"})).await;

        assert_eq!(json["event"]["header"]["name"], "ErrorResponse");
        assert_eq!(json["event"]["payload"]["type"], "INVALID_DIRECTIVE");
    }

    #[tokio::test]
    async fn wrong_payload_version_is_internal_error() {
        let (dispatcher, _) = dispatcher_with(None, vec![], pair("a", "r"));
        let mut event = directive("Alexa.Discovery", "Discover", json!({}));
        event["directive"]["header"]["payloadVersion"] = json!("2");

        let json = handle(&dispatcher, event).await;
        assert_eq!(json["event"]["payload"]["type"], "INTERNAL_ERROR");
        assert_eq!(
            json["event"]["payload"]["message"],
            "This skill only supports Smart Home API version 3"
        );
    }

    #[tokio::test]
    async fn authorization_grant_is_accepted() {
        let (dispatcher, _) = dispatcher_with(None, vec![], pair("a", "r"));
        let event = directive(
            "Alexa.Authorization",
            "AcceptGrant",
            json!({ "grantee": { "type": "BearerToken", "token": "grant-token" } }),
        );

        let json = handle(&dispatcher, event).await;
        assert_eq!(json["event"]["header"]["namespace"], "Alexa.Authorization");
        assert_eq!(json["event"]["header"]["name"], "AcceptGrant.Response");
        assert_eq!(json["event"]["payload"], json!({}));
        assert!(json["event"].get("endpoint").is_none());
    }

    #[tokio::test]
    async fn discovery_slugs_nicknames_and_attaches_capabilities() {
        let stored = pair("stored-access", "stored-refresh");
        let (dispatcher, _) = dispatcher_with(
            Some(stored.clone()),
            vec![sensor("Front Door", 0), sensor("Deck Door", 0)],
            stored,
        );

        let json = handle(&dispatcher, directive("Alexa.Discovery", "Discover", json!({}))).await;
        assert_eq!(json["event"]["header"]["namespace"], "Alexa.Discovery");
        assert_eq!(json["event"]["header"]["name"], "Discover.Response");
        assert!(json["event"].get("endpoint").is_none());

        let endpoints = json["event"]["payload"]["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0]["endpointId"], "frontdoor-01");
        assert_eq!(endpoints[0]["friendlyName"], "Front Door");
        assert_eq!(endpoints[0]["description"], "Check the front door status");
        assert_eq!(endpoints[0]["manufacturerName"], "Wyze");
        assert_eq!(endpoints[0]["displayCategories"], json!(["CONTACT_SENSOR"]));
        assert_eq!(endpoints[0]["capabilities"].as_array().unwrap().len(), 3);
        assert_eq!(endpoints[1]["endpointId"], "deckdoor-01");
        assert_eq!(endpoints[1]["capabilities"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn discovery_skips_non_contact_sensors() {
        let stored = pair("a", "r");
        let mut camera = sensor("Porch Cam", 0);
        camera.product_type = "Camera".to_string();

        let (dispatcher, _) = dispatcher_with(
            Some(stored.clone()),
            vec![camera, sensor("Front Door", 0)],
            stored,
        );

        let json = handle(&dispatcher, directive("Alexa.Discovery", "Discover", json!({}))).await;
        let endpoints = json["event"]["payload"]["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0]["endpointId"], "frontdoor-01");
    }

    #[tokio::test]
    async fn report_state_maps_closed_to_not_detected() {
        let stored = pair("a", "r");
        let (dispatcher, _) = dispatcher_with(
            Some(stored.clone()),
            vec![sensor("Front Door", 0)],
            stored,
        );

        let json = handle(&dispatcher, report_state_directive("frontdoor-01")).await;
        assert_eq!(json["event"]["header"]["name"], "StateReport");
        assert_eq!(json["event"]["header"]["correlationToken"], "corr-1");
        assert_eq!(json["event"]["endpoint"]["endpointId"], "frontdoor-01");
        assert!(json["event"]["endpoint"].get("scope").is_none());

        let properties = json["context"]["properties"].as_array().unwrap();
        assert_eq!(properties[0]["namespace"], "Alexa.ContactSensor");
        assert_eq!(properties[0]["name"], "detectionState");
        assert_eq!(properties[0]["value"], "NOT_DETECTED");
        assert_eq!(properties[1]["namespace"], "Alexa.EndpointHealth");
        assert_eq!(properties[1]["value"], json!({"value": "OK"}));
    }

    #[tokio::test]
    async fn report_state_maps_open_to_detected() {
        let stored = pair("a", "r");
        let (dispatcher, _) = dispatcher_with(
            Some(stored.clone()),
            vec![sensor("Front Door", 1)],
            stored,
        );

        let json = handle(&dispatcher, report_state_directive("frontdoor-01")).await;
        let properties = json["context"]["properties"].as_array().unwrap();
        assert_eq!(properties[0]["value"], "DETECTED");
    }

    #[tokio::test]
    async fn report_state_for_unknown_endpoint_fails() {
        let stored = pair("a", "r");
        let (dispatcher, _) =
            dispatcher_with(Some(stored.clone()), vec![sensor("Front Door", 0)], stored);

        let event = report_state_directive("garagedoor-01");
        let result = dispatcher.handle(&event).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn rotated_tokens_are_persisted_exactly_once() {
        let stored = pair("old-access", "old-refresh");
        let rotated = pair("new-access", "new-refresh");
        let (dispatcher, store) = dispatcher_with(
            Some(stored),
            vec![sensor("Front Door", 0)],
            rotated.clone(),
        );

        handle(&dispatcher, directive("Alexa.Discovery", "Discover", json!({}))).await;
        assert_eq!(store.saved(), vec![rotated]);
    }

    #[tokio::test]
    async fn unchanged_tokens_are_not_rewritten() {
        let stored = pair("access", "refresh");
        let (dispatcher, store) = dispatcher_with(
            Some(stored.clone()),
            vec![sensor("Front Door", 0)],
            stored,
        );

        handle(&dispatcher, directive("Alexa.Discovery", "Discover", json!({}))).await;
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn missing_tokens_trigger_login_and_persist() {
        let fresh = pair("login-access", "login-refresh");
        let (dispatcher, store) =
            dispatcher_with(None, vec![sensor("Front Door", 0)], fresh.clone());

        handle(&dispatcher, directive("Alexa.Discovery", "Discover", json!({}))).await;
        assert_eq!(store.saved(), vec![fresh]);
    }

    #[tokio::test]
    async fn unsupported_directive_is_answered_explicitly() {
        let (dispatcher, _) = dispatcher_with(None, vec![], pair("a", "r"));
        let event = directive("Alexa.PowerController", "TurnOn", json!({}));

        let json = handle(&dispatcher, event).await;
        assert_eq!(json["event"]["header"]["name"], "ErrorResponse");
        assert_eq!(json["event"]["payload"]["type"], "INVALID_DIRECTIVE");
        assert_eq!(
            json["event"]["payload"]["message"],
            "Unsupported directive: Alexa.PowerController/TurnOn"
        );
    }

    #[test]
    fn endpoint_ids_strip_whitespace_and_lowercase() {
        assert_eq!(endpoint_id("Front Door"), "frontdoor-01");
        assert_eq!(endpoint_id("Deck Door"), "deckdoor-01");
        assert_eq!(endpoint_id("  Garage\tDoor "), "garagedoor-01");
    }
}
