//! Shared library for the Wyze smart home skill Lambda.
//!
//! This crate provides the Alexa Smart Home envelope models, the response
//! builder, the directive dispatcher, and the collaborator clients
//! (DynamoDB token store, Wyze device API).

pub mod config;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod response;
pub mod store;
pub mod wyze;

pub use config::Config;
pub use directive::{Directive, DirectiveEndpoint, DirectiveHeader};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use response::{AlexaResponse, Capability, CapabilityOptions, ResponseOptions};
pub use store::{DynamoTokenStore, TokenPair, TokenStore};
pub use wyze::{Device, DeviceApi, DeviceList, WyzeClient};
