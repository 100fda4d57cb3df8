//! Credential persistence in DynamoDB.
//!
//! The token pair is the only mutable state shared across requests. Its
//! update is a plain read-modify-write with no optimistic concurrency
//! check; two racing invocations can clobber a rotation, which is
//! acceptable for a single-user skill.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The persisted Wyze credential pair, keyed by the phone id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Narrow persistence interface so the dispatcher can take a test double.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the stored pair, if any.
    async fn load(&self) -> Result<Option<TokenPair>>;
    /// Overwrite the stored pair.
    async fn save(&self, tokens: &TokenPair) -> Result<()>;
}

/// Token store backed by a DynamoDB settings table with items
/// `{id, accessToken, refreshToken}`.
pub struct DynamoTokenStore {
    client: DynamoClient,
    table: String,
    key: String,
}

impl DynamoTokenStore {
    pub fn new(client: DynamoClient, table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl TokenStore for DynamoTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("id", AttributeValue::S(self.key.clone()))
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to read tokens: {}", e)))?;

        let Some(item) = response.item else {
            return Ok(None);
        };

        Ok(Some(TokenPair {
            access_token: string_attr(&item, "accessToken")?,
            refresh_token: string_attr(&item, "refreshToken")?,
        }))
    }

    async fn save(&self, tokens: &TokenPair) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("id", AttributeValue::S(self.key.clone()))
            .item(
                "accessToken",
                AttributeValue::S(tokens.access_token.clone()),
            )
            .item(
                "refreshToken",
                AttributeValue::S(tokens.refresh_token.clone()),
            )
            .send()
            .await
            .map_err(|e| Error::Aws(format!("Failed to save tokens: {}", e)))?;

        Ok(())
    }
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<String> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .map(String::from)
        .ok_or_else(|| Error::Aws(format!("Token item missing attribute: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_attr_reads_string_values() {
        let mut item = HashMap::new();
        item.insert(
            "accessToken".to_string(),
            AttributeValue::S("abc".to_string()),
        );

        assert_eq!(string_attr(&item, "accessToken").unwrap(), "abc");
        assert!(string_attr(&item, "refreshToken").is_err());
    }

    #[test]
    fn string_attr_rejects_non_string_values() {
        let mut item = HashMap::new();
        item.insert(
            "accessToken".to_string(),
            AttributeValue::N("42".to_string()),
        );

        assert!(string_attr(&item, "accessToken").is_err());
    }
}
