//! ConfigMap ledger driver
//!
//! The ledger lives in one ConfigMap, JSON-encoded under
//! `binaryData["data"]`. Updates replace the object with the
//! `resourceVersion` that was just read, so concurrent writers conflict
//! instead of silently overwriting each other.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, PostParams};
use ka_core::StateLedger;

use super::{DATA_KEY, LedgerStore, decode_ledger, encode_ledger};
use crate::error::Result;

/// Ledger stored in a ConfigMap
pub struct ConfigMapLedgerStore {
    client: Client,
    namespace: String,
    name: String,
}

impl ConfigMapLedgerStore {
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Stored ledger bytes of a record; missing key or data is empty
fn record_data(config_map: &ConfigMap) -> &[u8] {
    config_map
        .binary_data
        .as_ref()
        .and_then(|data| data.get(DATA_KEY))
        .map(|bytes| bytes.0.as_slice())
        .unwrap_or_default()
}

fn with_data(mut config_map: ConfigMap, data: Vec<u8>) -> ConfigMap {
    config_map
        .binary_data
        .get_or_insert_with(BTreeMap::new)
        .insert(DATA_KEY.to_string(), ByteString(data));
    config_map
}

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "app.kubernetes.io/managed-by".to_string(),
        "ka-controller".to_string(),
    )])
}

#[async_trait]
impl LedgerStore for ConfigMapLedgerStore {
    async fn load(&self) -> Result<StateLedger> {
        match self.api().get_opt(&self.name).await? {
            Some(config_map) => decode_ledger(record_data(&config_map)),
            None => {
                tracing::debug!(
                    namespace = %self.namespace,
                    name = %self.name,
                    "no ledger record yet"
                );
                Ok(StateLedger::new())
            }
        }
    }

    async fn save(&self, ledger: &StateLedger) -> Result<()> {
        let data = encode_ledger(ledger)?;
        let api = self.api();

        match api.get_opt(&self.name).await? {
            Some(existing) => {
                // keeps metadata.resourceVersion for the optimistic lock
                api.replace(&self.name, &PostParams::default(), &with_data(existing, data))
                    .await?;
            }
            None => {
                let fresh = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(self.name.clone()),
                        namespace: Some(self.namespace.clone()),
                        labels: Some(labels()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.create(&PostParams::default(), &with_data(fresh, data))
                    .await?;
                tracing::info!(namespace = %self.namespace, name = %self.name, "created ledger record");
            }
        }
        Ok(())
    }
}
