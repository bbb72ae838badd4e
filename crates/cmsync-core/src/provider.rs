use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams};
use kube::Client;

use crate::state::{DesiredState, StateProvider, SyncError};

/// ConfigMap-backed state provider. Holds a cluster client handle; each
/// `list` issues one full namespaced list call filtered by label selector.
#[derive(Clone)]
pub struct KubeConfigMaps {
    client: Client,
}

impl KubeConfigMaps {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl StateProvider for KubeConfigMaps {
    async fn list(&self, namespace: &str, selector: &str) -> Result<DesiredState, SyncError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(selector);
        let list = api
            .list(&params)
            .await
            .map_err(|err| SyncError::remote(namespace, selector, err))?;

        let mut desired = DesiredState::new();
        for cm in list {
            // Objects without a name cannot be materialized; the API server
            // never returns them, but the field is optional in the schema.
            let Some(name) = cm.metadata.name else {
                continue;
            };
            // `data` is absent for empty ConfigMaps; binary payloads are out
            // of scope, only the text `data` section is mirrored.
            desired.insert(name, cm.data.unwrap_or_default());
        }
        Ok(desired)
    }
}
