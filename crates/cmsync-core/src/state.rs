use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Key-to-text mapping owned by a single remote object. Keys must be valid
/// path segments; the cluster enforces this for ConfigMap data keys.
pub type ObjectData = BTreeMap<String, String>;

/// One fetch result: every matching object, keyed by name. Names are unique
/// within a namespace, so a plain map loses nothing.
pub type DesiredState = BTreeMap<String, ObjectData>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote unavailable: failed to list objects in namespace '{namespace}' with selector '{selector}'")]
    Remote {
        namespace: String,
        selector: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("filesystem operation failed at '{}'", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    pub(crate) fn remote(
        namespace: &str,
        selector: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Remote {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn fs(path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Source of desired state. The production implementation talks to the
/// cluster; tests substitute an in-memory map.
///
/// Either the complete matching set is returned or the call fails for this
/// cycle. No partial results.
#[allow(async_fn_in_trait)]
pub trait StateProvider {
    async fn list(&self, namespace: &str, selector: &str) -> Result<DesiredState, SyncError>;
}
