//! Maps typed requests onto store operations and shapes the replies.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::kv::KvStore;
use crate::protocol::{Reply, Request};
use crate::store::{LogError, LogStore};

/// Dispatches one inbound request to one [`LogStore`] operation.
pub struct Router<K> {
    store: Arc<LogStore<K>>,
}

impl<K: KvStore> Router<K> {
    pub fn new(store: Arc<LogStore<K>>) -> Self {
        Self { store }
    }

    /// Handles a request, folding an operation failure into the error reply
    /// the endpoint sends back for that single request.
    pub async fn respond(&self, request: Request) -> Reply {
        match self.handle(request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "request aborted");
                Reply::Error {
                    text: err.to_string(),
                }
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Result<Reply, LogError> {
        match request {
            Request::Send { key, msg } => {
                let offset = self.store.append(&key, msg).await?;
                Ok(Reply::SendOk { offset })
            }
            Request::Poll { offsets } => {
                let mut msgs = BTreeMap::new();
                for (key, from) in offsets {
                    let entries = self.store.poll(&key, from).await?;
                    msgs.insert(key, entries);
                }
                Ok(Reply::PollOk { msgs })
            }
            Request::CommitOffsets { offsets } => {
                for (key, offset) in offsets {
                    self.store.commit(&key, offset).await?;
                }
                Ok(Reply::CommitOffsetsOk)
            }
            Request::ListCommittedOffsets { keys } => {
                let mut offsets = BTreeMap::new();
                for key in keys {
                    let offset = self.store.committed_offset(&key).await?;
                    offsets.insert(key, offset);
                }
                Ok(Reply::ListCommittedOffsetsOk { offsets })
            }
        }
    }
}
