// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory mapping indices backed by the mapping store.
//!
//! `BridgeState` is rebuilt in full from [`MappingStore::load_all`] at startup
//! and written through on every change. A failed store write is logged and
//! returned to the caller, but the in-memory change is kept: the store catches
//! up on the next successful write of the same key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use topicbridge_core::traits::upsert_document;
use topicbridge_core::types::{
    ChatMapping, ContactMapping, Document, IdentityMapping, MappingKind, MessagePair,
    phone_from_identity,
};
use topicbridge_core::{BridgeError, MappingStore, StoredMapping};

use crate::correlation::CorrelationIndex;

/// Aggregate export of every mapping kind, stored as the "mappings" snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingsSnapshot {
    #[serde(default)]
    pub chats: HashMap<String, ChatMapping>,
    #[serde(default)]
    pub users: HashMap<String, IdentityMapping>,
    #[serde(default)]
    pub contacts: HashMap<String, ContactMapping>,
    #[serde(default)]
    pub message_pairs: HashMap<String, MessagePair>,
}

impl MappingsSnapshot {
    fn is_empty(&self) -> bool {
        self.chats.is_empty()
            && self.users.is_empty()
            && self.contacts.is_empty()
            && self.message_pairs.is_empty()
    }
}

#[derive(Default)]
struct ChatIndex {
    by_conversation: HashMap<String, ChatMapping>,
    by_topic: HashMap<i64, String>,
}

impl ChatIndex {
    /// Inserts `mapping`, dropping whatever reverse entry it replaces.
    fn insert(&mut self, mapping: ChatMapping) {
        if let Some(old) = self
            .by_conversation
            .insert(mapping.primary_conversation_id.clone(), mapping.clone())
            && old.secondary_topic_id != mapping.secondary_topic_id
        {
            self.by_topic.remove(&old.secondary_topic_id);
        }
        if let Some(previous) = self
            .by_topic
            .insert(mapping.secondary_topic_id, mapping.primary_conversation_id.clone())
            && previous != mapping.primary_conversation_id
        {
            // Topic ids are unique; the older conversation loses its claim.
            warn!(
                topic_id = mapping.secondary_topic_id,
                previous = %previous,
                conversation = %mapping.primary_conversation_id,
                "topic id reassigned between conversations"
            );
            self.by_conversation.remove(&previous);
        }
    }

    fn remove(&mut self, conversation_id: &str) -> Option<ChatMapping> {
        let removed = self.by_conversation.remove(conversation_id)?;
        if self.by_topic.get(&removed.secondary_topic_id).map(String::as_str)
            == Some(conversation_id)
        {
            self.by_topic.remove(&removed.secondary_topic_id);
        }
        Some(removed)
    }
}

/// Owned in-memory view of every mapping kind.
pub struct BridgeState {
    store: Arc<dyn MappingStore>,
    chats: Mutex<ChatIndex>,
    identities: Mutex<HashMap<String, IdentityMapping>>,
    contacts: Mutex<HashMap<String, ContactMapping>>,
    correlation: CorrelationIndex,
}

impl BridgeState {
    /// Rebuilds every index from the store.
    ///
    /// Per-kind documents are authoritative. The aggregate snapshot is only
    /// imported when the store holds no per-kind documents at all, in which
    /// case its entries are written back as per-kind documents.
    pub async fn load(store: Arc<dyn MappingStore>) -> Result<Self, BridgeError> {
        let mut docs = store.load_all().await?;

        if docs.is_empty()
            && let Some(raw) = store.load_snapshot().await?
        {
            match serde_json::from_value::<MappingsSnapshot>(raw) {
                Ok(snapshot) if !snapshot.is_empty() => {
                    info!("importing mappings snapshot into per-kind documents");
                    docs = import_snapshot(store.as_ref(), &snapshot).await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "ignoring undecodable mappings snapshot"),
            }
        }

        let mut chats = ChatIndex::default();
        let mut identities = HashMap::new();
        let mut contacts = HashMap::new();
        let mut pairs = Vec::new();
        let mut skipped = 0usize;

        for doc in docs {
            let StoredMapping { kind, key, data } = doc;
            let decoded = match kind {
                MappingKind::Chat => decode::<ChatMapping>(&key, data).map(|m| chats.insert(m)),
                MappingKind::User => decode::<IdentityMapping>(&key, data)
                    .map(|m| drop(identities.insert(key.clone(), m))),
                MappingKind::Contact => decode::<ContactMapping>(&key, data)
                    .map(|m| drop(contacts.insert(key.clone(), m))),
                MappingKind::MessagePair => decode::<MessagePair>(&key, data).map(|m| pairs.push(m)),
            };
            if decoded.is_none() {
                skipped += 1;
            }
        }

        info!(
            chats = chats.by_conversation.len(),
            users = identities.len(),
            contacts = contacts.len(),
            message_pairs = pairs.len(),
            skipped,
            "bridge state rebuilt from store"
        );

        Ok(Self {
            correlation: CorrelationIndex::new(Arc::clone(&store), pairs),
            store,
            chats: Mutex::new(chats),
            identities: Mutex::new(identities),
            contacts: Mutex::new(contacts),
        })
    }

    /// The message correlation index.
    pub fn correlation(&self) -> &CorrelationIndex {
        &self.correlation
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn MappingStore> {
        &self.store
    }

    // --- Chat mappings ---

    pub async fn chat(&self, conversation_id: &str) -> Option<ChatMapping> {
        self.chats
            .lock()
            .await
            .by_conversation
            .get(conversation_id)
            .cloned()
    }

    /// Reverse lookup from a forum topic to its conversation.
    pub async fn conversation_for_topic(&self, topic_id: i64) -> Option<String> {
        self.chats.lock().await.by_topic.get(&topic_id).cloned()
    }

    /// Every chat mapping, ordered by conversation id.
    pub async fn chats(&self) -> Vec<ChatMapping> {
        let mut all: Vec<_> = self
            .chats
            .lock()
            .await
            .by_conversation
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.primary_conversation_id.cmp(&b.primary_conversation_id));
        all
    }

    pub async fn put_chat(&self, mapping: ChatMapping) -> Result<(), BridgeError> {
        self.chats.lock().await.insert(mapping.clone());
        self.persist(&mapping).await
    }

    pub async fn remove_chat(&self, conversation_id: &str) -> Result<(), BridgeError> {
        if self.chats.lock().await.remove(conversation_id).is_none() {
            return Ok(());
        }
        self.store
            .delete(MappingKind::Chat, conversation_id)
            .await
            .inspect_err(|e| {
                warn!(
                    conversation = %conversation_id,
                    error = %e,
                    "failed to delete chat mapping; in-memory state kept"
                )
            })
    }

    /// Bumps `last_activity` for a mapped conversation.
    pub async fn touch_chat(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        let updated = {
            let mut chats = self.chats.lock().await;
            match chats.by_conversation.get_mut(conversation_id) {
                Some(mapping) => {
                    mapping.last_activity = now;
                    mapping.clone()
                }
                None => return Ok(()),
            }
        };
        self.persist(&updated).await
    }

    // --- Identities and contacts ---

    /// Counts one relayed message for `identity_id`, creating its profile on first sight.
    pub async fn record_identity(
        &self,
        identity_id: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IdentityMapping, BridgeError> {
        let updated = {
            let mut identities = self.identities.lock().await;
            let entry = identities.entry(identity_id.to_string()).or_insert_with(|| {
                debug!(identity = %identity_id, "first message from identity");
                IdentityMapping::first_seen(
                    identity_id,
                    display_name.unwrap_or(identity_id),
                    phone_from_identity(identity_id),
                    now,
                )
            });
            entry.record_message(display_name);
            entry.clone()
        };
        self.persist(&updated).await?;
        Ok(updated)
    }

    pub async fn identity(&self, identity_id: &str) -> Option<IdentityMapping> {
        self.identities.lock().await.get(identity_id).cloned()
    }

    /// Stores an address-book name, last write wins.
    pub async fn put_contact(
        &self,
        phone_number: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BridgeError> {
        let contact = ContactMapping {
            phone_number: phone_number.to_string(),
            display_name: display_name.to_string(),
            updated_at: now,
        };
        self.contacts
            .lock()
            .await
            .insert(contact.phone_number.clone(), contact.clone());
        self.persist(&contact).await
    }

    pub async fn contact_name(&self, phone_number: &str) -> Option<String> {
        self.contacts
            .lock()
            .await
            .get(phone_number)
            .map(|c| c.display_name.clone())
    }

    /// Best display name for an identity: address book, then the name the
    /// sender advertised, then the stored profile, then the phone number.
    pub async fn display_name_for(&self, identity_id: &str, advertised: Option<&str>) -> String {
        let phone = phone_from_identity(identity_id);
        if let Some(phone) = &phone
            && let Some(name) = self.contact_name(phone).await
        {
            return name;
        }
        if let Some(name) = advertised.filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        if let Some(profile) = self.identity(identity_id).await
            && profile.display_name != identity_id
        {
            return profile.display_name;
        }
        phone.unwrap_or_else(|| identity_id.to_string())
    }

    // --- Snapshot ---

    /// Builds the aggregate snapshot of every in-memory mapping.
    pub async fn snapshot(&self) -> MappingsSnapshot {
        MappingsSnapshot {
            chats: self.chats.lock().await.by_conversation.clone(),
            users: self.identities.lock().await.clone(),
            contacts: self.contacts.lock().await.clone(),
            message_pairs: self
                .correlation
                .pairs()
                .await
                .into_iter()
                .map(|p| (p.primary_message_id.clone(), p))
                .collect(),
        }
    }

    /// Writes the aggregate snapshot document.
    pub async fn save_snapshot(&self) -> Result<(), BridgeError> {
        let snapshot = serde_json::to_value(self.snapshot().await)?;
        self.store.save_snapshot(&snapshot).await
    }

    async fn persist<D: Document>(&self, doc: &D) -> Result<(), BridgeError> {
        upsert_document(self.store.as_ref(), doc)
            .await
            .inspect_err(|e| {
                warn!(
                    kind = %D::KIND,
                    key = %doc.key(),
                    error = %e,
                    "mapping write failed; in-memory state kept"
                )
            })
    }
}

fn decode<D: Document>(key: &str, data: serde_json::Value) -> Option<D> {
    match serde_json::from_value(data) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(kind = %D::KIND, key, error = %e, "skipping undecodable mapping document");
            None
        }
    }
}

/// Writes snapshot entries as per-kind documents and returns them as loaded docs.
async fn import_snapshot(store: &dyn MappingStore, snapshot: &MappingsSnapshot) -> Vec<StoredMapping> {
    let mut docs = Vec::new();
    collect(&mut docs, snapshot.chats.values());
    collect(&mut docs, snapshot.users.values());
    collect(&mut docs, snapshot.contacts.values());
    collect(&mut docs, snapshot.message_pairs.values());

    for doc in &docs {
        if let Err(e) = store.upsert(doc.kind, &doc.key, &doc.data).await {
            warn!(kind = %doc.kind, key = %doc.key, error = %e, "snapshot import write failed");
        }
    }
    docs
}

fn collect<'a, D: Document + 'a>(out: &mut Vec<StoredMapping>, docs: impl Iterator<Item = &'a D>) {
    for doc in docs {
        match serde_json::to_value(doc) {
            Ok(data) => out.push(StoredMapping {
                kind: D::KIND,
                key: doc.key(),
                data,
            }),
            Err(e) => warn!(kind = %D::KIND, error = %e, "failed to encode snapshot entry"),
        }
    }
}
