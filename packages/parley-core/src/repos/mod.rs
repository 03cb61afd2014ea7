//! Repository traits over the document store.
//!
//! The core treats persistence as an external collaborator named only by
//! interface. Implementations must keep `Transcripts` ordered by
//! `(sessionId, timestamp ASC)` and support the `(deckId, status)` session
//! index. [`memory`] provides in-process implementations used by tests and
//! the standalone server's default wiring.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ParleyResult;
use crate::model::{
    DataRoomDocument, Deck, Message, Organization, Session, SupportingDocument, Thesis, Transcript,
};

/// Session persistence.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert(&self, session: Session) -> ParleyResult<()>;
    async fn get(&self, id: &str) -> ParleyResult<Option<Session>>;
    /// Upserts the full session document.
    async fn save(&self, session: &Session) -> ParleyResult<()>;
    /// Sessions for a deck, any status.
    async fn list_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<Session>>;
}

/// Transcript persistence.
#[async_trait]
pub trait TranscriptRepo: Send + Sync {
    async fn insert(&self, transcript: Transcript) -> ParleyResult<()>;
    /// All entries for a session, ordered by timestamp ascending
    /// (insertion-stable for equal timestamps).
    async fn list_for_session(&self, session_id: &str) -> ParleyResult<Vec<Transcript>>;
    /// Count of authoritative (final) entries for a session.
    async fn count_final(&self, session_id: &str) -> ParleyResult<u64>;
    /// Entries with `timestamp >= since_ms`, ordered ascending.
    async fn list_since(&self, session_id: &str, since_ms: u64) -> ParleyResult<Vec<Transcript>>;
}

/// Read-only deck access.
#[async_trait]
pub trait DeckRepo: Send + Sync {
    async fn get(&self, id: &str) -> ParleyResult<Option<Deck>>;
}

/// Read-only thesis access.
#[async_trait]
pub trait ThesisRepo: Send + Sync {
    async fn get_for_tenant(&self, tenant_id: &str) -> ParleyResult<Option<Thesis>>;
}

/// Read-only prior Q&A turns for a deck.
#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn list_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<Message>>;
}

/// Read-only document access for a deck.
#[async_trait]
pub trait DocumentRepo: Send + Sync {
    async fn supporting_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<SupportingDocument>>;
    async fn dataroom_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<DataRoomDocument>>;
}

/// Read-only organization access (per-tenant provider keys).
#[async_trait]
pub trait OrganizationRepo: Send + Sync {
    async fn get(&self, id: &str) -> ParleyResult<Option<Organization>>;
}

/// Bundle of repository handles wired at bootstrap.
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepo>,
    pub transcripts: Arc<dyn TranscriptRepo>,
    pub decks: Arc<dyn DeckRepo>,
    pub theses: Arc<dyn ThesisRepo>,
    pub messages: Arc<dyn MessageRepo>,
    pub documents: Arc<dyn DocumentRepo>,
    pub organizations: Arc<dyn OrganizationRepo>,
}

impl Repositories {
    /// Fully in-memory wiring for tests and the default server setup.
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(memory::InMemorySessionRepo::default()),
            transcripts: Arc::new(memory::InMemoryTranscriptRepo::default()),
            decks: Arc::new(memory::InMemoryDeckRepo::default()),
            theses: Arc::new(memory::InMemoryThesisRepo::default()),
            messages: Arc::new(memory::InMemoryMessageRepo::default()),
            documents: Arc::new(memory::InMemoryDocumentRepo::default()),
            organizations: Arc::new(memory::InMemoryOrganizationRepo::default()),
        }
    }
}
