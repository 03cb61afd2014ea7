//! In-memory repository implementations.
//!
//! Used by the test suite and as the standalone server's default store.
//! Writes clone whole documents; reads return clones, never references into
//! the maps.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    DeckRepo, DocumentRepo, MessageRepo, OrganizationRepo, SessionRepo, ThesisRepo, TranscriptRepo,
};
use crate::error::ParleyResult;
use crate::model::{
    DataRoomDocument, Deck, Message, Organization, Session, SupportingDocument, Thesis, Transcript,
};

/// In-memory session store.
#[derive(Default)]
pub struct InMemorySessionRepo {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionRepo for InMemorySessionRepo {
    async fn insert(&self, session: Session) -> ParleyResult<()> {
        self.sessions.write().insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> ParleyResult<Option<Session>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn save(&self, session: &Session) -> ParleyResult<()> {
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn list_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.deck_id == deck_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

/// In-memory transcript store, insertion-ordered per session.
#[derive(Default)]
pub struct InMemoryTranscriptRepo {
    transcripts: RwLock<HashMap<String, Vec<Transcript>>>,
}

#[async_trait]
impl TranscriptRepo for InMemoryTranscriptRepo {
    async fn insert(&self, transcript: Transcript) -> ParleyResult<()> {
        self.transcripts
            .write()
            .entry(transcript.session_id.clone())
            .or_default()
            .push(transcript);
        Ok(())
    }

    async fn list_for_session(&self, session_id: &str) -> ParleyResult<Vec<Transcript>> {
        let mut entries = self
            .transcripts
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps
        entries.sort_by_key(|t| t.timestamp);
        Ok(entries)
    }

    async fn count_final(&self, session_id: &str) -> ParleyResult<u64> {
        Ok(self
            .transcripts
            .read()
            .get(session_id)
            .map(|entries| entries.iter().filter(|t| t.is_final).count() as u64)
            .unwrap_or(0))
    }

    async fn list_since(&self, session_id: &str, since_ms: u64) -> ParleyResult<Vec<Transcript>> {
        let mut entries: Vec<Transcript> = self
            .transcripts
            .read()
            .get(session_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| t.timestamp >= since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|t| t.timestamp);
        Ok(entries)
    }
}

/// In-memory deck store.
#[derive(Default)]
pub struct InMemoryDeckRepo {
    decks: RwLock<HashMap<String, Deck>>,
}

impl InMemoryDeckRepo {
    /// Seeds a deck (test and server setup helper).
    pub fn put(&self, deck: Deck) {
        self.decks.write().insert(deck.id.clone(), deck);
    }
}

#[async_trait]
impl DeckRepo for InMemoryDeckRepo {
    async fn get(&self, id: &str) -> ParleyResult<Option<Deck>> {
        Ok(self.decks.read().get(id).cloned())
    }
}

/// In-memory thesis store, keyed by tenant.
#[derive(Default)]
pub struct InMemoryThesisRepo {
    theses: RwLock<HashMap<String, Thesis>>,
}

impl InMemoryThesisRepo {
    pub fn put(&self, thesis: Thesis) {
        self.theses.write().insert(thesis.tenant_id.clone(), thesis);
    }
}

#[async_trait]
impl ThesisRepo for InMemoryThesisRepo {
    async fn get_for_tenant(&self, tenant_id: &str) -> ParleyResult<Option<Thesis>> {
        Ok(self.theses.read().get(tenant_id).cloned())
    }
}

/// In-memory prior-turn store.
#[derive(Default)]
pub struct InMemoryMessageRepo {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepo {
    pub fn put(&self, message: Message) {
        self.messages.write().push(message);
    }
}

#[async_trait]
impl MessageRepo for InMemoryMessageRepo {
    async fn list_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.deck_id == deck_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct InMemoryDocumentRepo {
    supporting: RwLock<Vec<SupportingDocument>>,
    dataroom: RwLock<Vec<DataRoomDocument>>,
}

impl InMemoryDocumentRepo {
    pub fn put_supporting(&self, doc: SupportingDocument) {
        self.supporting.write().push(doc);
    }

    pub fn put_dataroom(&self, doc: DataRoomDocument) {
        self.dataroom.write().push(doc);
    }
}

#[async_trait]
impl DocumentRepo for InMemoryDocumentRepo {
    async fn supporting_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<SupportingDocument>> {
        Ok(self
            .supporting
            .read()
            .iter()
            .filter(|d| d.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn dataroom_for_deck(&self, deck_id: &str) -> ParleyResult<Vec<DataRoomDocument>> {
        Ok(self
            .dataroom
            .read()
            .iter()
            .filter(|d| d.deck_id == deck_id)
            .cloned()
            .collect())
    }
}

/// In-memory organization store.
#[derive(Default)]
pub struct InMemoryOrganizationRepo {
    organizations: RwLock<HashMap<String, Organization>>,
}

impl InMemoryOrganizationRepo {
    pub fn put(&self, org: Organization) {
        self.organizations.write().insert(org.id.clone(), org);
    }
}

#[async_trait]
impl OrganizationRepo for InMemoryOrganizationRepo {
    async fn get(&self, id: &str) -> ParleyResult<Option<Organization>> {
        Ok(self.organizations.read().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionStatus;

    fn transcript(session_id: &str, timestamp: u64, text: &str, is_final: bool) -> Transcript {
        Transcript {
            session_id: session_id.into(),
            deck_id: "d1".into(),
            timestamp,
            text: text.into(),
            speaker: None,
            speaker_id: None,
            is_final,
            confidence: None,
            language_code: None,
        }
    }

    #[tokio::test]
    async fn session_save_overwrites() {
        let repo = InMemorySessionRepo::default();
        let mut session = Session::new("d1", "t1", "u1", "Pitch");
        let id = session.id.clone();
        repo.insert(session.clone()).await.unwrap();

        session.status = SessionStatus::Ended;
        repo.save(&session).await.unwrap();

        let loaded = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn transcripts_are_ordered_by_timestamp() {
        let repo = InMemoryTranscriptRepo::default();
        repo.insert(transcript("s1", 30, "c", true)).await.unwrap();
        repo.insert(transcript("s1", 10, "a", false)).await.unwrap();
        repo.insert(transcript("s1", 20, "b", true)).await.unwrap();

        let entries = repo.list_for_session("s1").await.unwrap();
        let texts: Vec<&str> = entries.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn count_final_ignores_partials() {
        let repo = InMemoryTranscriptRepo::default();
        repo.insert(transcript("s1", 10, "a", false)).await.unwrap();
        repo.insert(transcript("s1", 20, "b", true)).await.unwrap();
        repo.insert(transcript("s1", 30, "c", true)).await.unwrap();
        assert_eq!(repo.count_final("s1").await.unwrap(), 2);
        assert_eq!(repo.count_final("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_since_filters_by_timestamp() {
        let repo = InMemoryTranscriptRepo::default();
        repo.insert(transcript("s1", 10, "old", false)).await.unwrap();
        repo.insert(transcript("s1", 50, "new", false)).await.unwrap();
        let recent = repo.list_since("s1", 40).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "new");
    }

    #[tokio::test]
    async fn sessions_for_deck_newest_first() {
        let repo = InMemorySessionRepo::default();
        let mut s1 = Session::new("d1", "t1", "u1", "First");
        s1.started_at = 100;
        let mut s2 = Session::new("d1", "t1", "u1", "Second");
        s2.started_at = 200;
        let other = Session::new("d2", "t1", "u1", "Other deck");
        repo.insert(s1).await.unwrap();
        repo.insert(s2).await.unwrap();
        repo.insert(other).await.unwrap();

        let sessions = repo.list_for_deck("d1").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].title, "Second");
    }
}
