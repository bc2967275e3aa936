//! In-memory chatbot registry
//!
//! Names are unique per creator. Creating a chatbot takes a while (extraction,
//! embedding), so a name is reserved first and only turned into a real entry
//! once the index exists. A reserved name counts as taken until its
//! [`Reservation`] is inserted or dropped.

use super::{Chatbot, ChatbotError, ChatbotSummary};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::RwLock;
use uuid::Uuid;

type PendingNames = Arc<Mutex<HashSet<(String, String)>>>;

fn lock_pending(pending: &Mutex<HashSet<(String, String)>>) -> MutexGuard<'_, HashSet<(String, String)>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Claim on a chatbot name held while the chatbot is being built.
///
/// Dropping it frees the name, including when the creating future is
/// cancelled part-way through.
#[derive(Debug)]
pub struct Reservation {
    creator: String,
    name: String,
    pending: PendingNames,
}

impl Reservation {
    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let key = (std::mem::take(&mut self.creator), std::mem::take(&mut self.name));
        lock_pending(&self.pending).remove(&key);
    }
}

#[derive(Default)]
pub struct ChatbotRegistry {
    chatbots: RwLock<Vec<Arc<Chatbot>>>,
    pending: PendingNames,
}

impl ChatbotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` for `creator`, failing if it is registered or being created
    pub async fn reserve(&self, creator: &str, name: &str) -> Result<Reservation, ChatbotError> {
        // The write lock keeps reserve and insert from interleaving
        let chatbots = self.chatbots.write().await;
        let mut pending = lock_pending(&self.pending);

        let key = (creator.to_string(), name.to_string());
        let registered = chatbots
            .iter()
            .any(|bot| bot.creator == creator && bot.name == name);
        if registered || pending.contains(&key) {
            return Err(ChatbotError::DuplicateName(name.to_string()));
        }

        pending.insert(key);
        Ok(Reservation {
            creator: creator.to_string(),
            name: name.to_string(),
            pending: Arc::clone(&self.pending),
        })
    }

    /// Turn a reservation into a registered chatbot
    pub async fn insert(&self, reservation: Reservation, chatbot: Chatbot) -> Arc<Chatbot> {
        let chatbot = Arc::new(chatbot);
        let mut chatbots = self.chatbots.write().await;
        chatbots.push(Arc::clone(&chatbot));
        drop(reservation);
        chatbot
    }

    /// Whether `name` is currently reserved by an in-flight creation
    pub fn is_pending(&self, creator: &str, name: &str) -> bool {
        lock_pending(&self.pending).contains(&(creator.to_string(), name.to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Chatbot>> {
        self.chatbots
            .read()
            .await
            .iter()
            .find(|bot| bot.id == id)
            .cloned()
    }

    pub async fn find_by_name(&self, creator: &str, name: &str) -> Option<Arc<Chatbot>> {
        self.chatbots
            .read()
            .await
            .iter()
            .find(|bot| bot.creator == creator && bot.name == name)
            .cloned()
    }

    /// Chatbots created by `creator`, oldest first
    pub async fn list_for(&self, creator: &str) -> Vec<ChatbotSummary> {
        self.chatbots
            .read()
            .await
            .iter()
            .filter(|bot| bot.creator == creator)
            .map(|bot| bot.summary())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.chatbots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chatbots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reservation_blocks_same_name() {
        let registry = ChatbotRegistry::new();
        let reservation = registry.reserve("ana", "Handbook").await.unwrap();
        assert_eq!(reservation.name(), "Handbook");
        assert_eq!(reservation.creator(), "ana");
        assert!(registry.is_pending("ana", "Handbook"));

        assert!(matches!(
            registry.reserve("ana", "Handbook").await,
            Err(ChatbotError::DuplicateName(name)) if name == "Handbook"
        ));

        // Other creators have their own namespace
        assert!(registry.reserve("bob", "Handbook").await.is_ok());
    }

    #[tokio::test]
    async fn test_dropping_reservation_frees_name() {
        let registry = ChatbotRegistry::new();
        let reservation = registry.reserve("ana", "Handbook").await.unwrap();
        drop(reservation);

        assert!(!registry.is_pending("ana", "Handbook"));
        assert!(registry.reserve("ana", "Handbook").await.is_ok());
        assert!(registry.is_empty().await);
    }
}
