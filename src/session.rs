use crate::error::ServerResult;
use crate::http::{Request, Response};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A named session and its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub values: HashMap<String, String>,
    /// True until the session has been saved once
    pub is_new: bool,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Storage backend for sessions, reachable from the request context
pub trait SessionStore: Send + Sync {
    /// Load the session `name` for this request, or start a new one
    fn get(&self, request: &Request, name: &str) -> ServerResult<Session>;

    /// Persist the session and attach whatever the client needs to find it
    fn save(&self, response: &mut Response, session: &Session) -> ServerResult<()>;

    /// Forget the session and tell the client to drop it
    fn delete(&self, response: &mut Response, session: &Session) -> ServerResult<()>;
}

#[derive(Debug)]
struct Entry {
    values: HashMap<String, String>,
    saved_at: Instant,
    // Save order, oldest first out when the store is full
    sequence: u64,
}

#[derive(Debug, Default)]
struct Entries {
    sessions: HashMap<String, Entry>,
    next_sequence: u64,
}

/// In-process session store keyed by a random id carried in a cookie
///
/// Entries expire `max_age` after their last save, and the least recently
/// saved entry is evicted once `max_entries` is reached. Both limits are off
/// by default.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
    max_age: Option<Duration>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire sessions this long after their last save
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Keep at most `max_entries` sessions
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().sessions.is_empty()
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        self.purge(&mut entries)
    }

    fn purge(&self, entries: &mut Entries) -> usize {
        let max_age = match self.max_age {
            Some(max_age) => max_age,
            None => return 0,
        };
        let before = entries.sessions.len();
        entries
            .sessions
            .retain(|_, entry| entry.saved_at.elapsed() < max_age);
        let removed = before - entries.sessions.len();
        if removed > 0 {
            log::debug!("expired {} sessions", removed);
        }
        removed
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.max_age
            .map_or(false, |max_age| entry.saved_at.elapsed() >= max_age)
    }

    fn new_id() -> String {
        format!("{:032x}", rand::thread_rng().gen::<u128>())
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, request: &Request, name: &str) -> ServerResult<Session> {
        let existing = request
            .get_header("cookie")
            .and_then(|cookies| cookie_value(cookies, name))
            .and_then(|id| {
                self.entries
                    .read()
                    .sessions
                    .get(id)
                    .filter(|entry| !self.is_expired(entry))
                    .map(|entry| (id.to_string(), entry.values.clone()))
            });

        Ok(match existing {
            Some((id, values)) => Session {
                id,
                name: name.to_string(),
                values,
                is_new: false,
            },
            None => Session {
                id: Self::new_id(),
                name: name.to_string(),
                values: HashMap::new(),
                is_new: true,
            },
        })
    }

    fn save(&self, response: &mut Response, session: &Session) -> ServerResult<()> {
        let mut entries = self.entries.write();
        self.purge(&mut entries);

        let sequence = entries.next_sequence;
        entries.next_sequence += 1;
        entries.sessions.insert(
            session.id.clone(),
            Entry {
                values: session.values.clone(),
                saved_at: Instant::now(),
                sequence,
            },
        );

        if let Some(max_entries) = self.max_entries {
            while entries.sessions.len() > max_entries {
                let oldest = entries
                    .sessions
                    .iter()
                    .min_by_key(|(_, entry)| entry.sequence)
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        entries.sessions.remove(&id);
                        log::debug!("evicted session {}", id);
                    }
                    None => break,
                }
            }
        }
        drop(entries);

        let mut cookie = format!("{}={}; Path=/; HttpOnly", session.name, session.id);
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        response.add_header("Set-Cookie", &cookie);
        Ok(())
    }

    fn delete(&self, response: &mut Response, session: &Session) -> ServerResult<()> {
        self.entries.write().sessions.remove(&session.id);

        response.add_header(
            "Set-Cookie",
            &format!("{}=; Path=/; HttpOnly; Max-Age=0", session.name),
        );
        Ok(())
    }
}

fn cookie_value<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
