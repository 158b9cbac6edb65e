//! Default in-memory session store

use super::{History, SessionStore, ThawAction, UserData};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory [`SessionStore`]
///
/// A read-write lock over the user map serializes mutations while letting
/// concurrent replies read each other's sessions.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserData>>,
    frozen: RwLock<HashMap<String, UserData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn init(&self, username: &str) {
        let mut users = self.users.write().unwrap();
        users.entry(username.to_string()).or_default();
    }

    fn set(&self, username: &str, name: &str, value: Option<String>) {
        let mut users = self.users.write().unwrap();
        let user = users.entry(username.to_string()).or_default();
        match value {
            Some(value) => {
                user.vars.insert(name.to_string(), value);
            }
            None => {
                user.vars.remove(name);
            }
        }
    }

    fn set_many(&self, username: &str, vars: HashMap<String, String>) {
        let mut users = self.users.write().unwrap();
        let user = users.entry(username.to_string()).or_default();
        user.vars.extend(vars);
    }

    fn get(&self, username: &str, name: &str) -> Option<String> {
        let users = self.users.read().unwrap();
        users.get(username)?.vars.get(name).cloned()
    }

    fn get_user(&self, username: &str) -> Option<UserData> {
        let users = self.users.read().unwrap();
        users.get(username).cloned()
    }

    fn get_all(&self) -> HashMap<String, UserData> {
        self.users.read().unwrap().clone()
    }

    fn add_history(&self, username: &str, input: &str, reply: &str) {
        let mut users = self.users.write().unwrap();
        let user = users.entry(username.to_string()).or_default();
        user.history.push(input, reply);
    }

    fn history(&self, username: &str) -> Option<History> {
        let users = self.users.read().unwrap();
        users.get(username).map(|user| user.history.clone())
    }

    fn set_last_match(&self, username: &str, pattern: Option<String>) {
        let mut users = self.users.write().unwrap();
        let user = users.entry(username.to_string()).or_default();
        user.last_match = pattern;
    }

    fn last_match(&self, username: &str) -> Option<String> {
        let users = self.users.read().unwrap();
        users.get(username)?.last_match.clone()
    }

    fn clear(&self, username: &str) {
        self.users.write().unwrap().remove(username);
        self.frozen.write().unwrap().remove(username);
    }

    fn clear_all(&self) {
        self.users.write().unwrap().clear();
        self.frozen.write().unwrap().clear();
    }

    fn freeze(&self, username: &str) -> crate::Result<()> {
        let users = self.users.read().unwrap();
        match users.get(username) {
            Some(user) => {
                let snapshot = user.clone();
                drop(users);
                self.frozen
                    .write()
                    .unwrap()
                    .insert(username.to_string(), snapshot);
                Ok(())
            }
            None => Err(crate::RivetError::NoSuchUser(username.to_string())),
        }
    }

    fn thaw(&self, username: &str, action: ThawAction) -> crate::Result<()> {
        match action {
            ThawAction::Discard => {
                self.frozen.write().unwrap().remove(username);
            }
            ThawAction::Keep => {
                let frozen = self.frozen.read().unwrap();
                if let Some(snapshot) = frozen.get(username).cloned() {
                    drop(frozen);
                    self.users
                        .write()
                        .unwrap()
                        .insert(username.to_string(), snapshot);
                }
            }
            ThawAction::Thaw => {
                if let Some(snapshot) = self.frozen.write().unwrap().remove(username) {
                    self.users
                        .write()
                        .unwrap()
                        .insert(username.to_string(), snapshot);
                }
            }
        }
        Ok(())
    }
}
