//! Credential lookup collaborator.
//!
//! Users live in a flat text file (`login:password:first:last` per line).
//! [`UserCache`] owns the parsed map and re-reads the file only when its
//! mtime changes, so password edits take effect without a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
struct Record {
    password: String,
    user: User,
}

#[derive(Debug)]
pub struct UserCache {
    path: PathBuf,
    mtime: Option<SystemTime>,
    users: HashMap<String, Record>,
}

impl UserCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mtime: None,
            users: HashMap::new(),
        }
    }

    /// Look up a user by login, refreshing from disk if the file changed.
    pub fn lookup(&mut self, login: &str) -> Option<User> {
        self.refresh();
        self.users.get(login).map(|r| r.user.clone())
    }

    /// Verify a login/password pair. Returns the user on success.
    pub fn verify(&mut self, login: &str, password: &str) -> Option<User> {
        self.refresh();
        self.users
            .get(login)
            .filter(|r| r.password == password)
            .map(|r| r.user.clone())
    }

    fn refresh(&mut self) {
        let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if mtime != self.mtime {
            self.users = parse_users_file(&self.path);
            self.mtime = mtime;
        }
    }
}

/// Parse the credential file. Missing file yields an empty map; malformed
/// and comment lines are skipped.
fn parse_users_file(path: &Path) -> HashMap<String, Record> {
    let mut users = HashMap::new();
    let Ok(content) = std::fs::read_to_string(path) else {
        return users;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line
            .split(':')
            .map(|p| p.trim().trim_matches('"'))
            .collect();
        if parts.len() < 4 {
            continue;
        }
        let (login, password, first_name, last_name) =
            (parts[0], parts[1], parts[2], parts[3]);
        users.insert(
            login.to_string(),
            Record {
                password: password.to_string(),
                user: User {
                    login: login.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    is_admin: login == "Admin",
                },
            },
        );
    }
    users
}
