use crate::*;
use log::debug;
use serde_json::{Map, Value};
use std::path::Path;

const HASH_TWEAK: &str = "hash_sbb";

/// One posted message
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BoardItem {
    pub header: String,
    pub body: Value,
}

impl BoardItem {
    /// Headers in parentheses are not part of the public board
    pub fn is_public(&self) -> bool {
        !self.header.starts_with('(')
    }

    pub fn time(&self) -> Option<&str> {
        self.body.get("time").and_then(|t| t.as_str())
    }
}

/// Append-only secure bulletin board
#[derive(Clone, Debug, Default)]
pub struct BulletinBoard {
    items: Vec<BoardItem>,
    closed: bool,
}

pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

impl BulletinBoard {
    /// A new board, opened with an `sbb:open` item
    pub fn open(election_id: &str) -> Result<Self, Error> {
        let mut board = BulletinBoard::default();
        board.post(
            SBB_OPEN,
            serde_json::json!({ "election_id": election_id }),
            true,
        )?;
        Ok(board)
    }

    pub fn post(&mut self, header: &str, body: Value, timestamped: bool) -> Result<(), Error> {
        if self.closed {
            return Err(Error::BoardClosed);
        }
        let mut body = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(Error::MalformedUpdate(format!(
                    "body posted under {} is not an object",
                    header
                )))
            }
        };
        if timestamped {
            body.insert("time".to_owned(), Value::String(timestamp()));
        }
        debug!("sbb: posted {}", header);
        self.items.push(BoardItem {
            header: header.to_owned(),
            body: Value::Object(body),
        });
        Ok(())
    }

    /// Post `sbb:close`; nothing can be posted afterwards
    pub fn close(&mut self) -> Result<(), Error> {
        self.post(SBB_CLOSE, Value::Null, true)?;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn items(&self) -> &[BoardItem] {
        &self.items
    }

    /// Tweaked hash of everything posted so far
    pub fn hash(&self, public: bool) -> Result<[u8; 32], Error> {
        hash_items(&self.items, public)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        save_items(&self.items, path)
    }
}

pub fn hash_items(items: &[BoardItem], public: bool) -> Result<[u8; 32], Error> {
    let bytes = if public {
        let public_items: Vec<&BoardItem> = items.iter().filter(|i| i.is_public()).collect();
        serde_json::to_vec(&public_items)?
    } else {
        serde_json::to_vec(items)?
    };
    Ok(secure_hash(&bytes, HASH_TWEAK))
}

/// Hash of the public items posted before the first item with header `stop_before`
pub fn hash_prefix(items: &[BoardItem], stop_before: &str) -> Result<[u8; 32], Error> {
    let end = items
        .iter()
        .position(|i| i.header == stop_before)
        .unwrap_or_else(|| items.len());
    hash_items(&items[..end], true)
}

pub fn save_items<P: AsRef<Path>>(items: &[BoardItem], path: P) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(items)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_items<P: AsRef<Path>>(path: P) -> Result<Vec<BoardItem>, Error> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Recursively merge `update` into `target`: objects merge key by key, anything else replaces
pub fn merge_value(target: &mut Value, update: Value) {
    match (target, update) {
        (Value::Object(target), Value::Object(update)) => {
            for (k, v) in update {
                match target.get_mut(&k) {
                    Some(existing) => merge_value(existing, v),
                    None => {
                        target.insert(k, v);
                    }
                }
            }
        }
        (target, update) => *target = update,
    }
}
