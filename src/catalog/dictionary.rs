//! String dictionaries for dictionary-encoded text columns

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::{FragError, Result};

/// Id↔string map backing one dictionary-encoded column family.
///
/// Ids are dense and start at 1 (0 is reserved as invalid). The interior
/// mutex makes the dictionary shareable; id-allocation order across an
/// update's parallel tasks is additionally serialized by the owning
/// fragmenter's dictionary lock.
#[derive(Default)]
pub struct StringDictionary {
    inner: Mutex<DictInner>,
}

#[derive(Default)]
struct DictInner {
    strings: Vec<String>,
    ids: AHashMap<String, i32>,
}

impl StringDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the id for `s`, adding it if absent
    pub fn get_or_add(&self, s: &str) -> i32 {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.ids.get(s) {
            return id;
        }
        inner.strings.push(s.to_string());
        let id = inner.strings.len() as i32;
        inner.ids.insert(s.to_string(), id);
        id
    }

    /// Materialize the string for `id`
    pub fn get_string(&self, id: i32) -> Result<String> {
        let inner = self.inner.lock();
        if id < 1 || id as usize > inner.strings.len() {
            return Err(FragError::InvalidValue(format!(
                "string id {id} not in dictionary"
            )));
        }
        Ok(inner.strings[(id - 1) as usize].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Catalog entry tying a dictionary id to its dictionary
pub struct DictDescriptor {
    pub dict_id: i32,
    pub dict: StringDictionary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_add_dedups() {
        let dict = StringDictionary::new();
        assert_eq!(dict.get_or_add("a"), 1);
        assert_eq!(dict.get_or_add("b"), 2);
        assert_eq!(dict.get_or_add("a"), 1);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_get_string_round_trip() {
        let dict = StringDictionary::new();
        let id = dict.get_or_add("hello");
        assert_eq!(dict.get_string(id).unwrap(), "hello");
        assert!(dict.get_string(0).is_err());
        assert!(dict.get_string(99).is_err());
    }
}
