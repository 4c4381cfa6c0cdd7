use std::collections::HashMap;

use log::warn;

use crate::model::board_item::BoardItem;

/// Lookup from source key to board item, built from the correlation field
/// each board item carries.
pub struct CorrelationIndex<'a> {
    by_key: HashMap<&'a str, &'a BoardItem>,
    /// Source keys that appeared on more than one board item. Should not
    /// happen under correct operation; surfaced so the run can warn loudly
    /// instead of silently shadowing.
    pub duplicates: Vec<String>,
}

impl<'a> CorrelationIndex<'a> {
    /// Index board items by the value of the correlation field. Items with
    /// an empty or absent correlation value are ignored. On duplicate keys
    /// the later item wins the map slot and the key is recorded.
    pub fn build(items: &'a [BoardItem], key_field_id: &str) -> Self {
        let mut by_key: HashMap<&str, &BoardItem> = HashMap::with_capacity(items.len());
        let mut duplicates = Vec::new();

        for item in items {
            let Some(key) = item.text_field(key_field_id) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = by_key.insert(key, item) {
                warn!(
                    "duplicate correlation key '{key}': board items {} and {} both claim it",
                    previous.id, item.id
                );
                duplicates.push(key.to_string());
            }
        }

        Self { by_key, duplicates }
    }

    pub fn get(&self, source_key: &str) -> Option<&'a BoardItem> {
        self.by_key.get(source_key).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
