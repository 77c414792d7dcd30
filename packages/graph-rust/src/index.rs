//! Full-text and value index over one hash-trie.
//!
//! Two parallel indices share a single tree per (partition, kind):
//!
//! - **Word entries** (`0x01 ‖ attr ‖ word`): map node key to the packed
//!   ascending list of 1-based word positions within that attribute
//! - **Value entries** (`0x02 ‖ attr ‖ md5(value)`): set of node keys
//!   whose attribute equals the hashed value
//!
//! Words are Unicode alphanumeric runs; everything else separates.
//! Unless the engine is configured case-sensitive, words and hashed
//! values are lowercased on the way in and on lookup.
//!
//! Position lists are packed with a leading width byte (1, 2, 4, or 8)
//! followed by little-endian entries of that width, sized by the largest
//! position in the list.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_bytes::ByteBuf;

use lattice_core::htree::HTree;

use crate::error::{GraphError, GraphResult};

/// Tree entry prefix of word/position entries.
pub const PREFIX_WORD_ENTRY: u8 = 0x01;
/// Tree entry prefix of value-hash entries.
pub const PREFIX_VALUE_ENTRY: u8 = 0x02;

type WordEntry = BTreeMap<String, ByteBuf>;
type ValueEntry = BTreeSet<String>;

/// Word-position and value-hash index for one (partition, kind).
pub struct IndexManager {
    tree: HTree,
    case_sensitive: bool,
}

impl IndexManager {
    /// Creates an index manager over its tree.
    #[must_use]
    pub fn new(tree: HTree, case_sensitive: bool) -> Self {
        Self {
            tree,
            case_sensitive,
        }
    }

    /// Adds all entries for a freshly stored item.
    pub fn index(&self, key: &str, attrs: &BTreeMap<String, String>) -> GraphResult<()> {
        self.apply(key, None, Some(attrs))
    }

    /// Removes all entries of a deleted item.
    pub fn deindex(&self, key: &str, attrs: &BTreeMap<String, String>) -> GraphResult<()> {
        self.apply(key, Some(attrs), None)
    }

    /// Moves an item's entries from its old to its new attribute state,
    /// touching only the positions that actually changed.
    pub fn reindex(
        &self,
        key: &str,
        new_attrs: &BTreeMap<String, String>,
        old_attrs: &BTreeMap<String, String>,
    ) -> GraphResult<()> {
        self.apply(key, Some(old_attrs), Some(new_attrs))
    }

    /// Returns node key -> word positions for a word.
    pub fn lookup_word(
        &self,
        attr: &str,
        word: &str,
    ) -> GraphResult<BTreeMap<String, Vec<u64>>> {
        let entry = self.load_word_entry(attr, &self.fold(word))?;
        Ok(entry
            .into_iter()
            .map(|(key, packed)| (key, unpack_positions(&packed)))
            .collect())
    }

    /// Returns the node keys containing the phrase: every word present
    /// with strictly consecutive positions. Sorted lexicographically.
    pub fn lookup_phrase(&self, attr: &str, phrase: &str) -> GraphResult<Vec<String>> {
        let folded = self.fold(phrase);
        let words = split_words(&folded);
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(words.len());
        for word in &words {
            entries.push(self.load_word_entry(attr, word)?);
        }

        let mut result = Vec::new();
        'candidates: for (key, packed) in &entries[0] {
            let mut lists: Vec<Vec<u64>> = Vec::with_capacity(entries.len());
            lists.push(unpack_positions(packed));
            for entry in &entries[1..] {
                match entry.get(key) {
                    Some(packed) => lists.push(unpack_positions(packed)),
                    None => continue 'candidates,
                }
            }
            if lists[0]
                .iter()
                .any(|&start| has_consecutive_run(&lists, 1, start))
            {
                result.push(key.clone());
            }
        }
        Ok(result)
    }

    /// Returns the node keys whose attribute equals the given value.
    /// Sorted lexicographically.
    pub fn lookup_value(&self, attr: &str, value: &str) -> GraphResult<Vec<String>> {
        let entry_key = self.value_entry_key(attr, value);
        let entry: ValueEntry = match self.tree.get(&entry_key).map_err(GraphError::index)? {
            Some(data) => rmp_serde::from_slice(&data).map_err(GraphError::index)?,
            None => ValueEntry::new(),
        };
        Ok(entry.into_iter().collect())
    }

    /// Number of distinct node keys containing a word.
    pub fn count(&self, attr: &str, word: &str) -> GraphResult<usize> {
        Ok(self.load_word_entry(attr, &self.fold(word))?.len())
    }

    // -----------------------------------------------------------------------
    // Mutation plumbing
    // -----------------------------------------------------------------------

    /// Shared engine behind index/deindex/reindex: diffs the old against
    /// the new attribute state and applies only the changes.
    fn apply(
        &self,
        key: &str,
        old_attrs: Option<&BTreeMap<String, String>>,
        new_attrs: Option<&BTreeMap<String, String>>,
    ) -> GraphResult<()> {
        let empty = BTreeMap::new();
        let old_attrs = old_attrs.unwrap_or(&empty);
        let new_attrs = new_attrs.unwrap_or(&empty);

        let attr_names: BTreeSet<&String> =
            old_attrs.keys().chain(new_attrs.keys()).collect();

        for attr in attr_names {
            let old_text = old_attrs.get(attr.as_str()).map(|text| self.fold(text));
            let new_text = new_attrs.get(attr.as_str()).map(|text| self.fold(text));

            let old_words = old_text.as_deref().map(word_positions).unwrap_or_default();
            let new_words = new_text.as_deref().map(word_positions).unwrap_or_default();

            let words: BTreeSet<&String> = old_words.keys().chain(new_words.keys()).collect();
            for word in words {
                let old_positions = old_words.get(word.as_str());
                let new_positions = new_words.get(word.as_str());

                let removed: BTreeSet<u64> = difference(old_positions, new_positions);
                let added: BTreeSet<u64> = difference(new_positions, old_positions);
                if removed.is_empty() && added.is_empty() {
                    continue;
                }
                self.update_word_entry(attr, word, key, &removed, &added)?;
            }

            if old_text != new_text {
                if let Some(old_text) = &old_text {
                    self.update_value_entry(attr, old_text, key, false)?;
                }
                if let Some(new_text) = &new_text {
                    self.update_value_entry(attr, new_text, key, true)?;
                }
            }
        }
        Ok(())
    }

    fn update_word_entry(
        &self,
        attr: &str,
        word: &str,
        key: &str,
        removed: &BTreeSet<u64>,
        added: &BTreeSet<u64>,
    ) -> GraphResult<()> {
        let entry_key = word_entry_key(attr, word);
        let mut entry = self.load_word_entry_raw(&entry_key)?;

        let mut positions: BTreeSet<u64> = entry
            .get(key)
            .map(|packed| unpack_positions(packed).into_iter().collect())
            .unwrap_or_default();
        positions.retain(|pos| !removed.contains(pos));
        positions.extend(added);

        if positions.is_empty() {
            entry.remove(key);
        } else {
            entry.insert(key.to_string(), pack_positions(&positions));
        }

        if entry.is_empty() {
            self.tree.remove(&entry_key).map_err(GraphError::index)?;
        } else {
            let data = rmp_serde::to_vec(&entry).map_err(GraphError::index)?;
            self.tree.put(&entry_key, data).map_err(GraphError::index)?;
        }
        Ok(())
    }

    /// Adds or removes one node key in a value-hash entry. The `folded`
    /// text must already be case folded.
    fn update_value_entry(
        &self,
        attr: &str,
        folded: &str,
        key: &str,
        add: bool,
    ) -> GraphResult<()> {
        let mut entry_key = Vec::with_capacity(1 + attr.len() + 16);
        entry_key.push(PREFIX_VALUE_ENTRY);
        entry_key.extend_from_slice(attr.as_bytes());
        entry_key.extend_from_slice(&md5::compute(folded.as_bytes()).0);

        let mut entry: ValueEntry = match self.tree.get(&entry_key).map_err(GraphError::index)? {
            Some(data) => rmp_serde::from_slice(&data).map_err(GraphError::index)?,
            None => ValueEntry::new(),
        };

        let changed = if add {
            entry.insert(key.to_string())
        } else {
            entry.remove(key)
        };
        if !changed {
            return Ok(());
        }

        if entry.is_empty() {
            self.tree.remove(&entry_key).map_err(GraphError::index)?;
        } else {
            let data = rmp_serde::to_vec(&entry).map_err(GraphError::index)?;
            self.tree.put(&entry_key, data).map_err(GraphError::index)?;
        }
        Ok(())
    }

    fn load_word_entry(&self, attr: &str, folded_word: &str) -> GraphResult<WordEntry> {
        self.load_word_entry_raw(&word_entry_key(attr, folded_word))
    }

    fn load_word_entry_raw(&self, entry_key: &[u8]) -> GraphResult<WordEntry> {
        match self.tree.get(entry_key).map_err(GraphError::index)? {
            Some(data) => rmp_serde::from_slice(&data).map_err(GraphError::index),
            None => Ok(WordEntry::new()),
        }
    }

    fn value_entry_key(&self, attr: &str, value: &str) -> Vec<u8> {
        let folded = self.fold(value);
        let mut out = Vec::with_capacity(1 + attr.len() + 16);
        out.push(PREFIX_VALUE_ENTRY);
        out.extend_from_slice(attr.as_bytes());
        out.extend_from_slice(&md5::compute(folded.as_bytes()).0);
        out
    }

    fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }
}

fn word_entry_key(attr: &str, word: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + attr.len() + word.len());
    out.push(PREFIX_WORD_ENTRY);
    out.extend_from_slice(attr.as_bytes());
    out.extend_from_slice(word.as_bytes());
    out
}

fn difference(
    left: Option<&BTreeSet<u64>>,
    right: Option<&BTreeSet<u64>>,
) -> BTreeSet<u64> {
    match (left, right) {
        (None, _) => BTreeSet::new(),
        (Some(left), None) => left.clone(),
        (Some(left), Some(right)) => left.difference(right).copied().collect(),
    }
}

/// Splits text into words: Unicode alphanumeric runs, in order.
fn split_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|run| !run.is_empty())
        .collect()
}

/// Word -> set of 1-based positions within the text.
fn word_positions(text: &str) -> HashMap<String, BTreeSet<u64>> {
    let mut out: HashMap<String, BTreeSet<u64>> = HashMap::new();
    for (index, word) in split_words(text).into_iter().enumerate() {
        out.entry(word.to_string())
            .or_default()
            .insert(index as u64 + 1);
    }
    out
}

/// Checks for a strictly consecutive position run across all lists,
/// continuing from `previous` at list index `depth`.
fn has_consecutive_run(lists: &[Vec<u64>], depth: usize, previous: u64) -> bool {
    if depth == lists.len() {
        return true;
    }
    lists[depth].binary_search(&(previous + 1)).is_ok()
        && has_consecutive_run(lists, depth + 1, previous + 1)
}

fn pack_positions(positions: &BTreeSet<u64>) -> ByteBuf {
    let max = positions.iter().next_back().copied().unwrap_or(0);
    let width: usize = if max <= u64::from(u8::MAX) {
        1
    } else if max <= u64::from(u16::MAX) {
        2
    } else if max <= u64::from(u32::MAX) {
        4
    } else {
        8
    };

    let mut out = Vec::with_capacity(1 + positions.len() * width);
    #[allow(clippy::cast_possible_truncation)]
    out.push(width as u8);
    for position in positions {
        out.extend_from_slice(&position.to_le_bytes()[..width]);
    }
    ByteBuf::from(out)
}

fn unpack_positions(data: &[u8]) -> Vec<u64> {
    let Some((&width, payload)) = data.split_first() else {
        return Vec::new();
    };
    let width = usize::from(width);
    if width == 0 || payload.len() % width != 0 {
        return Vec::new();
    }
    payload
        .chunks_exact(width)
        .map(|chunk| {
            let mut bytes = [0_u8; 8];
            bytes[..width].copy_from_slice(chunk);
            u64::from_le_bytes(bytes)
        })
        .collect()
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::{pack_positions, unpack_positions};

    proptest! {
        /// Packed position lists survive the round trip for any
        /// ascending set of positions.
        #[test]
        fn pack_round_trip(
            positions in proptest::collection::btree_set(1_u64..1_000_000, 1..50),
        ) {
            let expected: Vec<u64> = positions.iter().copied().collect();
            let unpacked = unpack_positions(&pack_positions(&positions));
            prop_assert_eq!(expected, unpacked);
        }

        /// The width byte always matches the largest position.
        #[test]
        fn width_matches_largest_position(
            positions in proptest::collection::btree_set(1_u64..u64::MAX / 2, 1..20),
        ) {
            let packed = pack_positions(&positions);
            let max = *positions.iter().next_back().expect("non-empty");
            let expected_width: u8 = if max <= u64::from(u8::MAX) { 1 }
                else if max <= u64::from(u16::MAX) { 2 }
                else if max <= u64::from(u32::MAX) { 4 }
                else { 8 };
            prop_assert_eq!(packed[0], expected_width);
            prop_assert_eq!((packed.len() - 1) % usize::from(expected_width), 0);
        }
    }
}

#[cfg(test)]
mod word_split_tests {
    use super::*;

    #[test]
    fn alphanumeric_runs_separate_on_punctuation_and_space() {
        assert_eq!(
            split_words("word4, word5, word6!"),
            vec!["word4", "word5", "word6"]
        );
        // Underscores are not alphanumeric and separate runs too.
        assert_eq!(split_words("a-b_c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn unicode_words_are_kept_whole() {
        assert_eq!(split_words("héllo wörld"), vec!["héllo", "wörld"]);
    }

    #[test]
    fn empty_and_punctuation_only_texts_have_no_words() {
        assert!(split_words("").is_empty());
        assert!(split_words("..., --- !!!").is_empty());
    }
}
