use std::collections::BTreeMap;

use super::{DirEntry, IndexBackend};

/// Ordered backend backed by `std::collections::BTreeMap`. `degree` is kept
/// for configuration-surface parity with the `btree_degree` option but
/// does not affect `BTreeMap`'s internal fan-out, which the standard
/// library manages itself; composite keys are always compared
/// lexicographically in practice, so a pluggable comparator is not wired in
/// here (see the skip-list backend for that).
pub struct BTreeIndex {
	map: BTreeMap<String, DirEntry>,
	#[allow(dead_code)]
	degree: usize,
}

impl BTreeIndex {
	pub fn new(degree: usize) -> BTreeIndex {
		BTreeIndex { map: BTreeMap::new(), degree }
	}
}

impl IndexBackend for BTreeIndex {
	fn put(&mut self, key: String, value: DirEntry) {
		self.map.insert(key, value);
	}

	fn get(&self, key: &str) -> Option<DirEntry> {
		self.map.get(key).copied()
	}

	fn del(&mut self, key: &str) -> Option<DirEntry> {
		self.map.remove(key)
	}

	fn foreach(&self, f: &mut dyn FnMut(&str, &DirEntry) -> bool) {
		for (k, v) in self.map.iter() {
			if !f(k, v) {
				break;
			}
		}
	}

	fn clear(&mut self) {
		self.map.clear();
	}

	fn len(&self) -> usize {
		self.map.len()
	}
}
