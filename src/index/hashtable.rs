use std::collections::HashMap;

use super::{DirEntry, IndexBackend};

/// Unordered backend; best for point lookups, makes no ordering promise.
pub struct HashTableIndex {
	map: HashMap<String, DirEntry>,
}

impl HashTableIndex {
	pub fn new() -> HashTableIndex {
		HashTableIndex { map: HashMap::new() }
	}
}

impl IndexBackend for HashTableIndex {
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
