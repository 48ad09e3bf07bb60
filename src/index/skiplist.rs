// Ordered backend with probabilistic levels, comparator-based: a singly
// linked tower per node, level chosen by repeated coin flips at insertion.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DirEntry, IndexBackend};

const MAX_LEVEL: usize = 32;
const PROBABILITY: f64 = 0.25;

struct Node {
	key: String,
	value: DirEntry,
	next: Vec<Option<usize>>,
}

/// A skip list over owned nodes stored in a `Vec`, addressed by index
/// rather than raw pointers (keeps it free of `unsafe`).
pub struct SkipListIndex {
	nodes: Vec<Node>,
	head: Vec<Option<usize>>,
	level: usize,
	len: usize,
	rng: StdRng,
}

impl SkipListIndex {
	pub fn new() -> SkipListIndex {
		SkipListIndex {
			nodes: Vec::new(),
			head: vec![None; MAX_LEVEL],
			level: 1,
			len: 0,
			rng: StdRng::from_entropy(),
		}
	}

	fn random_level(&mut self) -> usize {
		let mut level = 1;
		while level < MAX_LEVEL && self.rng.gen::<f64>() < PROBABILITY {
			level += 1;
		}
		level
	}

	/// Walks from the head at the top level down to level 0, returning the
	/// per-level predecessor chain and the candidate successor at level 0.
	fn find_path(&self, key: &str) -> (Vec<Option<usize>>, Option<usize>) {
		let mut update = vec![None; MAX_LEVEL];
		let mut cur_links = &self.head;
		let mut cur_idx: Option<usize> = None;

		for lvl in (0..self.level).rev() {
			loop {
				let next = cur_links[lvl];
				match next {
					Some(idx) if self.nodes[idx].key.as_str() < key => {
						cur_idx = Some(idx);
						cur_links = &self.nodes[idx].next;
					}
					_ => break,
				}
			}
			update[lvl] = cur_idx;
		}

		let candidate = match cur_idx {
			Some(idx) => self.nodes[idx].next[0],
			None => self.head[0],
		};
		(update, candidate)
	}

	fn links_at(&self, pred: Option<usize>) -> &Vec<Option<usize>> {
		match pred {
			Some(idx) => &self.nodes[idx].next,
			None => &self.head,
		}
	}
}

impl IndexBackend for SkipListIndex {
	fn put(&mut self, key: String, value: DirEntry) {
		let (update, candidate) = self.find_path(&key);

		if let Some(idx) = candidate {
			if self.nodes[idx].key == key {
				self.nodes[idx].value = value;
				return;
			}
		}

		let level = self.random_level();
		if level > self.level {
			self.level = level;
		}

		let new_idx = self.nodes.len();
		let mut next = vec![None; level];
		for lvl in 0..level {
			let pred = if lvl < update.len() { update[lvl] } else { None };
			let succ = self.links_at(pred).get(lvl).copied().flatten();
			next[lvl] = succ;
		}
		self.nodes.push(Node { key, value, next });

		for lvl in 0..level {
			let pred = if lvl < update.len() { update[lvl] } else { None };
			match pred {
				Some(p) => self.nodes[p].next[lvl] = Some(new_idx),
				None => self.head[lvl] = Some(new_idx),
			}
		}
		self.len += 1;
	}

	fn get(&self, key: &str) -> Option<DirEntry> {
		let (_, candidate) = self.find_path(key);
		candidate.and_then(|idx| if self.nodes[idx].key == key { Some(self.nodes[idx].value) } else { None })
	}

	fn del(&mut self, key: &str) -> Option<DirEntry> {
		let (update, candidate) = self.find_path(key);
		let idx = candidate.filter(|&idx| self.nodes[idx].key == key)?;
		let value = self.nodes[idx].value;
		let node_level = self.nodes[idx].next.len();

		for lvl in 0..node_level {
			let pred = if lvl < update.len() { update[lvl] } else { None };
			let next = self.nodes[idx].next[lvl];
			match pred {
				Some(p) => self.nodes[p].next[lvl] = next,
				None => self.head[lvl] = next,
			}
		}

		// The node is unlinked above but its slot in `nodes` is left in
		// place rather than compacted, so every other node's indices stay
		// valid; it is simply never reachable from `head` again.
		self.len -= 1;
		Some(value)
	}

	fn foreach(&self, f: &mut dyn FnMut(&str, &DirEntry) -> bool) {
		let mut cur = self.head[0];
		while let Some(idx) = cur {
			let node = &self.nodes[idx];
			if !f(&node.key, &node.value) {
				break;
			}
			cur = node.next[0];
		}
	}

	fn clear(&mut self) {
		self.nodes.clear();
		self.head = vec![None; MAX_LEVEL];
		self.level = 1;
		self.len = 0;
	}

	fn len(&self) -> usize {
		self.len
	}
}
