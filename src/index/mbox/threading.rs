//! JWZ threading over `Message-ID`, `In-Reply-To` and `References`.
//!
//! Reference: <https://www.jwz.org/doc/threading.html>
//!
//! Only the container-linking step is used: every message ends up in a
//! tree, and each tree root becomes one thread. Subject-based merging is
//! not performed.

use std::collections::HashMap;

use super::header::IndexEntry;

/// Parent-chain walks give up after this many hops.
const MAX_DEPTH: usize = 1000;

#[derive(Debug, Default)]
struct Container {
    parent: Option<String>,
}

/// Assign `thread_id` to every entry.
///
/// Thread ids are 16 hex digits, numbered in order of the first message of
/// each thread in `entries`.
pub fn assign_threads(entries: &mut [IndexEntry]) {
    let mut containers: HashMap<String, Container> = HashMap::new();

    for entry in entries.iter() {
        containers.entry(entry.message_id.clone()).or_default();

        let mut refs: Vec<&String> = entry.references.iter().collect();
        if let Some(reply_to) = &entry.in_reply_to {
            if !refs.contains(&reply_to) {
                refs.push(reply_to);
            }
        }
        for id in &refs {
            containers.entry((*id).clone()).or_default();
        }

        // References A B C link A→B→C, without replacing links already known.
        for pair in refs.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            let unlinked = containers.get(child).is_some_and(|c| c.parent.is_none());
            if unlinked && parent != child && !would_create_cycle(&containers, parent, child) {
                if let Some(c) = containers.get_mut(child) {
                    c.parent = Some(parent.clone());
                }
            }
        }

        // The message itself is authoritative about its own parent.
        if let Some(parent) = refs.last() {
            let mid = &entry.message_id;
            if *parent != mid && !would_create_cycle(&containers, parent, mid) {
                if let Some(c) = containers.get_mut(mid) {
                    c.parent = Some((*parent).clone());
                }
            }
        }
    }

    let mut numbers: HashMap<String, usize> = HashMap::new();
    for entry in entries.iter_mut() {
        let root = find_root(&containers, &entry.message_id);
        let next = numbers.len();
        let number = *numbers.entry(root).or_insert(next);
        entry.thread_id = format_thread_id(number);
    }
}

pub fn format_thread_id(number: usize) -> String {
    format!("{number:016x}")
}

/// Would making `parent_id` the parent of `child_id` close a loop?
fn would_create_cycle(
    containers: &HashMap<String, Container>,
    parent_id: &str,
    child_id: &str,
) -> bool {
    let mut current = Some(parent_id);
    let mut depth = 0;
    while let Some(id) = current {
        if id == child_id || depth > MAX_DEPTH {
            return true;
        }
        depth += 1;
        current = containers.get(id).and_then(|c| c.parent.as_deref());
    }
    false
}

fn find_root(containers: &HashMap<String, Container>, id: &str) -> String {
    let mut current = id;
    for _ in 0..MAX_DEPTH {
        match containers.get(current).and_then(|c| c.parent.as_deref()) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.to_string()
}
