//! Access-ordered entry index
//!
//! Entries live in an arena of slots addressed by integer handles. The LRU
//! order is a doubly linked list threaded through the slots by handle, and a
//! `HashMap` maps keys to handles. Lookup, move-to-most-recent, insert and
//! removal are O(1); vacated slots are recycled through a free list.

use std::collections::HashMap;

type Handle = usize;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    prev: Option<Handle>,
    next: Option<Handle>,
}

#[derive(Debug)]
pub struct LruIndex<V> {
    slots: Vec<Option<Node<V>>>,
    free: Vec<Handle>,
    handles: HashMap<String, Handle>,
    /// Least recently used
    head: Option<Handle>,
    /// Most recently used
    tail: Option<Handle>,
}

impl<V> Default for LruIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> LruIndex<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            handles: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&mut self, key: &str) -> Option<&mut V> {
        let handle = *self.handles.get(key)?;
        self.move_to_back(handle);
        Some(&mut self.node_mut(handle).value)
    }

    /// Look up an entry without touching the order
    pub fn peek(&self, key: &str) -> Option<&V> {
        let handle = *self.handles.get(key)?;
        Some(&self.node(handle).value)
    }

    pub fn peek_mut(&mut self, key: &str) -> Option<&mut V> {
        let handle = *self.handles.get(key)?;
        Some(&mut self.node_mut(handle).value)
    }

    /// Mark an entry most recently used. Returns false if the key is absent.
    pub fn touch(&mut self, key: &str) -> bool {
        match self.handles.get(key) {
            Some(&handle) => {
                self.move_to_back(handle);
                true
            }
            None => false,
        }
    }

    /// Mark `key` most recently used, inserting `make()` first if absent
    pub fn get_or_insert_with(&mut self, key: &str, make: impl FnOnce() -> V) -> &mut V {
        let handle = match self.handles.get(key) {
            Some(&handle) => {
                self.move_to_back(handle);
                handle
            }
            None => {
                self.insert(key.to_string(), make());
                self.handles[key]
            }
        };
        &mut self.node_mut(handle).value
    }

    /// Insert as most recently used, returning the value previously stored
    /// under `key`.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        if let Some(&handle) = self.handles.get(&key) {
            self.move_to_back(handle);
            return Some(std::mem::replace(&mut self.node_mut(handle).value, value));
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = Some(node);
                handle
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.handles.insert(key, handle);
        self.push_back(handle);
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let handle = self.handles.remove(key)?;
        self.unlink(handle);
        let node = self.slots[handle].take()?;
        self.free.push(handle);
        Some(node.value)
    }

    pub fn least_recently_used(&self) -> Option<(&str, &V)> {
        self.head.map(|handle| {
            let node = self.node(handle);
            (node.key.as_str(), &node.value)
        })
    }

    pub fn remove_least_recently_used(&mut self) -> Option<(String, V)> {
        let key = self.least_recently_used()?.0.to_string();
        let value = self.remove(&key)?;
        Some((key, value))
    }

    /// Iterate from least to most recently used
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            index: self,
            cursor: self.head,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.iter().map(|(key, _)| key.to_string()).collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.handles.clear();
        self.head = None;
        self.tail = None;
    }

    fn node(&self, handle: Handle) -> &Node<V> {
        self.slots[handle]
            .as_ref()
            .expect("linked handle points at a vacant slot")
    }

    fn node_mut(&mut self, handle: Handle) -> &mut Node<V> {
        self.slots[handle]
            .as_mut()
            .expect("linked handle points at a vacant slot")
    }

    fn unlink(&mut self, handle: Handle) {
        let (prev, next) = {
            let node = self.node(handle);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(handle);
        node.prev = None;
        node.next = None;
    }

    fn push_back(&mut self, handle: Handle) {
        let old_tail = self.tail;
        {
            let node = self.node_mut(handle);
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.node_mut(t).next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
    }

    fn move_to_back(&mut self, handle: Handle) {
        if self.tail != Some(handle) {
            self.unlink(handle);
            self.push_back(handle);
        }
    }
}

pub struct Iter<'a, V> {
    index: &'a LruIndex<V>,
    cursor: Option<Handle>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.node(self.cursor?);
        self.cursor = node.next;
        Some((node.key.as_str(), &node.value))
    }
}
