//! 항목 수 기준 LRU 캐시.
//!
//! 슬랩(`Vec<Node>`)에 이중 연결 리스트를 두고 해시 인덱스로 노드 위치를
//! 찾으므로 조회/삽입/제거가 모두 O(1)입니다. 동기화는 호출자가 담당합니다.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

const NIL: usize = usize::MAX;

struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// LRU 카운터.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LruStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// 용량이 고정된 LRU 캐시.
pub struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slab: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    // 가장 최근
    head: usize,
    // 가장 오래된
    tail: usize,
    stats: LruStats,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// 새 캐시를 생성합니다. 용량 0은 1로 올립니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            slab: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            stats: LruStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> LruStats {
        self.stats
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// 값을 조회하고 가장 최근 항목으로 올립니다.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.index.get(key).copied() {
            Some(idx) => {
                self.stats.hits += 1;
                self.detach(idx);
                self.push_front(idx);
                self.node(idx).map(|n| &n.value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 순서와 카운터를 바꾸지 않고 조회합니다.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index
            .get(key)
            .and_then(|&idx| self.node(idx))
            .map(|n| &n.value)
    }

    /// 값을 넣습니다. 용량 초과로 밀려난 항목이 있으면 반환합니다.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(node) = self.slab[idx].as_mut() {
                node.value = value;
            }
            self.detach(idx);
            self.push_front(idx);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            let evicted = self.pop_back();
            if evicted.is_some() {
                self.stats.evictions += 1;
            }
            evicted
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slab[idx] = Some(node);
                idx
            }
            None => {
                self.slab.push(Some(node));
                self.slab.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);

        evicted
    }

    /// 항목을 제거합니다.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.index.remove(key)?;
        self.detach(idx);
        let node = self.slab[idx].take()?;
        self.free.push(idx);
        Some(node.value)
    }

    /// 모든 항목을 비웁니다. 카운터는 유지합니다.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slab.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// 최근 사용 순서(최근 → 오래된)로 키를 반환합니다.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(node) = self.node(cursor) {
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.slab.get(idx).and_then(|slot| slot.as_ref())
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.node(idx) {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        if prev == NIL {
            self.head = next;
        } else if let Some(p) = self.slab[prev].as_mut() {
            p.next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else if let Some(n) = self.slab[next].as_mut() {
            n.prev = prev;
        }

        if let Some(node) = self.slab[idx].as_mut() {
            node.prev = NIL;
            node.next = NIL;
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slab[idx].as_mut() {
            node.prev = NIL;
            node.next = old_head;
        }
        if old_head != NIL {
            if let Some(h) = self.slab[old_head].as_mut() {
                h.prev = idx;
            }
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn pop_back(&mut self) -> Option<(K, V)> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }
        self.detach(idx);
        let node = self.slab[idx].take()?;
        self.index.remove(&node.key);
        self.free.push(idx);
        Some((node.key, node.value))
    }
}
