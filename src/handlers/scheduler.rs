//! Parallelization scheduler.
//!
//! Partitions a block's events into execution groups with a disjoint-set
//! structure over entity keys. Two events sharing a key, directly or through a
//! chain of other events, land in the same group. Each group keeps its events
//! in the order they were added.

use std::collections::HashMap;

use super::keys::EntityKey;

/// Events connected by shared entity keys, in block order.
#[derive(Debug)]
pub struct ExecutionGroup<T> {
    /// Groups are numbered by the position of their first event in the block.
    pub id: usize,
    pub items: Vec<T>,
}

pub struct ParallelizationScheduler<T> {
    /// Union-find parent links over key nodes
    parent: Vec<usize>,
    size: Vec<usize>,
    key_nodes: HashMap<EntityKey, usize>,
    /// Each item with the key node it was recorded under
    items: Vec<(usize, T)>,
}

impl<T> ParallelizationScheduler<T> {
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            size: Vec::new(),
            key_nodes: HashMap::new(),
            items: Vec::new(),
        }
    }

    /// Record `item` and union all of its keys into one set.
    ///
    /// Callers must reject items without keys before scheduling them; such an
    /// item is kept apart in a group of its own.
    pub fn add(&mut self, item: T, keys: &[EntityKey]) {
        let nodes: Vec<usize> = keys.iter().map(|key| self.node_for(key)).collect();

        let anchor = match nodes.split_first() {
            Some((first, rest)) => rest
                .iter()
                .fold(*first, |anchor, node| self.union(anchor, *node)),
            None => self.new_node(),
        };

        self.items.push((anchor, item));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the scheduler and return the groups, ordered by first appearance.
    pub fn into_groups(mut self) -> Vec<ExecutionGroup<T>> {
        let items = std::mem::take(&mut self.items);
        let mut group_for_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<ExecutionGroup<T>> = Vec::new();

        for (node, item) in items {
            let root = self.find(node);
            let index = *group_for_root.entry(root).or_insert_with(|| {
                groups.push(ExecutionGroup {
                    id: groups.len(),
                    items: Vec::new(),
                });
                groups.len() - 1
            });
            groups[index].items.push(item);
        }

        groups
    }

    fn node_for(&mut self, key: &EntityKey) -> usize {
        if let Some(node) = self.key_nodes.get(key) {
            return *node;
        }
        let node = self.new_node();
        self.key_nodes.insert(key.clone(), node);
        node
    }

    fn new_node(&mut self) -> usize {
        let node = self.parent.len();
        self.parent.push(node);
        self.size.push(1);
        node
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        // Path compression
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }

        root
    }

    /// Union by size. Returns the root of the merged set.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }

        let (large, small) = if self.size[root_a] >= self.size[root_b] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[small] = large;
        self.size[large] += self.size[small];
        large
    }
}

impl<T> Default for ParallelizationScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<EntityKey> {
        names.iter().map(|n| EntityKey::new(*n)).collect()
    }

    fn group_items(groups: &[ExecutionGroup<u32>]) -> Vec<Vec<u32>> {
        groups.iter().map(|g| g.items.clone()).collect()
    }

    #[test]
    fn test_shared_key_groups_events_in_order() {
        let mut scheduler = ParallelizationScheduler::new();
        scheduler.add(0, &keys(&["A"]));
        scheduler.add(1, &keys(&["B"]));
        scheduler.add(2, &keys(&["A"]));

        let groups = scheduler.into_groups();
        assert_eq!(group_items(&groups), vec![vec![0, 2], vec![1]]);
        assert_eq!(groups[0].id, 0);
        assert_eq!(groups[1].id, 1);
    }

    #[test]
    fn test_disjoint_keys_stay_apart() {
        let mut scheduler = ParallelizationScheduler::new();
        for i in 0..4u32 {
            scheduler.add(i, &keys(&[&format!("order-{}", i)]));
        }
        assert_eq!(scheduler.into_groups().len(), 4);
    }

    #[test]
    fn test_bridging_event_merges_groups_transitively() {
        let mut scheduler = ParallelizationScheduler::new();
        scheduler.add(0, &keys(&["A"]));
        scheduler.add(1, &keys(&["B"]));
        scheduler.add(2, &keys(&["C"]));
        scheduler.add(3, &keys(&["A", "B"]));
        scheduler.add(4, &keys(&["B"]));

        let groups = scheduler.into_groups();
        assert_eq!(group_items(&groups), vec![vec![0, 1, 3, 4], vec![2]]);
    }

    #[test]
    fn test_chained_keys_merge() {
        let mut scheduler = ParallelizationScheduler::new();
        scheduler.add(0, &keys(&["A", "X"]));
        scheduler.add(1, &keys(&["B", "Y"]));
        scheduler.add(2, &keys(&["Y", "Z"]));
        scheduler.add(3, &keys(&["Z", "X"]));

        let groups = scheduler.into_groups();
        assert_eq!(group_items(&groups), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_keyless_item_is_isolated() {
        let mut scheduler = ParallelizationScheduler::new();
        scheduler.add(0, &keys(&["A"]));
        scheduler.add(1, &[]);
        scheduler.add(2, &keys(&["A"]));

        let groups = scheduler.into_groups();
        assert_eq!(group_items(&groups), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_empty_scheduler() {
        let scheduler: ParallelizationScheduler<u32> = ParallelizationScheduler::new();
        assert!(scheduler.is_empty());
        assert!(scheduler.into_groups().is_empty());
    }
}
