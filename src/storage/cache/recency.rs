//! Arena-backed doubly linked recency list.

/// Index of a node in the arena. Stable while the node is linked.
pub(super) type NodeId = usize;

struct Node<T> {
    value: T,
    /// Neighbor toward the head (more recently used).
    newer: Option<NodeId>,
    /// Neighbor toward the tail (less recently used).
    older: Option<NodeId>,
}

/// Recency-ordered list with O(1) push, unlink and move-to-front.
///
/// Nodes live in a `Vec` of slots linked by index; freed slots are recycled.
/// Head is the most recently used element, tail the least.
pub(super) struct RecencyList<T> {
    slots: Vec<Option<Node<T>>>,
    free_slots: Vec<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl<T> RecencyList<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id)?.as_ref().map(|n| &n.value)
    }

    /// Inserts `value` at the head and returns its node id.
    pub fn push_front(&mut self, value: T) -> NodeId {
        let node = Node {
            value,
            newer: None,
            older: self.head,
        };
        let id = match self.free_slots.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.head
            && let Some(n) = self.slots[old_head].as_mut()
        {
            n.newer = Some(id);
        }
        self.head = Some(id);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
        self.len += 1;
        id
    }

    /// Unlinks a node and returns its value, or `None` if `id` is not linked.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let node = self.slots.get_mut(id)?.take()?;
        self.link_neighbors(node.newer, node.older);
        self.free_slots.push(id);
        self.len -= 1;
        Some(node.value)
    }

    /// Moves a linked node to the head. No-op for unknown ids.
    pub fn move_to_front(&mut self, id: NodeId) {
        if self.head == Some(id) {
            return;
        }
        let Some(node) = self.slots.get(id).and_then(Option::as_ref) else {
            return;
        };
        let (newer, older) = (node.newer, node.older);
        self.link_neighbors(newer, older);

        let old_head = self.head;
        if let Some(n) = self.slots[id].as_mut() {
            n.newer = None;
            n.older = old_head;
        }
        if let Some(h) = old_head
            && let Some(n) = self.slots[h].as_mut()
        {
            n.newer = Some(id);
        }
        self.head = Some(id);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
    }

    /// Iterates from head (most recent) to tail (least recent).
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            next: self.head,
        }
    }

    /// Joins the two neighbors of a node being unlinked.
    fn link_neighbors(&mut self, newer: Option<NodeId>, older: Option<NodeId>) {
        match newer {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.older = older;
                }
            }
            None => self.head = older,
        }
        match older {
            Some(o) => {
                if let Some(node) = self.slots[o].as_mut() {
                    node.newer = newer;
                }
            }
            None => self.tail = newer,
        }
    }
}

pub(super) struct Iter<'a, T> {
    list: &'a RecencyList<T>,
    next: Option<NodeId>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.list.slots.get(id)?.as_ref()?;
        self.next = node.older;
        Some((id, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &RecencyList<char>) -> Vec<char> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_empty() {
        let list: RecencyList<char> = RecencyList::with_capacity(3);
        assert_eq!(list.len(), 0);
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);
    }

    #[test]
    fn test_push_front_order() {
        let mut list = RecencyList::with_capacity(3);
        list.push_front('a');
        list.push_front('b');
        list.push_front('c');
        assert_eq!(values(&list), vec!['c', 'b', 'a']);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::with_capacity(3);
        let a = list.push_front('a');
        list.push_front('b');
        list.push_front('c');

        list.move_to_front(a);
        assert_eq!(values(&list), vec!['a', 'c', 'b']);
        assert_eq!(list.head(), Some(a));

        // Moving the head is a no-op.
        list.move_to_front(a);
        assert_eq!(values(&list), vec!['a', 'c', 'b']);
    }

    #[test]
    fn test_move_tail_to_front_updates_tail() {
        let mut list = RecencyList::with_capacity(2);
        let a = list.push_front('a');
        let b = list.push_front('b');

        list.move_to_front(a);
        assert_eq!(list.tail(), Some(b));
        assert_eq!(values(&list), vec!['a', 'b']);
    }

    #[test]
    fn test_remove_middle_head_tail() {
        let mut list = RecencyList::with_capacity(3);
        let a = list.push_front('a');
        let b = list.push_front('b');
        let c = list.push_front('c');

        assert_eq!(list.remove(b), Some('b'));
        assert_eq!(values(&list), vec!['c', 'a']);

        assert_eq!(list.remove(c), Some('c'));
        assert_eq!(list.head(), Some(a));
        assert_eq!(list.tail(), Some(a));

        assert_eq!(list.remove(a), Some('a'));
        assert_eq!(list.len(), 0);
        assert_eq!(list.head(), None);
        assert_eq!(list.tail(), None);

        assert_eq!(list.remove(a), None);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut list = RecencyList::with_capacity(2);
        let a = list.push_front('a');
        list.remove(a);
        let b = list.push_front('b');
        assert_eq!(a, b);
        assert_eq!(list.get(b), Some(&'b'));
    }
}
