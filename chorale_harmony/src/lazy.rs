// Lazy, multi-consumer, memoized search trees.
//
// Both searches (chord choice and voicing) produce possibly huge trees of
// alternatives that callers explore depth-first and usually abandon early.
// Two pieces make that cheap:
//
// `Memo<T>` is an index-addressable, append-only buffer in front of a
// suspended iterator. Reading index `i` replays the buffer and only advances
// the iterator when `i` has not been produced yet, so any number of cursors
// can walk the same sequence and every element is computed at most once.
// The iterator itself can be deferred (a thunk that builds it on first read).
//
// `Forest<T>` is a memoized sequence of `Node`s, each a value plus an
// optional continuation forest. `rest: None` marks the end of a complete
// path; `rest: Some(forest)` must be extended further. Forests are cheap to
// clone (shared `Rc`), which is what lets the harmonizer cache hand the same
// sub-tree to every branch that converges on it.
//
// Single-threaded by construction (`Rc<RefCell<..>>`). A read must never
// re-enter a memo while its iterator is being advanced; debug builds assert
// this, release builds see the sequence as ended at that point.
//
// See also: `harmonizer.rs` and `part_writer.rs` (producers), `ordering.rs`
// (sibling reordering).

use std::cell::RefCell;
use std::rc::Rc;

type Producer<T> = Box<dyn Iterator<Item = T>>;
type Thunk<T> = Box<dyn FnOnce() -> Producer<T>>;

enum Source<T> {
    Pending(Thunk<T>),
    Running(Producer<T>),
    /// Taken out while being advanced.
    Busy,
    Done,
}

struct MemoState<T> {
    values: Vec<T>,
    source: Source<T>,
}

/// A memoized, shareable view of an iterator.
pub struct Memo<T>(Rc<RefCell<MemoState<T>>>);

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Memo(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> Memo<T> {
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Memo::with_source(Source::Running(Box::new(iter.into_iter())))
    }

    /// Build the underlying iterator only when the first element is read.
    pub fn deferred<F, I>(build: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Memo::with_source(Source::Pending(Box::new(move || {
            Box::new(build().into_iter()) as Producer<T>
        })))
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        Memo(Rc::new(RefCell::new(MemoState {
            values,
            source: Source::Done,
        })))
    }

    fn with_source(source: Source<T>) -> Self {
        Memo(Rc::new(RefCell::new(MemoState {
            values: Vec::new(),
            source,
        })))
    }

    /// Element `index`, producing it (and everything before it) if needed.
    pub fn get(&self, index: usize) -> Option<T> {
        loop {
            {
                let state = self.0.borrow();
                if let Some(value) = state.values.get(index) {
                    return Some(value.clone());
                }
            }
            let source = std::mem::replace(&mut self.0.borrow_mut().source, Source::Busy);
            debug_assert!(!matches!(source, Source::Busy), "memo re-entered while producing");
            let mut producer = match source {
                Source::Pending(thunk) => thunk(),
                Source::Running(producer) => producer,
                Source::Busy => return None,
                Source::Done => {
                    self.0.borrow_mut().source = Source::Done;
                    return None;
                }
            };
            let next = producer.next();
            let mut state = self.0.borrow_mut();
            match next {
                Some(value) => {
                    state.values.push(value);
                    state.source = Source::Running(producer);
                }
                None => {
                    state.source = Source::Done;
                    return None;
                }
            }
        }
    }

    /// Number of elements produced so far (without producing more).
    pub fn materialized(&self) -> usize {
        self.0.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.get(0).is_none()
    }

    /// A fresh cursor starting at index 0.
    pub fn iter(&self) -> MemoIter<T> {
        MemoIter {
            memo: self.clone(),
            index: 0,
        }
    }
}

/// Cursor over a `Memo`. Independent of every other cursor on the same memo.
pub struct MemoIter<T> {
    memo: Memo<T>,
    index: usize,
}

impl<T: Clone + 'static> Iterator for MemoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let value = self.memo.get(self.index)?;
        self.index += 1;
        Some(value)
    }
}

/// One alternative at one level of a search tree.
#[derive(Clone)]
pub struct Node<T> {
    pub value: T,
    /// `None` when the path ends here.
    pub rest: Option<Forest<T>>,
}

impl<T> Node<T> {
    pub fn leaf(value: T) -> Self {
        Node { value, rest: None }
    }

    pub fn branch(value: T, rest: Forest<T>) -> Self {
        Node {
            value,
            rest: Some(rest),
        }
    }
}

/// A lazily expanded, memoized sequence of alternatives, each with its own
/// continuation.
pub struct Forest<T>(Memo<Node<T>>);

impl<T> Clone for Forest<T> {
    fn clone(&self) -> Self {
        Forest(self.0.clone())
    }
}

impl<T: Clone + 'static> Forest<T> {
    pub fn new<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node<T>>,
        I::IntoIter: 'static,
    {
        Forest(Memo::new(nodes))
    }

    pub fn deferred<F, I>(build: F) -> Self
    where
        F: FnOnce() -> I + 'static,
        I: IntoIterator<Item = Node<T>>,
        I::IntoIter: 'static,
    {
        Forest(Memo::deferred(build))
    }

    pub fn from_vec(nodes: Vec<Node<T>>) -> Self {
        Forest(Memo::from_vec(nodes))
    }

    pub fn empty() -> Self {
        Forest::from_vec(Vec::new())
    }

    /// Peek at the first alternative without disturbing other cursors.
    pub fn first(&self) -> Option<Node<T>> {
        self.0.get(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> MemoIter<Node<T>> {
        self.0.iter()
    }

    /// Alternatives produced so far at this level.
    pub fn materialized(&self) -> usize {
        self.0.materialized()
    }

    /// Every complete root-to-leaf path, depth-first, in sibling order.
    pub fn paths(&self) -> Paths<T> {
        Paths {
            stack: vec![self.iter()],
            prefix: Vec::new(),
        }
    }

    /// Complete paths whose summed `weight` is exactly `total`. Branches
    /// whose prefix already exceeds `total` are not descended into.
    pub fn paths_of_weight<W>(&self, total: usize, weight: W) -> impl Iterator<Item = Vec<T>> + use<T, W>
    where
        W: Fn(&T) -> usize + 'static,
    {
        let weight = Rc::new(weight);
        let within = {
            let weight = Rc::clone(&weight);
            move |parent_sum: usize, value: &T| parent_sum + weight(value) <= total
        };
        self.bounded(0, Rc::new(within), Rc::clone(&weight))
            .paths()
            .filter(move |path| path.iter().map(|v| weight(v)).sum::<usize>() == total)
    }

    fn bounded<K, W>(&self, sum: usize, keep: Rc<K>, weight: Rc<W>) -> Forest<T>
    where
        K: Fn(usize, &T) -> bool + 'static,
        W: Fn(&T) -> usize + 'static,
    {
        let source = self.clone();
        Forest::deferred(move || {
            source.iter().filter_map(move |node| {
                if !keep(sum, &node.value) {
                    return None;
                }
                let below = sum + weight(&node.value);
                let rest = node
                    .rest
                    .map(|rest| rest.bounded(below, Rc::clone(&keep), Rc::clone(&weight)));
                Some(Node {
                    value: node.value,
                    rest,
                })
            })
        })
    }

    /// Keep only nodes accepted by `keep(parent, value)`, recursively, and
    /// drop any node whose continuation ends up with no alternatives. Dead
    /// branches are discovered lazily, when a cursor reaches them.
    pub fn filter_with<F>(&self, parent: Option<T>, keep: Rc<F>) -> Forest<T>
    where
        F: Fn(Option<&T>, &T) -> bool + 'static,
    {
        let source = self.clone();
        Forest::deferred(move || {
            source.iter().filter_map(move |node| {
                if !keep(parent.as_ref(), &node.value) {
                    return None;
                }
                let rest = match node.rest {
                    None => None,
                    Some(rest) => {
                        let filtered = rest.filter_with(Some(node.value.clone()), Rc::clone(&keep));
                        if filtered.is_empty() {
                            return None;
                        }
                        Some(filtered)
                    }
                };
                Some(Node {
                    value: node.value,
                    rest,
                })
            })
        })
    }

    /// Drop nodes whose continuation is present but has no alternatives.
    pub fn pruned(&self) -> Forest<T> {
        self.filter_with(None, Rc::new(|_: Option<&T>, _: &T| true))
    }
}

/// Depth-first iterator over complete paths of a `Forest`.
pub struct Paths<T> {
    stack: Vec<MemoIter<Node<T>>>,
    prefix: Vec<T>,
}

impl<T: Clone + 'static> Iterator for Paths<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Vec<T>> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                    self.prefix.pop();
                }
                Some(Node { value, rest: None }) => {
                    let mut path = self.prefix.clone();
                    path.push(value);
                    return Some(path);
                }
                Some(Node {
                    value,
                    rest: Some(rest),
                }) => {
                    self.prefix.push(value);
                    self.stack.push(rest.iter());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Binary tree of depth `depth` over labels 'a'/'b', counting how many
    /// nodes were ever built.
    fn counted_tree(depth: usize, built: Rc<Cell<usize>>) -> Forest<char> {
        Forest::deferred(move || {
            ['a', 'b'].into_iter().map(move |label| {
                built.set(built.get() + 1);
                if depth == 1 {
                    Node::leaf(label)
                } else {
                    Node::branch(label, counted_tree(depth - 1, Rc::clone(&built)))
                }
            })
        })
    }

    #[test]
    fn test_memo_produces_each_value_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let memo = Memo::new((0..5).map(move |i| {
            counter.set(counter.get() + 1);
            i * 10
        }));
        let first: Vec<_> = memo.iter().take(3).collect();
        let second: Vec<_> = memo.iter().collect();
        assert_eq!(first, [0, 10, 20]);
        assert_eq!(second, [0, 10, 20, 30, 40]);
        assert_eq!(calls.get(), 5, "second cursor must replay, not recompute");
        assert_eq!(memo.get(7), None);
    }

    #[test]
    fn test_deferred_is_lazy() {
        let built = Rc::new(Cell::new(false));
        let flag = Rc::clone(&built);
        let memo = Memo::deferred(move || {
            flag.set(true);
            vec![1, 2]
        });
        assert!(!built.get(), "nothing should run before the first read");
        assert_eq!(memo.materialized(), 0);
        assert_eq!(memo.get(1), Some(2));
        assert!(built.get());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "memo re-entered")]
    fn test_reentry_is_caught() {
        let slot: Rc<RefCell<Option<Memo<u32>>>> = Rc::default();
        let inner = Rc::clone(&slot);
        let memo = Memo::deferred(move || {
            let again = inner.borrow().clone();
            again.and_then(|m| m.get(0))
        });
        *slot.borrow_mut() = Some(memo.clone());
        memo.get(0);
    }

    #[test]
    fn test_interleaved_cursors() {
        let memo = Memo::new(1..=4);
        let mut a = memo.iter();
        let mut b = memo.iter();
        assert_eq!(a.next(), Some(1));
        assert_eq!(a.next(), Some(2));
        assert_eq!(b.next(), Some(1));
        assert_eq!(a.next(), Some(3));
        assert_eq!(b.next(), Some(2));
        assert_eq!(memo.materialized(), 3);
    }

    #[test]
    fn test_paths_depth_first() {
        let built = Rc::new(Cell::new(0));
        let tree = counted_tree(2, Rc::clone(&built));
        let paths: Vec<String> = tree.paths().map(|p| p.into_iter().collect()).collect();
        assert_eq!(paths, ["aa", "ab", "ba", "bb"]);
    }

    #[test]
    fn test_first_path_builds_only_one_spine() {
        let built = Rc::new(Cell::new(0));
        let tree = counted_tree(10, Rc::clone(&built));
        let first = tree.paths().next().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(built.get(), 10, "one node per level");
        // A second traversal of the same tree reuses the memoized spine.
        tree.paths().next().unwrap();
        assert_eq!(built.get(), 10);
    }

    #[test]
    fn test_filter_prunes_dead_branches() {
        let built = Rc::new(Cell::new(0));
        let tree = counted_tree(3, built);
        // Reject 'b' directly under 'a'; under "aa" both leaves survive.
        let keep = Rc::new(|parent: Option<&char>, value: &char| !(parent == Some(&'a') && *value == 'b'));
        let filtered = tree.filter_with(None, keep);
        let paths: Vec<String> = filtered.paths().map(|p| p.into_iter().collect()).collect();
        assert_eq!(paths, ["aaa", "baa", "bba", "bbb"]);
    }

    #[test]
    fn test_filter_removes_exhausted_continuations() {
        let tree = Forest::new(vec![
            Node::branch(1, Forest::empty()),
            Node::branch(2, Forest::new(vec![Node::leaf(3)])),
        ]);
        let pruned = tree.pruned();
        assert_eq!(pruned.first().map(|n| n.value), Some(2));
        assert_eq!(pruned.paths().collect::<Vec<_>>(), [vec![2, 3]]);
    }

    #[test]
    fn test_paths_of_weight() {
        let tree = Forest::new(vec![
            Node::branch(2, Forest::new(vec![Node::leaf(1), Node::leaf(2)])),
            Node::leaf(3),
            Node::branch(1, Forest::new(vec![Node::leaf(1)])),
        ]);
        let paths: Vec<Vec<usize>> = tree.paths_of_weight(3, |v: &usize| *v).collect();
        assert_eq!(paths, [vec![2, 1], vec![3]]);
    }
}
