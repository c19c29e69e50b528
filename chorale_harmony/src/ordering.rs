// Result ordering over a voicing forest.
//
// - Greedy: the forest as the search produced it.
// - GlobalBest: at every level, siblings sorted best first by their lazy
//   preference score against the parent chord. A level is sorted when a
//   cursor first reaches it; untaken levels are never scored.
// - DepthBest: as GlobalBest, with equal scores broken by peeking one level
//   down. A node that completes the chorale beats one that does not; two
//   continuing nodes compare by their best child's score.
//
// Sorting is stable, so equally scored siblings keep search order.

use crate::chord::CompleteChord;
use crate::lazy::{Forest, Node};
use crate::params::YieldOrdering;
use crate::preferences::{LazyScore, PreferenceBook};
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::rc::Rc;

pub fn order(forest: Forest<CompleteChord>, ordering: YieldOrdering, book: Rc<PreferenceBook>) -> Forest<CompleteChord> {
    match ordering {
        YieldOrdering::Greedy => forest,
        YieldOrdering::GlobalBest => best_first(forest, None, book, false),
        YieldOrdering::DepthBest => best_first(forest, None, book, true),
    }
}

struct Ranked {
    node: Node<CompleteChord>,
    score: LazyScore,
    best_child: OnceCell<Option<LazyScore>>,
}

impl Ranked {
    fn best_child(&self, book: &Rc<PreferenceBook>) -> Option<&LazyScore> {
        self.best_child
            .get_or_init(|| {
                let rest = self.node.rest.as_ref()?;
                rest.iter()
                    .map(|child| book.score(&child.value, Some(&self.node.value)))
                    .max_by(|a, b| a.compare(b))
            })
            .as_ref()
    }

    fn tie_break(&self, other: &Ranked, book: &Rc<PreferenceBook>) -> Ordering {
        match (self.node.rest.is_none(), other.node.rest.is_none()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match (self.best_child(book), other.best_child(book)) {
                (Some(a), Some(b)) => a.compare(b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

fn best_first(
    forest: Forest<CompleteChord>,
    parent: Option<CompleteChord>,
    book: Rc<PreferenceBook>,
    peek: bool,
) -> Forest<CompleteChord> {
    Forest::deferred(move || {
        let mut ranked: Vec<Ranked> = forest
            .iter()
            .map(|node| Ranked {
                score: book.score(&node.value, parent.as_ref()),
                node,
                best_child: OnceCell::new(),
            })
            .collect();
        ranked.sort_by(|a, b| {
            let by_score = b.score.compare(&a.score);
            if peek && by_score == Ordering::Equal {
                b.tie_break(a, &book)
            } else {
                by_score
            }
        });
        ranked.into_iter().map(move |entry| {
            let Node { value, rest } = entry.node;
            let rest = rest.map(|rest| best_first(rest, Some(value.clone()), Rc::clone(&book), peek));
            Node { value, rest }
        })
    })
}
