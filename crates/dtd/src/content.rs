//! Content-model state machines.
//!
//! A [`ContentState`] mirrors the shape of the [`ContentSpec`] it was
//! compiled from; compound states delegate to sub-states and keep a
//! cursor of their own. The parser feeds each child element name through
//! [`ContentState::allow`] as the child closes and checks
//! [`ContentState::done`] / [`ContentState::allow_empty`] when the parent
//! closes.

use crate::model::{ContentSpec, Repetition};

#[derive(Debug, Clone)]
pub enum ContentState {
    Empty,
    Any,
    Element {
        name: String,
        seen: bool,
    },
    Seq {
        slots: Vec<ContentState>,
        index: usize,
    },
    Choice {
        branches: Vec<ContentState>,
        chosen: Option<usize>,
        mixed: bool,
    },
    Repeated {
        inner: Box<ContentState>,
        rep: Repetition,
        /// Complete repetitions already consumed.
        reps_done: usize,
        /// The current repetition has consumed at least one name.
        started: bool,
    },
}

impl ContentState {
    pub fn new(spec: &ContentSpec) -> ContentState {
        match spec {
            ContentSpec::Empty => ContentState::Empty,
            ContentSpec::Any => ContentState::Any,
            ContentSpec::Element(name) => ContentState::Element {
                name: name.clone(),
                seen: false,
            },
            ContentSpec::Seq(children) => ContentState::Seq {
                slots: children.iter().map(ContentState::new).collect(),
                index: 0,
            },
            ContentSpec::Choice { options, mixed } => ContentState::Choice {
                branches: options.iter().map(ContentState::new).collect(),
                chosen: None,
                mixed: *mixed,
            },
            ContentSpec::Repeated { inner, rep } => ContentState::Repeated {
                inner: Box::new(ContentState::new(inner)),
                rep: *rep,
                reps_done: 0,
                started: false,
            },
        }
    }

    /// Feeds one child element name. Returns whether the name is
    /// permitted at this position and whether the state now sits in an
    /// accepting configuration.
    pub fn allow(&mut self, name: &str) -> (bool, bool) {
        let accepted = self.feed(name);
        (accepted, self.done())
    }

    fn feed(&mut self, name: &str) -> bool {
        match self {
            ContentState::Empty => false,
            ContentState::Any => true,
            ContentState::Element { name: expected, seen } => {
                if !*seen && expected.as_str() == name {
                    *seen = true;
                    true
                } else {
                    false
                }
            }
            ContentState::Seq { slots, index } => {
                while *index < slots.len() {
                    let slot = &mut slots[*index];
                    if slot.feed(name) {
                        return true;
                    }
                    // The slot would not take the name; step over it when
                    // its consumed input already forms a complete match.
                    if slot.done() || slot.allow_empty() {
                        *index += 1;
                        continue;
                    }
                    return false;
                }
                false
            }
            ContentState::Choice { branches, chosen, .. } => match *chosen {
                Some(i) => branches[i].feed(name),
                None => {
                    for (i, branch) in branches.iter_mut().enumerate() {
                        if branch.feed(name) {
                            *chosen = Some(i);
                            return true;
                        }
                    }
                    false
                }
            },
            ContentState::Repeated { inner, rep, reps_done, started } => {
                if inner.feed(name) {
                    *started = true;
                    return true;
                }
                // A finished repetition rolls over into a fresh one for
                // `*` and `+`; `?` is spent after a single round.
                if *started && inner.done() && *rep != Repetition::ZeroOrOne {
                    inner.reset();
                    *reps_done += 1;
                    *started = false;
                    if inner.feed(name) {
                        *started = true;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Whether the input consumed so far forms a complete match.
    pub fn done(&self) -> bool {
        match self {
            ContentState::Empty | ContentState::Any => true,
            ContentState::Element { seen, .. } => *seen,
            ContentState::Seq { slots, index } => slots[*index..]
                .iter()
                .all(|s| s.done() || s.allow_empty()),
            ContentState::Choice { branches, chosen, mixed } => match chosen {
                Some(i) => branches[*i].done(),
                None => *mixed || branches.iter().any(|b| b.allow_empty()),
            },
            ContentState::Repeated { inner, rep, reps_done, started } => match rep {
                Repetition::ZeroOrOne | Repetition::ZeroOrMore => {
                    !*started || inner.done() || inner.allow_empty()
                }
                Repetition::OneOrMore => {
                    if *started {
                        inner.done() || inner.allow_empty()
                    } else {
                        *reps_done >= 1 || inner.allow_empty()
                    }
                }
            },
        }
    }

    /// Whether the state accepts the empty sequence from its current
    /// position.
    pub fn allow_empty(&self) -> bool {
        match self {
            ContentState::Empty | ContentState::Any => true,
            ContentState::Element { seen, .. } => *seen,
            ContentState::Seq { slots, index } => slots[*index..]
                .iter()
                .all(|s| s.done() || s.allow_empty()),
            ContentState::Choice { branches, chosen, mixed } => match chosen {
                Some(i) => branches[*i].allow_empty(),
                None => *mixed || branches.iter().any(|b| b.allow_empty()),
            },
            ContentState::Repeated { inner, rep, reps_done, started } => match rep {
                Repetition::ZeroOrOne | Repetition::ZeroOrMore => {
                    !*started || inner.done() || inner.allow_empty()
                }
                Repetition::OneOrMore => {
                    if *started {
                        inner.done() || inner.allow_empty()
                    } else {
                        *reps_done >= 1 || inner.allow_empty()
                    }
                }
            },
        }
    }

    /// Whether character data is permitted at the current position.
    /// Whitespace-only text is always permitted and never reaches here.
    pub fn allow_char_data(&self) -> bool {
        match self {
            ContentState::Empty => false,
            ContentState::Any => true,
            ContentState::Element { .. } => false,
            ContentState::Seq { slots, index } => slots
                .get(*index)
                .is_some_and(|s| s.allow_char_data()),
            ContentState::Choice { branches, chosen, mixed } => {
                *mixed
                    || match chosen {
                        Some(i) => branches[*i].allow_char_data(),
                        None => branches.iter().any(|b| b.allow_char_data()),
                    }
            }
            ContentState::Repeated { inner, .. } => inner.allow_char_data(),
        }
    }

    /// EMPTY content: not even whitespace or comments are meaningful.
    pub fn must_be_empty(&self) -> bool {
        matches!(self, ContentState::Empty)
    }

    /// Returns to the initial configuration.
    pub fn reset(&mut self) {
        match self {
            ContentState::Empty | ContentState::Any => {}
            ContentState::Element { seen, .. } => *seen = false,
            ContentState::Seq { slots, index } => {
                *index = 0;
                for slot in slots {
                    slot.reset();
                }
            }
            ContentState::Choice { branches, chosen, .. } => {
                *chosen = None;
                for branch in branches {
                    branch.reset();
                }
            }
            ContentState::Repeated { inner, reps_done, started, .. } => {
                inner.reset();
                *reps_done = 0;
                *started = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(name: &str) -> ContentSpec {
        ContentSpec::Element(name.to_string())
    }

    fn rep(inner: ContentSpec, rep: Repetition) -> ContentSpec {
        ContentSpec::Repeated {
            inner: Box::new(inner),
            rep,
        }
    }

    fn feed_all(state: &mut ContentState, names: &[&str]) -> bool {
        names.iter().all(|n| state.allow(n).0)
    }

    #[test]
    fn empty_rejects_everything() {
        let mut state = ContentSpec::Empty.create_state();
        assert_eq!(state.allow("x"), (false, true));
        assert!(state.allow_empty());
        assert!(state.must_be_empty());
        assert!(!state.allow_char_data());
    }

    #[test]
    fn any_accepts_everything() {
        let mut state = ContentSpec::Any.create_state();
        assert_eq!(state.allow("x"), (true, true));
        assert_eq!(state.allow("y"), (true, true));
        assert!(state.allow_char_data());
    }

    #[test]
    fn single_element_occurs_once() {
        let mut state = elem("bar").create_state();
        assert!(!state.done());
        assert_eq!(state.allow("baz"), (false, false));
        assert_eq!(state.allow("bar"), (true, true));
        assert_eq!(state.allow("bar"), (false, true));
    }

    #[test]
    fn sequence_consumes_in_order() {
        let spec = ContentSpec::Seq(vec![elem("a"), elem("b"), elem("c")]);
        let mut state = spec.create_state();
        assert!(feed_all(&mut state, &["a", "b", "c"]));
        assert!(state.done());

        state.reset();
        assert_eq!(state.allow("b").0, false);

        state.reset();
        assert!(feed_all(&mut state, &["a"]));
        assert!(!state.done());
        assert!(!state.allow_empty());
    }

    #[test]
    fn sequence_skips_satisfied_optional_slots() {
        // (a?, b)
        let spec = ContentSpec::Seq(vec![rep(elem("a"), Repetition::ZeroOrOne), elem("b")]);
        let mut state = spec.create_state();
        assert_eq!(state.allow("b"), (true, true));

        state.reset();
        assert!(feed_all(&mut state, &["a", "b"]));
        assert!(state.done());

        state.reset();
        assert!(feed_all(&mut state, &["a"]));
        assert!(!state.done());
    }

    #[test]
    fn choice_commits_to_first_accepting_branch() {
        // (a | b)
        let spec = ContentSpec::Choice {
            options: vec![elem("a"), elem("b")],
            mixed: false,
        };
        let mut state = spec.create_state();
        assert_eq!(state.allow("b"), (true, true));
        // Committed to branch b; a second b (or an a) is rejected.
        assert_eq!(state.allow("a").0, false);

        state.reset();
        assert_eq!(state.allow("c").0, false);
    }

    #[test]
    fn zero_or_more_resets_between_repetitions() {
        // (a, b)*
        let spec = rep(
            ContentSpec::Seq(vec![elem("a"), elem("b")]),
            Repetition::ZeroOrMore,
        );
        let mut state = spec.create_state();
        assert!(state.done());
        assert!(feed_all(&mut state, &["a", "b", "a", "b"]));
        assert!(state.done());
        assert!(feed_all(&mut state, &["a"]));
        assert!(!state.done());
        assert_eq!(state.allow("a").0, false);
    }

    #[test]
    fn one_or_more_requires_one_round() {
        let spec = rep(elem("item"), Repetition::OneOrMore);
        let mut state = spec.create_state();
        assert!(!state.done());
        assert!(!state.allow_empty());
        assert_eq!(state.allow("item"), (true, true));
        assert_eq!(state.allow("item"), (true, true));
    }

    #[test]
    fn zero_or_one_is_spent_after_one_round() {
        let spec = rep(elem("x"), Repetition::ZeroOrOne);
        let mut state = spec.create_state();
        assert!(state.allow_empty());
        assert_eq!(state.allow("x"), (true, true));
        assert_eq!(state.allow("x").0, false);
    }

    #[test]
    fn mixed_choice_allows_char_data_and_listed_names() {
        // (#PCDATA | a | b)*
        let spec = rep(
            ContentSpec::Choice {
                options: vec![elem("a"), elem("b")],
                mixed: true,
            },
            Repetition::ZeroOrMore,
        );
        let mut state = spec.create_state();
        assert!(state.allow_char_data());
        assert!(feed_all(&mut state, &["a", "b", "a"]));
        assert!(state.done());
        assert_eq!(state.allow("c").0, false);
    }

    #[test]
    fn pcdata_only_content() {
        let spec = ContentSpec::pcdata();
        let mut state = spec.create_state();
        assert!(state.allow_char_data());
        assert!(state.done());
        assert_eq!(state.allow("a").0, false);
    }

    #[test]
    fn nested_model_spec_front_body_back() {
        // (front, (p | list)*, back?)
        let spec = ContentSpec::Seq(vec![
            elem("front"),
            rep(
                ContentSpec::Choice {
                    options: vec![elem("p"), elem("list")],
                    mixed: false,
                },
                Repetition::ZeroOrMore,
            ),
            rep(elem("back"), Repetition::ZeroOrOne),
        ]);

        let mut state = spec.create_state();
        assert!(feed_all(&mut state, &["front", "p", "list", "p", "back"]));
        assert!(state.done());

        state.reset();
        assert!(feed_all(&mut state, &["front"]));
        assert!(state.done());

        state.reset();
        assert_eq!(state.allow("p").0, false);
    }

    #[test]
    fn determinism_same_input_same_outcome() {
        let spec = ContentSpec::Seq(vec![
            rep(elem("a"), Repetition::ZeroOrMore),
            elem("b"),
        ]);
        let input = ["a", "a", "b"];
        let run = |spec: &ContentSpec| {
            let mut state = spec.create_state();
            let outcomes: Vec<(bool, bool)> = input.iter().map(|n| state.allow(n)).collect();
            (outcomes, state.done())
        };
        assert_eq!(run(&spec), run(&spec));
    }

    #[test]
    fn element_content_rejects_char_data() {
        let spec = ContentSpec::Seq(vec![elem("a")]);
        let state = spec.create_state();
        assert!(!state.allow_char_data());
    }
}
