#![no_std]
#![forbid(unsafe_code)]

//! # Quill HSM
//!
//! Hierarchical state machine engine: event dispatch with run-to-completion
//! semantics, full transition execution (exit path, least-common-ancestor
//! resolution, entry path, chained initial transitions), and shallow history
//! for composite states.
//!
//! States are plain functions over the application context. A handler
//! receives the context and an event reference, and reports what it did with
//! a [`QState`] outcome. Nesting is expressed by returning
//! [`QState::Super`] with the parent handler for any signal the state does
//! not consume, which also lets the engine discover the hierarchy at
//! dispatch time without any transition tables.

use heapless::LinearMap;

use quill_core::{q_assert, q_error, QSignal};

pub use quill_core::QEvt;

/// Deepest state nesting the engine supports. Exceeding it is fatal.
pub const MAX_NEST_DEPTH: usize = 6;

/// Composite states that can retain shallow history per machine.
pub const MAX_HISTORY: usize = 4;

/// A state handler: the behavior of one state of the machine `SM`.
pub type QStateHandler<SM> = fn(&mut SM, &QEvt) -> QState<SM>;

/// Outcome of handing an event to a state.
pub enum QState<SM> {
    /// Event consumed, no state change.
    Handled,
    /// Event not relevant anywhere in the hierarchy; silently dropped.
    Ignored,
    /// Regular state transition to the given target.
    Tran(QStateHandler<SM>),
    /// Event not consumed here; the parent state should see it.
    Super(QStateHandler<SM>),
    /// Entry action performed.
    EntryDone,
    /// Exit action performed.
    ExitDone,
    /// Initial transition into the given substate.
    InitDone(QStateHandler<SM>),
}

impl<SM> Clone for QState<SM> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<SM> Copy for QState<SM> {}

#[cfg(feature = "defmt")]
impl<SM> defmt::Format for QState<SM> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            QState::Handled => defmt::write!(fmt, "Handled"),
            QState::Ignored => defmt::write!(fmt, "Ignored"),
            QState::Tran(_) => defmt::write!(fmt, "Tran"),
            QState::Super(_) => defmt::write!(fmt, "Super"),
            QState::EntryDone => defmt::write!(fmt, "EntryDone"),
            QState::ExitDone => defmt::write!(fmt, "ExitDone"),
            QState::InitDone(_) => defmt::write!(fmt, "InitDone"),
        }
    }
}

/// Consume the event without changing state.
pub const fn handled<SM>() -> QState<SM> {
    QState::Handled
}

/// Let the event fall through the top of the hierarchy.
pub const fn ignored<SM>() -> QState<SM> {
    QState::Ignored
}

/// Transition to `target`.
pub const fn tran<SM>(target: QStateHandler<SM>) -> QState<SM> {
    QState::Tran(target)
}

/// Defer to the parent state `parent`.
pub const fn super_state<SM>(parent: QStateHandler<SM>) -> QState<SM> {
    QState::Super(parent)
}

/// Take the initial transition into `target` (valid for INIT only).
pub const fn init_tran<SM>(target: QStateHandler<SM>) -> QState<SM> {
    QState::InitDone(target)
}

/// The hierarchy sentinel. Every state chain terminates here; the top state
/// ignores all events and is its own parent.
pub fn top<SM>(_sm: &mut SM, _e: &QEvt) -> QState<SM> {
    QState::Ignored
}

const EVT_EMPTY: QEvt = QEvt::immutable(QSignal::EMPTY);
const EVT_ENTRY: QEvt = QEvt::immutable(QSignal::ENTRY);
const EVT_EXIT: QEvt = QEvt::immutable(QSignal::EXIT);
const EVT_INIT: QEvt = QEvt::immutable(QSignal::INIT);

#[inline]
fn same<SM>(a: QStateHandler<SM>, b: QStateHandler<SM>) -> bool {
    // Function pointer identity; states are compared structurally nowhere.
    a as usize == b as usize
}

/// Hierarchical state machine instance wrapping the application context `SM`.
pub struct QHsm<SM> {
    sm: SM,
    /// Current stable state; valid between RTC steps.
    state: QStateHandler<SM>,
    /// Scratch state used during hierarchy walks and transitions.
    temp: QStateHandler<SM>,
    /// Shallow history: composite handler -> last active direct substate.
    history: LinearMap<usize, Option<QStateHandler<SM>>, MAX_HISTORY>,
}

impl<SM> QHsm<SM> {
    /// Creates the machine in its pseudo-initial configuration.
    ///
    /// `initial` is the initial pseudostate handler; when the machine is
    /// started with [`QHsm::init`] it must return [`QState::Tran`] naming
    /// the first real state.
    pub const fn new(sm: SM, initial: QStateHandler<SM>) -> Self {
        Self {
            sm,
            state: top::<SM>,
            temp: initial,
            history: LinearMap::new(),
        }
    }

    pub fn sm(&self) -> &SM {
        &self.sm
    }

    pub fn sm_mut(&mut self) -> &mut SM {
        &mut self.sm
    }

    /// Current stable state handler.
    pub fn state(&self) -> QStateHandler<SM> {
        self.state
    }

    /// Registers `state` as a composite that retains shallow history.
    ///
    /// Whenever the composite is exited, the engine records which direct
    /// substate was active; a later transition targeting the composite
    /// resumes there instead of taking the initial transition from scratch.
    pub fn retain_history(&mut self, state: QStateHandler<SM>) {
        let r = self.history.insert(state as usize, None);
        q_assert!(r.is_ok());
    }

    /// Executes the topmost initial transition. Must be called exactly once
    /// before the first [`QHsm::dispatch`].
    pub fn init(&mut self) {
        q_assert!(same(self.state, top::<SM>));
        let r = (self.temp)(&mut self.sm, &EVT_INIT);
        let t0 = match r {
            QState::Tran(t) | QState::InitDone(t) => t,
            _ => q_error!(),
        };
        self.enter_from(top::<SM>, t0);
        self.state = self.drain_inits(t0);
        self.temp = self.state;
    }

    /// Dispatches one event run-to-completion.
    ///
    /// The event is offered to the current state and bubbled up through
    /// `Super` returns until some state consumes it. A `Tran` outcome runs
    /// the full exit/LCA/entry/init sequence before this returns.
    pub fn dispatch(&mut self, e: &QEvt) {
        q_assert!(same(self.state, self.temp));

        let mut s = self.state;
        let mut r;
        let mut depth = 0;
        loop {
            q_assert!(depth < MAX_NEST_DEPTH);
            depth += 1;
            r = s(&mut self.sm, e);
            match r {
                QState::Super(parent) => s = parent,
                _ => break,
            }
        }

        if let QState::Tran(target) = r {
            // Peel the active chain off up to (not including) the state
            // that took the transition.
            let mut a = self.state;
            while !same(a, s) {
                a = self.exit_state(a);
            }
            self.tran(s, target);
        } else {
            self.temp = self.state;
        }
    }

    /// True when `state` is the current state or one of its ancestors.
    pub fn is_in(&mut self, state: QStateHandler<SM>) -> bool {
        let mut s = self.state;
        loop {
            if same(s, state) {
                return true;
            }
            if same(s, top::<SM>) {
                return false;
            }
            s = self.parent_of(s);
        }
    }

    /// Executes a transition from the handling state `s` to `t`. On entry
    /// the active state is `s` (deeper substates are already exited).
    fn tran(&mut self, s: QStateHandler<SM>, t: QStateHandler<SM>) {
        if same(s, t) {
            // Self-transition: leave and re-enter the same state.
            self.exit_state(s);
            self.enter_state(t);
        } else {
            // Target ancestor chain, target first, top excluded.
            let mut tpath: [QStateHandler<SM>; MAX_NEST_DEPTH] = [t; MAX_NEST_DEPTH];
            let mut tdepth = 1;
            let mut p = self.parent_of(t);
            while !same(p, top::<SM>) {
                q_assert!(tdepth < MAX_NEST_DEPTH);
                tpath[tdepth] = p;
                tdepth += 1;
                p = self.parent_of(p);
            }

            // Climb from the source, exiting as we go, until we stand on a
            // member of the target chain; that member is the LCA. Reaching
            // the top means the chains only join there.
            let mut src = s;
            let mut lca = tdepth;
            'climb: while !same(src, top::<SM>) {
                for (i, tp) in tpath.iter().enumerate().take(tdepth) {
                    if same(*tp, src) {
                        lca = i;
                        break 'climb;
                    }
                }
                src = self.exit_state(src);
            }

            for i in (0..lca).rev() {
                self.enter_state(tpath[i]);
            }
        }

        // Shallow history: a composite entered as the final target resumes
        // at its recorded direct substate, chaining through nested history.
        let mut leaf = t;
        let mut guard = 0;
        while let Some(child) = self.recorded_child(leaf) {
            q_assert!(guard < MAX_NEST_DEPTH);
            guard += 1;
            self.enter_state(child);
            leaf = child;
        }

        self.state = self.drain_inits(leaf);
        self.temp = self.state;
    }

    /// Follows chained initial transitions from `t` downward, entering each
    /// targeted substate, and returns the final leaf.
    fn drain_inits(&mut self, mut t: QStateHandler<SM>) -> QStateHandler<SM> {
        let mut guard = 0;
        loop {
            q_assert!(guard < MAX_NEST_DEPTH);
            guard += 1;

            let sub = match t(&mut self.sm, &EVT_INIT) {
                QState::Tran(sub) | QState::InitDone(sub) => sub,
                QState::Super(_) | QState::Handled | QState::Ignored => break,
                // Entry/exit confirmations make no sense as INIT outcomes.
                QState::EntryDone | QState::ExitDone => q_error!(),
            };
            self.enter_from(t, sub);
            t = sub;
        }
        t
    }

    /// Enters the chain of states strictly below `from` down to and
    /// including `to`. Fatal if `to` is not nested in `from`.
    fn enter_from(&mut self, from: QStateHandler<SM>, to: QStateHandler<SM>) {
        let mut path: [QStateHandler<SM>; MAX_NEST_DEPTH] = [to; MAX_NEST_DEPTH];
        let mut depth = 1;
        let mut p = self.parent_of(to);
        while !same(p, from) {
            q_assert!(!same(p, top::<SM>) || same(from, top::<SM>));
            q_assert!(depth < MAX_NEST_DEPTH);
            path[depth] = p;
            depth += 1;
            p = self.parent_of(p);
        }
        for i in (0..depth).rev() {
            self.enter_state(path[i]);
        }
    }

    /// Discovers the parent of `s` with the hierarchy probe.
    fn parent_of(&mut self, s: QStateHandler<SM>) -> QStateHandler<SM> {
        match s(&mut self.sm, &EVT_EMPTY) {
            QState::Super(p) => p,
            // Only the top sentinel has no parent.
            _ => top::<SM>,
        }
    }

    fn enter_state(&mut self, s: QStateHandler<SM>) {
        match s(&mut self.sm, &EVT_ENTRY) {
            // A transition fired from an entry action is fatal.
            QState::Tran(_) => q_error!(),
            _ => {}
        }
    }

    /// Exits `s`, records shallow history on its parent, returns the parent.
    fn exit_state(&mut self, s: QStateHandler<SM>) -> QStateHandler<SM> {
        match s(&mut self.sm, &EVT_EXIT) {
            QState::Tran(_) => q_error!(),
            _ => {}
        }
        let parent = self.parent_of(s);
        if let Some(slot) = self.history.get_mut(&(parent as usize)) {
            *slot = Some(s);
        }
        parent
    }

    /// Recorded history substate of `s`, if `s` retains history and has one.
    fn recorded_child(&self, s: QStateHandler<SM>) -> Option<QStateHandler<SM>> {
        self.history.get(&(s as usize)).copied().flatten()
    }
}

#[cfg(test)]
mod tests;
