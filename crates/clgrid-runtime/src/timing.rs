//! Profiling store: a call tree of timed sections plus captured launch
//! events, shared by every execution context derived from one pipeline run.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;
use std::time::{Duration, Instant};

use opencl3::event::Event;

use crate::error::ExecError;

/// A named, timed region in the profiling call tree.
///
/// Sections are addressed by their index in [`TimingData::sections`];
/// `parent` points at the section that was open when this one was entered.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: &'static str,
    pub parent: Option<usize>,
    start: Instant,
    elapsed: Option<Duration>,
}

impl Section {
    /// Time between `enter` and `leave`, or `None` while still open.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }
}

/// A captured asynchronous launch event, attributed to the section that was
/// open when it was recorded.
pub struct EventRecord {
    pub name: &'static str,
    pub index: Option<usize>,
    pub section: Option<usize>,
    pub event: Option<Event>,
}

impl fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecord")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("section", &self.section)
            .field("captured", &self.event.is_some())
            .finish()
    }
}

/// Shared handle to a stored [`EventRecord`].
pub type EventHandle = Rc<RefCell<EventRecord>>;

/// Per-run instrumentation store.
///
/// One `TimingData` is shared (via `Rc<RefCell<..>>`) across every execution
/// context of a pipeline run, so nested and series-split dispatches report
/// into a single tree. Reset it between measured runs. Mutation must come
/// from one thread; the type is not `Sync`.
#[derive(Debug, Default)]
pub struct TimingData {
    /// Suppresses event capture while keeping wall-clock sections.
    pub cpu_only: bool,
    sections: Vec<Section>,
    open: Vec<usize>,
    events: Vec<EventHandle>,
}

impl TimingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh store behind the shared handle execution contexts take.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Open a section named `name` under the currently open section.
    pub fn enter(&mut self, name: &'static str) {
        let section = Section {
            name,
            parent: self.open.last().copied(),
            start: Instant::now(),
            elapsed: None,
        };
        self.sections.push(section);
        self.open.push(self.sections.len() - 1);
    }

    /// Close the most recently opened section, recording its elapsed time.
    pub fn leave(&mut self) -> Result<(), ExecError> {
        let sid = self.open.pop().ok_or(ExecError::NoOpenSection)?;
        self.sections[sid].elapsed = Some(self.sections[sid].start.elapsed());
        Ok(())
    }

    /// Record an asynchronous launch event under the currently open section
    /// and return a shared handle to the stored record.
    pub fn add_event(
        &mut self,
        name: &'static str,
        index: Option<usize>,
        event: Option<Event>,
    ) -> EventHandle {
        let record = Rc::new(RefCell::new(EventRecord {
            name,
            index,
            section: self.open.last().copied(),
            event,
        }));
        self.events.push(Rc::clone(&record));
        record
    }

    /// Drop all sections and events and empty the open-section stack.
    pub fn reset(&mut self) {
        self.sections.clear();
        self.open.clear();
        self.events.clear();
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn events(&self) -> &[EventHandle] {
        &self.events
    }

    /// Render the section tree, children indented under their parents.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (idx, section) in self.sections.iter().enumerate() {
            if section.parent.is_none() {
                self.render(idx, 0, &mut out);
            }
        }
        out
    }

    fn render(&self, idx: usize, depth: usize, out: &mut String) {
        let section = &self.sections[idx];
        let _ = match section.elapsed {
            Some(d) => writeln!(
                out,
                "{:indent$}{}: {:.3} ms",
                "",
                section.name,
                d.as_secs_f64() * 1e3,
                indent = depth * 2
            ),
            None => writeln!(out, "{:indent$}{}: open", "", section.name, indent = depth * 2),
        };
        for (child, s) in self.sections.iter().enumerate() {
            if s.parent == Some(idx) {
                self.render(child, depth + 1, out);
            }
        }
    }
}
