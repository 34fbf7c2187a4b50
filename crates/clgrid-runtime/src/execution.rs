//! Per-dispatch execution contexts and the series-splitting protocol.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::error;
use opencl3::event::Event;

use crate::context::Queue;
use crate::error::ExecError;
use crate::timing::TimingData;

/// Slot a single completion event is captured into.
pub type EventSlot = Rc<RefCell<Option<Event>>>;

/// List completion events are accumulated into across a launch series.
pub type EventList = Rc<RefCell<Vec<Event>>>;

/// The timing store shared across one pipeline run.
pub type SharedTiming = Rc<RefCell<TimingData>>;

/// The bundle handed to each kernel dispatch: a queue reference, optional
/// event bindings, and an optional profiling handle.
///
/// An `ExecutionContext` is a cheap value type built per call site. It never
/// owns the queue; a context with no queue at all is *detached* and
/// represents CPU-only execution. The event bindings are shared slots so
/// that several contexts derived from one logical operation can feed the
/// same observer.
#[derive(Clone, Default)]
pub struct ExecutionContext<'q> {
    queue: Option<&'q Queue>,
    event: Option<EventSlot>,
    events: Option<EventList>,
    timing: Option<SharedTiming>,
}

impl<'q> ExecutionContext<'q> {
    /// A context with no queue: CPU-only execution.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A context dispatching into `queue`, with no event bindings.
    pub fn new(queue: &'q Queue) -> Self {
        Self { queue: Some(queue), ..Self::default() }
    }

    /// Bind the slot the overall operation's completion event lands in.
    pub fn capture_into(mut self, slot: EventSlot) -> Self {
        self.event = Some(slot);
        self
    }

    /// Bind the list completion events are accumulated into.
    pub fn accumulate_into(mut self, list: EventList) -> Self {
        self.events = Some(list);
        self
    }

    /// Attach the shared timing store.
    pub fn with_timing(mut self, timing: SharedTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn is_detached(&self) -> bool {
        self.queue.is_none()
    }

    /// The bound queue; calling this on a detached context is a programming
    /// error and fails loudly.
    pub fn queue(&self) -> Result<&'q Queue, ExecError> {
        self.queue.ok_or(ExecError::DetachedContext)
    }

    pub fn capture_slot(&self) -> Option<&EventSlot> {
        self.event.as_ref()
    }

    pub fn event_list(&self) -> Option<&EventList> {
        self.events.as_ref()
    }

    pub fn timing(&self) -> Option<&SharedTiming> {
        self.timing.as_ref()
    }

    pub fn timing_enabled(&self) -> bool {
        self.timing.is_some()
    }

    pub fn enable_timing(&mut self, timing: SharedTiming) {
        self.timing = Some(timing);
    }

    /// Derive the context for sub-launch `id` of a series of `total` chained
    /// launches realizing one logical operation.
    ///
    /// With `total <= 1` the context is returned unchanged. Otherwise the
    /// first sub-launch forwards only the accumulation list (so "wait for
    /// all launches" observers see it), the last binds only the capture slot
    /// (so "the operation's event" is the final launch's event), and middle
    /// launches bind neither. All launches must go to the same in-order
    /// queue: submission order is the only thing ordering them. A detached
    /// parent derives detached children; the timing store is always
    /// inherited.
    pub fn generate_series_context(&self, id: usize, total: usize) -> ExecutionContext<'q> {
        if total <= 1 {
            return self.clone();
        }
        let mut derived = match self.queue {
            None => Self::detached(),
            Some(queue) if id == 0 => {
                let mut ctx = Self::new(queue);
                ctx.events = self.events.clone();
                ctx
            }
            Some(queue) if id + 1 >= total => {
                let mut ctx = Self::new(queue);
                ctx.event = self.event.clone();
                ctx
            }
            Some(queue) => Self::new(queue),
        };
        derived.timing = self.timing.clone();
        derived
    }

    /// Open a timing section (no-op without a timing store).
    pub fn enter(&self, name: &'static str) {
        if let Some(timing) = &self.timing {
            timing.borrow_mut().enter(name);
        }
    }

    /// Close the innermost timing section (no-op without a timing store).
    pub fn leave(&self) -> Result<(), ExecError> {
        match &self.timing {
            Some(timing) => timing.borrow_mut().leave(),
            None => Ok(()),
        }
    }

    /// Hand back the completion event an enqueue returned.
    ///
    /// When profiling is active (and the store is not `cpu_only`) the event
    /// is kept in the timing store; otherwise it goes to the capture slot if
    /// one is bound, else it is appended to the accumulation list if one is
    /// bound, else it is dropped.
    pub fn record_event(&self, name: &'static str, index: Option<usize>, event: Event) {
        if let Some(timing) = &self.timing {
            let mut timing = timing.borrow_mut();
            if !timing.cpu_only {
                timing.add_event(name, index, Some(event));
                return;
            }
        }
        if let Some(slot) = &self.event {
            *slot.borrow_mut() = Some(event);
        } else if let Some(list) = &self.events {
            list.borrow_mut().push(event);
        }
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("detached", &self.is_detached())
            .field("capture", &self.event.is_some())
            .field("accumulate", &self.events.is_some())
            .field("timing", &self.timing.is_some())
            .finish()
    }
}

/// Scope guard that keeps timing sections balanced: opens a named section on
/// construction and closes it when dropped, including on early return or
/// unwind.
#[must_use = "the timing section closes when the guard is dropped"]
pub struct ExecGuard<'g, 'q> {
    ctx: &'g ExecutionContext<'q>,
}

impl<'g, 'q> ExecGuard<'g, 'q> {
    pub fn new(ctx: &'g ExecutionContext<'q>, name: &'static str) -> Self {
        ctx.enter(name);
        Self { ctx }
    }
}

impl Drop for ExecGuard<'_, '_> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.leave() {
            // Drop must not panic mid-unwind; report instead.
            error!("timing section unbalanced at scope exit: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> EventSlot {
        Rc::new(RefCell::new(None))
    }

    fn list() -> EventList {
        Rc::new(RefCell::new(Vec::new()))
    }

    // ----- construction & preconditions -----------------------------------

    #[test]
    fn detached_context_has_no_queue() {
        let ctx = ExecutionContext::detached();
        assert!(ctx.is_detached());
        assert_eq!(ctx.queue().unwrap_err(), ExecError::DetachedContext);
    }

    #[test]
    fn bound_context_exposes_queue() {
        let queue = Queue::noop();
        let ctx = ExecutionContext::new(&queue);
        assert!(!ctx.is_detached());
        assert!(ctx.queue().is_ok());
    }

    #[test]
    fn builder_binds_slots() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let ctx = ExecutionContext::new(&queue)
            .capture_into(Rc::clone(&capture))
            .accumulate_into(Rc::clone(&acc));
        assert!(Rc::ptr_eq(ctx.capture_slot().unwrap(), &capture));
        assert!(Rc::ptr_eq(ctx.event_list().unwrap(), &acc));
    }

    // ----- series splitting -----------------------------------------------

    fn full_context<'q>(
        queue: &'q Queue,
        capture: &EventSlot,
        acc: &EventList,
    ) -> ExecutionContext<'q> {
        ExecutionContext::new(queue)
            .capture_into(Rc::clone(capture))
            .accumulate_into(Rc::clone(acc))
            .with_timing(TimingData::shared())
    }

    #[test]
    fn single_launch_series_returns_self_unchanged() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let ctx = full_context(&queue, &capture, &acc);

        let derived = ctx.generate_series_context(0, 1);
        assert!(Rc::ptr_eq(derived.capture_slot().unwrap(), &capture));
        assert!(Rc::ptr_eq(derived.event_list().unwrap(), &acc));
        assert!(derived.queue().is_ok());

        let zero_total = ctx.generate_series_context(0, 0);
        assert!(zero_total.capture_slot().is_some());
    }

    #[test]
    fn first_of_series_forwards_accumulation_only() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let first = full_context(&queue, &capture, &acc).generate_series_context(0, 3);

        assert!(first.capture_slot().is_none());
        assert!(Rc::ptr_eq(first.event_list().unwrap(), &acc));
        assert!(first.queue().is_ok());
    }

    #[test]
    fn middle_of_series_binds_neither() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let middle = full_context(&queue, &capture, &acc).generate_series_context(1, 3);

        assert!(middle.capture_slot().is_none());
        assert!(middle.event_list().is_none());
        assert!(middle.queue().is_ok());
    }

    #[test]
    fn last_of_series_binds_capture_only() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let last = full_context(&queue, &capture, &acc).generate_series_context(2, 3);

        assert!(Rc::ptr_eq(last.capture_slot().unwrap(), &capture));
        assert!(last.event_list().is_none());
        assert!(last.queue().is_ok());
    }

    #[test]
    fn two_launch_series_has_no_middle() {
        let queue = Queue::noop();
        let (capture, acc) = (slot(), list());
        let ctx = full_context(&queue, &capture, &acc);

        let first = ctx.generate_series_context(0, 2);
        assert!(first.event_list().is_some());
        assert!(first.capture_slot().is_none());

        let last = ctx.generate_series_context(1, 2);
        assert!(last.capture_slot().is_some());
        assert!(last.event_list().is_none());
    }

    #[test]
    fn detached_parent_derives_detached_children() {
        let ctx = ExecutionContext::detached()
            .capture_into(slot())
            .accumulate_into(list())
            .with_timing(TimingData::shared());

        for id in 0..3 {
            let derived = ctx.generate_series_context(id, 3);
            assert!(derived.is_detached());
            assert!(derived.capture_slot().is_none());
            assert!(derived.event_list().is_none());
            // CPU-only semantics still profile.
            assert!(derived.timing_enabled());
        }
    }

    #[test]
    fn series_children_inherit_the_timing_store() {
        let queue = Queue::noop();
        let timing = TimingData::shared();
        let ctx = ExecutionContext::new(&queue).with_timing(Rc::clone(&timing));

        for id in 0..3 {
            let derived = ctx.generate_series_context(id, 3);
            assert!(Rc::ptr_eq(derived.timing().unwrap(), &timing));
        }
    }

    // ----- timing forwarding ----------------------------------------------

    #[test]
    fn enter_leave_forward_to_the_shared_store() {
        let timing = TimingData::shared();
        let ctx = ExecutionContext::detached().with_timing(Rc::clone(&timing));

        ctx.enter("op");
        ctx.leave().unwrap();
        assert_eq!(timing.borrow().sections().len(), 1);
        assert_eq!(timing.borrow().sections()[0].name, "op");
    }

    #[test]
    fn enter_leave_are_noops_without_timing() {
        let ctx = ExecutionContext::detached();
        ctx.enter("ignored");
        assert!(ctx.leave().is_ok());
    }

    #[test]
    fn leave_unbalanced_fails_loudly() {
        let ctx = ExecutionContext::detached().with_timing(TimingData::shared());
        assert_eq!(ctx.leave().unwrap_err(), ExecError::NoOpenSection);
    }

    // ----- ExecGuard ------------------------------------------------------

    #[test]
    fn guard_balances_sections_on_scope_exit() {
        let timing = TimingData::shared();
        let ctx = ExecutionContext::detached().with_timing(Rc::clone(&timing));

        {
            let _guard = ExecGuard::new(&ctx, "scoped");
            assert_eq!(timing.borrow().sections()[0].elapsed(), None);
        }
        assert!(timing.borrow().sections()[0].elapsed().is_some());
    }

    #[test]
    fn guards_nest_like_sections() {
        let timing = TimingData::shared();
        let ctx = ExecutionContext::detached().with_timing(Rc::clone(&timing));

        {
            let _outer = ExecGuard::new(&ctx, "outer");
            let _inner = ExecGuard::new(&ctx, "inner");
        }
        let store = timing.borrow();
        assert_eq!(store.sections()[1].parent, Some(0));
        assert!(store.sections().iter().all(|s| s.elapsed().is_some()));
    }

    #[test]
    fn guard_closes_section_on_early_return() {
        let timing = TimingData::shared();
        let ctx = ExecutionContext::detached().with_timing(Rc::clone(&timing));

        fn bail(ctx: &ExecutionContext<'_>) -> Result<(), ExecError> {
            let _guard = ExecGuard::new(ctx, "bails");
            Err(ExecError::DetachedContext)
        }
        let _ = bail(&ctx);
        assert!(timing.borrow().sections()[0].elapsed().is_some());
    }
}
