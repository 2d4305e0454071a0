use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::scheduler::action::ActionKey;
use crate::domain::scheduler::gap::{Gap, UNBOUNDED};
use crate::domain::scheduler::optimization::scheduling_event::{EventKind, SchedulingEvent};

/// What the simulation knows about one action of the worker.
#[derive(Debug, Clone)]
pub struct SimAction {
    pub key: ActionKey,
    pub id: u64,
    pub priority: i64,
    pub requirements: ResourceDescription,
    pub duration: i64,

    /// Earliest instant the data it reads is expected to exist.
    pub ready_at: i64,

    /// Data predecessors simulated on this worker that have not ended yet.
    pub pending_predecessors: u32,

    /// Data successors simulated on this worker.
    pub successors: Vec<ActionKey>,
}

/// Discrete-event replay of one worker's near future.
#[derive(Debug)]
pub struct LocalOptimizationState {
    pub time: i64,
    gaps: Vec<Gap>,
    actions: HashMap<ActionKey, SimAction>,

    /// Ready actions, best first: higher priority, then older.
    selectable: BTreeSet<(Reverse<i64>, u64, ActionKey)>,

    /// Released actions waiting for external data, earliest first.
    ready: BTreeSet<(i64, u64, ActionKey)>,

    events: BinaryHeap<Reverse<SchedulingEvent>>,

    /// A start event is queued; nothing else is dispatched until it is processed.
    pending_start: bool,

    placements: HashMap<ActionKey, (i64, i64)>,
    resource_predecessors: HashMap<ActionKey, Vec<ActionKey>>,

    /// Actions that can never fit the worker.
    dropped: Vec<ActionKey>,
}

impl LocalOptimizationState {
    pub fn new(now: i64, capacity: ResourceDescription) -> Self {
        LocalOptimizationState {
            time: now,
            gaps: vec![Gap::new(now, UNBOUNDED, None, capacity)],
            actions: HashMap::new(),
            selectable: BTreeSet::new(),
            ready: BTreeSet::new(),
            events: BinaryHeap::new(),
            pending_start: false,
            placements: HashMap::new(),
            resource_predecessors: HashMap::new(),
            dropped: Vec::new(),
        }
    }

    /// Seeds an action that already holds its reservation.
    pub fn add_running(&mut self, action: SimAction, started_at: i64, end: i64) {
        self.consume_open_gaps(&action.requirements, self.time);
        self.events.push(Reverse(SchedulingEvent::end(end, action.id, action.key)));
        self.placements.insert(action.key, (started_at, end));
        self.actions.insert(action.key, action);
    }

    pub fn add_planned(&mut self, action: SimAction) {
        self.actions.insert(action.key, action);
    }

    /// Makes every planned action without pending predecessors a candidate.
    pub fn release_roots(&mut self) {
        let roots: Vec<ActionKey> = self
            .actions
            .values()
            .filter(|a| a.pending_predecessors == 0 && !self.placements.contains_key(&a.key))
            .map(|a| a.key)
            .collect();
        for key in roots {
            self.promote(key);
        }
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn pop_event(&mut self) -> Option<SchedulingEvent> {
        self.events.pop().map(|Reverse(e)| e)
    }

    pub fn push_event(&mut self, event: SchedulingEvent) {
        self.events.push(Reverse(event));
    }

    /// Moves the waiting actions whose data is expected by `instant` to the selectable set.
    pub fn promote_ready(&mut self, instant: i64) {
        while let Some(&(ready_at, id, key)) = self.ready.first() {
            if ready_at > instant {
                break;
            }
            self.ready.remove(&(ready_at, id, key));
            if let Some(action) = self.actions.get(&key) {
                self.selectable.insert((Reverse(action.priority), action.id, key));
            }
        }
    }

    /// Queues a start for the best selectable action if the worker can host it at `instant`.
    ///
    /// Only the head is considered. Lower ranked actions wait behind it and get their chance in
    /// the capacity left before its start.
    pub fn dispatch(&mut self, instant: i64) {
        if self.pending_start {
            return;
        }
        let Some(&(priority, id, key)) = self.selectable.first() else {
            return;
        };
        let Some(requirements) = self.actions.get(&key).map(|a| a.requirements) else {
            return;
        };

        let mut open = ResourceDescription::default();
        for gap in self.gaps.iter().filter(|g| g.is_unbounded() && g.start <= instant) {
            open.increase(&gap.resources);
        }
        if open.can_host(&requirements) {
            self.selectable.remove(&(priority, id, key));
            self.events.push(Reverse(SchedulingEvent::start(instant, id, key)));
            self.pending_start = true;
        }
    }

    /// Reserves the capacity of `key` from `instant` on and backfills what is left before it.
    pub fn start(&mut self, key: ActionKey, instant: i64) {
        self.pending_start = false;
        let Some(action) = self.actions.get(&key).cloned() else {
            return;
        };

        let mut predecessors = Vec::new();
        let mut before = Vec::new();
        for (gap_start, origin, taken) in self.consume_open_gaps(&action.requirements, instant) {
            if let Some(origin) = origin {
                predecessors.push(origin);
            }
            if gap_start < instant {
                before.push(Gap::new(gap_start, instant, origin, taken));
            }
        }
        for gap in before {
            predecessors.extend(self.fill_gap(gap));
        }

        let end = instant.saturating_add(action.duration);
        self.placements.insert(key, (instant, end));
        self.resource_predecessors.insert(key, predecessors);
        self.events.push(Reverse(SchedulingEvent::end(end, action.id, key)));
    }

    /// The capacity of `key` opens up again and its local successors may become ready.
    pub fn end(&mut self, key: ActionKey, instant: i64) {
        if let Some(requirements) = self.actions.get(&key).map(|a| a.requirements) {
            self.gaps.push(Gap::new(instant, UNBOUNDED, Some(key), requirements));
        }
        self.release_successors(key, instant);
    }

    /// Gets the simulation moving again once no event is left.
    ///
    /// # Returns
    /// `false` if nothing is left to simulate.
    pub fn force_progress(&mut self) -> bool {
        loop {
            if self.has_events() {
                return true;
            }
            if let Some(&(priority, id, key)) = self.selectable.first() {
                // Every gap is open by now, so the head can never fit.
                log::warn!("Action {} does not fit its worker in any future, leaving it unplaced", id);
                self.selectable.remove(&(priority, id, key));
                self.dropped.push(key);
                self.dispatch(self.time);
                continue;
            }
            let Some(&(ready_at, _, _)) = self.ready.first() else {
                return false;
            };
            self.time = self.time.max(ready_at);
            self.promote_ready(self.time);
            self.dispatch(self.time);
        }
    }

    /// Closes the pass at the horizon: pending ends still free their capacity, pending starts do
    /// not happen.
    pub fn flush(&mut self) {
        while let Some(event) = self.pop_event() {
            match event.kind {
                EventKind::End => {
                    if let Some(requirements) = self.actions.get(&event.action).map(|a| a.requirements) {
                        self.gaps.push(Gap::new(event.time, UNBOUNDED, Some(event.action), requirements));
                    }
                }
                EventKind::Start => self.pending_start = false,
            }
        }
    }

    pub fn placement(&self, key: ActionKey) -> Option<(i64, i64)> {
        self.placements.get(&key).copied()
    }

    /// Consumes the state into `(placements, resource predecessors, unplaced, gaps)`.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(self) -> (HashMap<ActionKey, (i64, i64)>, HashMap<ActionKey, Vec<ActionKey>>, Vec<ActionKey>, Vec<Gap>) {
        let mut unplaced: Vec<(u64, ActionKey)> =
            self.actions.values().filter(|a| !self.placements.contains_key(&a.key)).map(|a| (a.id, a.key)).collect();
        unplaced.sort();

        let gaps = self.gaps.into_iter().filter(|g| !g.is_empty()).collect();
        (self.placements, self.resource_predecessors, unplaced.into_iter().map(|(_, k)| k).collect(), gaps)
    }

    pub fn dropped(&self) -> &[ActionKey] {
        &self.dropped
    }

    fn promote(&mut self, key: ActionKey) {
        let Some(action) = self.actions.get(&key) else {
            return;
        };
        if action.ready_at <= self.time {
            self.selectable.insert((Reverse(action.priority), action.id, key));
        } else {
            self.ready.insert((action.ready_at, action.id, key));
        }
    }

    fn release_successors(&mut self, key: ActionKey, instant: i64) {
        let successors = self.actions.get(&key).map(|a| a.successors.clone()).unwrap_or_default();
        for successor in successors {
            let Some(action) = self.actions.get_mut(&successor) else {
                continue;
            };
            action.pending_predecessors = action.pending_predecessors.saturating_sub(1);
            action.ready_at = action.ready_at.max(instant);
            if action.pending_predecessors == 0 {
                self.promote(successor);
            }
        }
    }

    /// Takes `requirements` out of the open-ended gaps already open at `instant`, most recently
    /// opened first.
    ///
    /// # Returns
    /// `(gap start, gap origin, amount taken)` per consumed gap.
    fn consume_open_gaps(&mut self, requirements: &ResourceDescription, instant: i64) -> Vec<(i64, Option<ActionKey>, ResourceDescription)> {
        let mut order: Vec<usize> = (0..self.gaps.len()).filter(|i| self.gaps[*i].is_unbounded() && self.gaps[*i].start <= instant).collect();
        order.sort_by_key(|i| Reverse(self.gaps[*i].start));

        let mut pending = *requirements;
        let mut consumed = Vec::new();
        for index in order {
            if pending.is_useless() {
                break;
            }
            let gap = &mut self.gaps[index];
            let taken = gap.resources.reduce_common(&mut pending);
            if !taken.is_useless() {
                consumed.push((gap.start, gap.origin, taken));
            }
        }
        self.gaps.retain(|g| !g.is_empty());
        consumed
    }

    /// Packs selectable actions into a bounded gap, recursing into what each of them leaves.
    ///
    /// A candidate fits if it can start before the gap ends, finishes inside it and the gap can
    /// host it. The first fitting candidate in selection order is taken.
    ///
    /// # Returns
    /// Every action packed into the gap; whoever consumes the capacity after the gap waits for them.
    fn fill_gap(&mut self, gap: Gap) -> Vec<ActionKey> {
        if gap.is_empty() {
            return Vec::new();
        }

        let candidate = self.selectable.iter().copied().find(|(_, _, key)| {
            self.actions.get(key).is_some_and(|a| {
                let start = a.ready_at.max(gap.start);
                start <= gap.end && start.saturating_add(a.duration) <= gap.end && gap.resources.can_host(&a.requirements)
            })
        });
        let Some(entry) = candidate else {
            self.gaps.push(gap);
            return Vec::new();
        };
        self.selectable.remove(&entry);

        let key = entry.2;
        let Some(action) = self.actions.get(&key).cloned() else {
            self.gaps.push(gap);
            return Vec::new();
        };
        let start = action.ready_at.max(gap.start);
        let end = start.saturating_add(action.duration);

        log::debug!("Backfilled action {} into [{}, {}) at [{}, {})", action.id, gap.start, gap.end, start, end);
        self.placements.insert(key, (start, end));
        self.resource_predecessors.insert(key, gap.origin.into_iter().collect());
        self.release_successors(key, end);

        let mut left = gap.resources;
        left.reduce(&action.requirements);

        let count = gap.capacity + 1;
        let mut packed = vec![key];
        packed.extend(self.fill_gap(Gap::new(gap.start, start, gap.origin, gap.resources).with_packed(count)));
        packed.extend(self.fill_gap(Gap::new(start, gap.end, gap.origin, left).with_packed(count)));
        packed.extend(self.fill_gap(Gap::new(end, gap.end, Some(key), action.requirements).with_packed(count)));
        packed
    }
}
