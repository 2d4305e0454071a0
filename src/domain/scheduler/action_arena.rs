use slotmap::SlotMap;
use std::collections::{BTreeMap, VecDeque};

use crate::domain::resource::core_element::Implementation;
use crate::domain::scheduler::action::{ActionKey, ActionKind, ActionState, AllocatableAction};
use crate::domain::utils::id::WorkerId;
use crate::error::{Error, Result};

/// Result of a terminal failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureCascade {
    /// The failed action followed by every action reached through data-successor edges.
    pub failed: Vec<ActionKey>,

    /// Actions that only waited on a failed action for resource ordering and are now executable.
    pub freed: Vec<ActionKey>,
}

/// Result of reporting a failed execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Back to `Executable` for another attempt.
    Retry { attempt: u32 },

    /// Attempts exhausted, the failure cascaded.
    Failed(FailureCascade),
}

/// Arena owning every live action.
///
/// All operations touching more than one action live here so the two directions of every edge
/// stay in sync. Actions reference each other only by [`ActionKey`].
#[derive(Debug)]
pub struct ActionArena {
    actions: SlotMap<ActionKey, AllocatableAction>,
    next_id: u64,
}

impl Default for ActionArena {
    fn default() -> Self {
        ActionArena::new()
    }
}

impl ActionArena {
    pub fn new() -> Self {
        ActionArena { actions: SlotMap::with_key(), next_id: 1 }
    }

    /// Creates an action after the given data predecessors.
    ///
    /// Finished predecessors are ignored. The action is `Executable` right away if no live
    /// predecessor remains, and `Failed` if one of them already failed.
    pub fn create(&mut self, kind: ActionKind, priority: i64, data_predecessors: &[ActionKey]) -> ActionKey {
        let id = self.next_id;
        self.next_id += 1;
        let key = self.actions.insert(AllocatableAction::new(id, kind, priority));

        let mut predecessor_failed = false;
        for &pred in data_predecessors {
            match self.actions.get(pred).map(|p| p.state) {
                None | Some(ActionState::Completed) => {}
                Some(ActionState::Failed) => predecessor_failed = true,
                Some(_) => self.link_data(pred, key),
            }
        }

        if predecessor_failed {
            log::warn!("Action {} created after a failed predecessor, failing it", id);
            if let Err(e) = self.failed(key) {
                log::error!("Failing new action {} was rejected: {}", id, e);
            }
        } else {
            self.release_if_ready(key);
        }

        key
    }

    pub fn get(&self, key: ActionKey) -> Option<&AllocatableAction> {
        self.actions.get(key)
    }

    pub(super) fn get_mut(&mut self, key: ActionKey) -> Option<&mut AllocatableAction> {
        self.actions.get_mut(key)
    }

    pub fn contains(&self, key: ActionKey) -> bool {
        self.actions.contains_key(key)
    }

    pub fn state(&self, key: ActionKey) -> Option<ActionState> {
        self.actions.get(key).map(|a| a.state)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKey, &AllocatableAction)> {
        self.actions.iter()
    }

    pub fn count_by_state(&self) -> BTreeMap<ActionState, usize> {
        let mut counts = BTreeMap::new();
        for action in self.actions.values() {
            *counts.entry(action.state).or_insert(0) += 1;
        }
        counts
    }

    /// Adds a data dependency. Only legal while `successor` is `Pending`.
    ///
    /// # Returns
    /// `false` if the predecessor already completed and no edge was needed.
    ///
    /// # Errors
    /// `Error::ActionFailure` if the predecessor failed; the successor can never get its input.
    pub fn add_data_predecessor(&mut self, successor: ActionKey, predecessor: ActionKey) -> Result<bool> {
        self.expect_state(successor, &[ActionState::Pending], "add data predecessor")?;

        match self.actions.get(predecessor) {
            None => Ok(false),
            Some(p) if p.state == ActionState::Completed => Ok(false),
            Some(p) if p.state == ActionState::Failed => {
                Err(Error::ActionFailure { action_id: p.id, reason: "data predecessor already failed".to_string() })
            }
            Some(_) => {
                self.link_data(predecessor, successor);
                Ok(true)
            }
        }
    }

    /// Adds a resource-ordering dependency. Only legal while `successor` is `Pending`.
    ///
    /// Edges only run from older to newer actions, like data edges do, so the combined graph
    /// stays acyclic when retried or donated actions are placed behind newer ones. Other
    /// requests are dropped and `false` is returned.
    pub fn add_resource_predecessor(&mut self, successor: ActionKey, predecessor: ActionKey) -> Result<bool> {
        self.expect_state(successor, &[ActionState::Pending], "add resource predecessor")?;

        if !self.can_precede(predecessor, successor) {
            return Ok(false);
        }
        self.link_resource(predecessor, successor);
        Ok(true)
    }

    /// Replaces the resource predecessors of a not yet launched action.
    ///
    /// An `Executable` action keeps its state and only loses its old edges; callers release the
    /// action afterwards if nothing is left to wait for.
    pub fn set_resource_predecessors(&mut self, key: ActionKey, predecessors: &[ActionKey]) -> Result<()> {
        let state = self.expect_state(key, &[ActionState::Pending, ActionState::Executable], "set resource predecessors")?;

        let old = match self.actions.get_mut(key) {
            Some(action) => std::mem::take(&mut action.resource_predecessors),
            None => return Err(Error::ActionNotFound),
        };
        for pred in old {
            if let Some(p) = self.actions.get_mut(pred) {
                p.resource_successors.retain(|s| *s != key);
            }
        }

        if state == ActionState::Pending {
            for &pred in predecessors {
                if self.can_precede(pred, key) {
                    self.link_resource(pred, key);
                }
            }
        }
        Ok(())
    }

    /// Removes an action from its resource ordering chain, linking its live predecessors to its
    /// pending successors so the chain stays connected.
    ///
    /// # Returns
    /// The successors left without any predecessor, now `Executable`.
    pub fn unlink_resource_chain(&mut self, key: ActionKey) -> Vec<ActionKey> {
        let (preds, succs) = match self.actions.get_mut(key) {
            Some(action) => (std::mem::take(&mut action.resource_predecessors), std::mem::take(&mut action.resource_successors)),
            None => return Vec::new(),
        };

        for pred in &preds {
            if let Some(p) = self.actions.get_mut(*pred) {
                p.resource_successors.retain(|s| *s != key);
            }
        }
        for succ in &succs {
            if let Some(s) = self.actions.get_mut(*succ) {
                s.resource_predecessors.retain(|p| *p != key);
            }
        }

        for &pred in &preds {
            if !self.actions.get(pred).is_some_and(|p| p.is_live()) {
                continue;
            }
            for &succ in &succs {
                if self.state(succ) == Some(ActionState::Pending) {
                    self.link_resource(pred, succ);
                }
            }
        }

        succs.into_iter().filter(|s| self.release_if_ready(*s)).collect()
    }

    /// Moves a `Pending` action without predecessors to `Executable`.
    ///
    /// # Returns
    /// `true` only for the call that performed the transition, so an action is released once.
    pub fn release_if_ready(&mut self, key: ActionKey) -> bool {
        match self.actions.get_mut(key) {
            Some(action) if action.state == ActionState::Pending && !action.has_predecessors() => {
                action.state = ActionState::Executable;
                log::debug!("{} is now executable", action);
                true
            }
            _ => false,
        }
    }

    /// Records the worker and implementation an action is placed on.
    pub fn assign_resources(&mut self, key: ActionKey, worker: WorkerId, implementation: Implementation) -> Result<()> {
        self.expect_state(key, &[ActionState::Pending, ActionState::Executable], "assign resources")?;
        if let Some(action) = self.actions.get_mut(key) {
            action.worker = Some(worker);
            action.implementation = Some(implementation);
        }
        Ok(())
    }

    pub fn clear_assignment(&mut self, key: ActionKey) {
        if let Some(action) = self.actions.get_mut(key) {
            action.worker = None;
            action.implementation = None;
        }
    }

    /// `Executable` -> `Scheduled`, once the worker accepted the reservation.
    pub fn mark_scheduled(&mut self, key: ActionKey) -> Result<()> {
        self.expect_state(key, &[ActionState::Executable], "schedule")?;
        self.set_state(key, ActionState::Scheduled);
        Ok(())
    }

    /// `Scheduled` -> `Running`, once handed to the executor.
    pub fn mark_running(&mut self, key: ActionKey, now: i64) -> Result<()> {
        self.expect_state(key, &[ActionState::Scheduled], "run")?;
        if let Some(action) = self.actions.get_mut(key) {
            action.state = ActionState::Running;
            action.started_at = Some(now);
        }
        Ok(())
    }

    /// Successful end of a running action.
    ///
    /// # Returns
    /// Successors, over both edge kinds, that have no predecessor left. Each of them is
    /// returned by exactly one call.
    pub fn completed(&mut self, key: ActionKey) -> Result<Vec<ActionKey>> {
        self.expect_state(key, &[ActionState::Running], "complete")?;

        let (data_succs, resource_succs) = match self.actions.get_mut(key) {
            Some(action) => {
                action.state = ActionState::Completed;
                action.data_predecessors.clear();
                action.resource_predecessors.clear();
                (std::mem::take(&mut action.data_successors), std::mem::take(&mut action.resource_successors))
            }
            None => return Err(Error::ActionNotFound),
        };

        for succ in &data_succs {
            if let Some(s) = self.actions.get_mut(*succ) {
                s.data_predecessors.retain(|p| *p != key);
            }
        }
        for succ in &resource_succs {
            if let Some(s) = self.actions.get_mut(*succ) {
                s.resource_predecessors.retain(|p| *p != key);
            }
        }

        let freed: Vec<ActionKey> = data_succs.into_iter().chain(resource_succs).filter(|s| self.release_if_ready(*s)).collect();

        if let Some(action) = self.actions.get(key) {
            log::debug!("{} completed, released {} successors", action, freed.len());
        }
        Ok(freed)
    }

    /// A running attempt failed.
    ///
    /// Below the retry threshold the action returns to `Executable`; resource bookkeeping is up
    /// to the caller. Past it, or when the action was cancelled, the action fails terminally.
    pub fn error(&mut self, key: ActionKey, max_retries: u32) -> Result<ErrorOutcome> {
        self.expect_state(key, &[ActionState::Running, ActionState::Scheduled], "report error")?;

        let (attempt, cancelled, id) = match self.actions.get_mut(key) {
            Some(action) => {
                action.state = ActionState::Error;
                action.retries += 1;
                action.started_at = None;
                (action.retries, action.cancelled, action.id)
            }
            None => return Err(Error::ActionNotFound),
        };

        if cancelled || attempt > max_retries {
            log::error!("Action {} failed after {} attempts", id, attempt);
            return Ok(ErrorOutcome::Failed(self.failed(key)?));
        }

        log::warn!("Action {} failed attempt {}, retrying ({} retries allowed)", id, attempt, max_retries);
        self.set_state(key, ActionState::Executable);
        Ok(ErrorOutcome::Retry { attempt })
    }

    /// Terminal failure.
    ///
    /// Fails every action reachable through data-successor edges. Resource edges are unlinked
    /// instead of followed, so successors that only waited for a slot may still run.
    pub fn failed(&mut self, key: ActionKey) -> Result<FailureCascade> {
        match self.state(key) {
            None => return Err(Error::ActionNotFound),
            Some(ActionState::Failed) => return Ok(FailureCascade::default()),
            Some(ActionState::Completed) => return Err(self.transition_error(key, "fail")),
            Some(_) => {}
        }

        let mut cascade = FailureCascade::default();
        let mut queue = VecDeque::from([key]);

        while let Some(current) = queue.pop_front() {
            let (data_preds, data_succs) = match self.actions.get_mut(current) {
                Some(action) if !action.state.is_terminal() => {
                    action.state = ActionState::Failed;
                    (std::mem::take(&mut action.data_predecessors), std::mem::take(&mut action.data_successors))
                }
                _ => continue,
            };

            for pred in data_preds {
                if let Some(p) = self.actions.get_mut(pred) {
                    p.data_successors.retain(|s| *s != current);
                }
            }
            for succ in &data_succs {
                if let Some(s) = self.actions.get_mut(*succ) {
                    s.data_predecessors.retain(|p| *p != current);
                }
            }

            cascade.freed.extend(self.unlink_resource_chain(current));
            cascade.failed.push(current);
            queue.extend(data_succs);
        }

        cascade.freed.retain(|f| self.state(*f) != Some(ActionState::Failed));

        log::warn!("Failure of action {:?} cascaded to {} actions", key, cascade.failed.len());
        Ok(cascade)
    }

    /// Flags a running action so its eventual end counts as a failure.
    ///
    /// # Returns
    /// `true` if the action was running and got flagged; other states need a direct failure.
    pub fn mark_cancelled(&mut self, key: ActionKey) -> bool {
        match self.actions.get_mut(key) {
            Some(action) if action.state == ActionState::Running => {
                action.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Drops a finished action. Live actions are kept.
    pub fn remove(&mut self, key: ActionKey) -> Option<AllocatableAction> {
        if self.actions.get(key).is_some_and(|a| a.state.is_terminal()) {
            return self.actions.remove(key);
        }
        None
    }

    fn can_precede(&self, pred: ActionKey, succ: ActionKey) -> bool {
        match (self.actions.get(pred), self.actions.get(succ)) {
            (Some(p), Some(s)) => p.is_live() && p.id < s.id,
            _ => false,
        }
    }

    fn link_data(&mut self, pred: ActionKey, succ: ActionKey) {
        if let Some(p) = self.actions.get_mut(pred) {
            if !p.data_successors.contains(&succ) {
                p.data_successors.push(succ);
            }
        }
        if let Some(s) = self.actions.get_mut(succ) {
            if !s.data_predecessors.contains(&pred) {
                s.data_predecessors.push(pred);
            }
        }
    }

    fn link_resource(&mut self, pred: ActionKey, succ: ActionKey) {
        if let Some(p) = self.actions.get_mut(pred) {
            if !p.resource_successors.contains(&succ) {
                p.resource_successors.push(succ);
            }
        }
        if let Some(s) = self.actions.get_mut(succ) {
            if !s.resource_predecessors.contains(&pred) {
                s.resource_predecessors.push(pred);
            }
        }
    }

    fn set_state(&mut self, key: ActionKey, state: ActionState) {
        if let Some(action) = self.actions.get_mut(key) {
            action.state = state;
        }
    }

    pub(super) fn expect_state(&self, key: ActionKey, allowed: &[ActionState], operation: &'static str) -> Result<ActionState> {
        let action = self.actions.get(key).ok_or(Error::ActionNotFound)?;
        if allowed.contains(&action.state) {
            Ok(action.state)
        } else {
            Err(self.transition_error(key, operation))
        }
    }

    fn transition_error(&self, key: ActionKey, operation: &'static str) -> Error {
        match self.actions.get(key) {
            Some(action) => Error::InvalidTransition { action_id: action.id, state: action.state.to_string(), operation },
            None => Error::ActionNotFound,
        }
    }
}
