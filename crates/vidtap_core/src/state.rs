use std::collections::{BTreeMap, BTreeSet};

use crate::view_model::{AppViewModel, TabRowView};
use crate::Targets;

pub type TabId = i64;

/// Generation job lifecycle for one tab. `Idle` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Processing,
    Completed,
}

/// Instrumentation channel state for one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    /// Attach issued, host has not answered yet.
    Attaching { detach_requested: bool },
    Attached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    Requested,
    AlreadyAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachStatus {
    Detached,
    /// Busy tab or attach still in flight; a later lifecycle event retries.
    Deferred,
    NotAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachCompletion {
    Attached { detach_pending: bool },
    /// The tab was forgotten while the attach was in flight.
    Orphaned,
}

/// Owns the per-tab instrumentation and job maps.
///
/// Both maps are private; every mutation goes through a method so the busy
/// guard is enforced in one place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    targets: Targets,
    tabs: BTreeMap<TabId, Instrumentation>,
    jobs: BTreeMap<TabId, JobPhase>,
}

impl AppState {
    pub fn new(targets: Targets) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn instrumentation(&self, tab_id: TabId) -> Option<Instrumentation> {
        self.tabs.get(&tab_id).copied()
    }

    pub fn is_attached(&self, tab_id: TabId) -> bool {
        matches!(self.tabs.get(&tab_id), Some(Instrumentation::Attached))
    }

    pub fn job_phase(&self, tab_id: TabId) -> JobPhase {
        self.jobs.get(&tab_id).copied().unwrap_or_default()
    }

    pub fn is_busy(&self, tab_id: TabId) -> bool {
        self.job_phase(tab_id) == JobPhase::Processing
    }

    /// True while any tab has a submission without a terminal outcome.
    pub fn any_busy(&self) -> bool {
        self.jobs.values().any(|phase| *phase == JobPhase::Processing)
    }

    pub fn tracked_tabs(&self) -> Vec<TabId> {
        self.tabs.keys().copied().collect()
    }

    pub fn view(&self) -> AppViewModel {
        let ids: BTreeSet<TabId> = self.tabs.keys().chain(self.jobs.keys()).copied().collect();
        let tabs = ids
            .into_iter()
            .map(|tab_id| TabRowView {
                tab_id,
                instrumentation: self.instrumentation(tab_id),
                job: self.job_phase(tab_id),
            })
            .collect();
        AppViewModel {
            tabs,
            any_busy: self.any_busy(),
        }
    }

    pub(crate) fn begin_attach(&mut self, tab_id: TabId) -> AttachStatus {
        let status = match self.tabs.get(&tab_id) {
            Some(Instrumentation::Attached) => return AttachStatus::AlreadyAttached,
            Some(Instrumentation::Attaching { .. }) => AttachStatus::AlreadyAttached,
            None => AttachStatus::Requested,
        };
        // A fresh attach request cancels a pending detach.
        self.tabs.insert(
            tab_id,
            Instrumentation::Attaching {
                detach_requested: false,
            },
        );
        status
    }

    pub(crate) fn finish_attach(&mut self, tab_id: TabId) -> AttachCompletion {
        let Some(entry) = self.tabs.get_mut(&tab_id) else {
            return AttachCompletion::Orphaned;
        };
        let detach_pending = match *entry {
            Instrumentation::Attaching { detach_requested } => detach_requested,
            Instrumentation::Attached => false,
        };
        *entry = Instrumentation::Attached;
        AttachCompletion::Attached { detach_pending }
    }

    pub(crate) fn abandon_attach(&mut self, tab_id: TabId) {
        if matches!(
            self.tabs.get(&tab_id),
            Some(Instrumentation::Attaching { .. })
        ) {
            self.tabs.remove(&tab_id);
        }
    }

    /// Busy-guarded detach. On success both maps lose the tab, whatever the
    /// host later reports for the close itself.
    pub(crate) fn request_detach(&mut self, tab_id: TabId) -> DetachStatus {
        let busy = self.is_busy(tab_id);
        match self.tabs.get(&tab_id).copied() {
            None => DetachStatus::NotAttached,
            Some(Instrumentation::Attaching { .. }) => {
                self.tabs.insert(
                    tab_id,
                    Instrumentation::Attaching {
                        detach_requested: true,
                    },
                );
                DetachStatus::Deferred
            }
            Some(Instrumentation::Attached) if busy => DetachStatus::Deferred,
            Some(Instrumentation::Attached) => {
                self.forget_tab(tab_id);
                DetachStatus::Detached
            }
        }
    }

    /// Unguarded cleanup. Returns whether the tab had an instrumentation entry.
    pub(crate) fn forget_tab(&mut self, tab_id: TabId) -> bool {
        self.jobs.remove(&tab_id);
        self.tabs.remove(&tab_id).is_some()
    }

    /// Idle/Completed/Processing -> Processing. Returns the previous phase.
    pub(crate) fn start_job(&mut self, tab_id: TabId) -> JobPhase {
        self.jobs
            .insert(tab_id, JobPhase::Processing)
            .unwrap_or_default()
    }

    /// Processing -> Completed. Any other phase is left alone.
    pub(crate) fn complete_job(&mut self, tab_id: TabId) -> bool {
        if self.jobs.get(&tab_id) != Some(&JobPhase::Processing) {
            return false;
        }
        self.jobs.insert(tab_id, JobPhase::Completed);
        true
    }
}
