use crate::{Instrumentation, JobPhase, TabId};

/// Read-only snapshot of the coordinator, ordered by tab id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub tabs: Vec<TabRowView>,
    pub any_busy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabRowView {
    pub tab_id: TabId,
    pub instrumentation: Option<Instrumentation>,
    pub job: JobPhase,
}

impl AppViewModel {
    pub fn tab(&self, tab_id: TabId) -> Option<&TabRowView> {
        self.tabs.iter().find(|row| row.tab_id == tab_id)
    }
}
