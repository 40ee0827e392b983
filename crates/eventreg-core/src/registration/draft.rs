use serde::{Deserialize, Serialize};

use crate::models::{Event, ModuleName, RegistrationRequest, TeamMember};

/// Member slots on the team form. Slot 0 is the mandatory lead.
pub const MAX_TEAM_MEMBERS: usize = 3;

/// In-progress registration owned by the wizard.
///
/// Readable by anyone, writable only from inside the registration module so
/// every edit goes through the wizard's update operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationDraft {
    event: Event,
    team_name: String,
    members: [TeamMember; MAX_TEAM_MEMBERS],
    modules: Vec<ModuleName>,
}

impl RegistrationDraft {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            team_name: String::new(),
            members: Default::default(),
            modules: Vec::new(),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_id(&self) -> &str {
        &self.event.id
    }

    /// Team name as typed.
    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn trimmed_team_name(&self) -> &str {
        self.team_name.trim()
    }

    pub fn members(&self) -> &[TeamMember] {
        &self.members
    }

    /// Members that will be sent, trimmed, in slot order.
    pub fn filled_members(&self) -> Vec<TeamMember> {
        self.members
            .iter()
            .filter(|m| m.is_filled())
            .map(TeamMember::trimmed)
            .collect()
    }

    /// Selected modules in the order they were picked.
    pub fn selected_modules(&self) -> &[ModuleName] {
        &self.modules
    }

    pub fn is_selected(&self, module: &ModuleName) -> bool {
        self.modules.contains(module)
    }

    /// The module the payment record is filed under.
    pub fn primary_module(&self) -> Option<&ModuleName> {
        self.modules.first()
    }

    pub fn registration_request(&self) -> RegistrationRequest {
        RegistrationRequest {
            team_name: self.trimmed_team_name().to_string(),
            members: self.filled_members(),
            modules: self.modules.clone(),
        }
    }

    pub(crate) fn set_team_name(&mut self, name: impl Into<String>) {
        self.team_name = name.into();
    }

    pub(crate) fn member_mut(&mut self, index: usize) -> Option<&mut TeamMember> {
        self.members.get_mut(index)
    }

    /// Replace a whole slot. Returns false when `index` is out of range.
    pub(crate) fn set_member(&mut self, index: usize, member: TeamMember) -> bool {
        match self.members.get_mut(index) {
            Some(slot) => {
                *slot = member;
                true
            }
            None => false,
        }
    }

    /// Flip a module's selection. Returns the new state, or `None` when the
    /// event has no such module.
    pub(crate) fn toggle_module(&mut self, module: &ModuleName) -> Option<bool> {
        if !self.event.has_module(module) {
            return None;
        }
        if let Some(pos) = self.modules.iter().position(|m| m == module) {
            self.modules.remove(pos);
            Some(false)
        } else {
            self.modules.push(module.clone());
            Some(true)
        }
    }
}
