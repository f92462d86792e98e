//! Terraform plan inspection.
//!
//! Plans are read from `terraform show -json`. Only `resource_changes` is
//! needed: each entry names a resource address and the actions Terraform
//! would take on it.

use serde::Deserialize;

/// Machine-readable plan (subset of the `terraform show -json` format).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub resource_changes: Vec<ResourceChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceChange {
    pub address: String,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Change {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    NoOp,
    Create,
    Read,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// What a planned change does to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    None,
    Add,
    Update,
    Destroy,
    Replace,
}

impl ChangeKind {
    fn label(self) -> &'static str {
        match self {
            ChangeKind::None => "no-op",
            ChangeKind::Add => "create",
            ChangeKind::Update => "update",
            ChangeKind::Destroy => "delete",
            ChangeKind::Replace => "replace",
        }
    }
}

impl ResourceChange {
    pub fn kind(&self) -> ChangeKind {
        let actions = &self.change.actions;
        let creates = actions.contains(&Action::Create);
        let deletes = actions.contains(&Action::Delete);
        match (creates, deletes) {
            (true, true) => ChangeKind::Replace,
            (false, true) => ChangeKind::Destroy,
            (true, false) => ChangeKind::Add,
            (false, false) if actions.contains(&Action::Update) => ChangeKind::Update,
            // Unknown actions are reported rather than silently passed
            (false, false) if actions.contains(&Action::Unknown) => ChangeKind::Update,
            (false, false) => ChangeKind::None,
        }
    }

    fn describe(&self, kind: ChangeKind) -> String {
        format!("{} ({})", self.address, kind.label())
    }
}

/// Resource addresses excluded from a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exemptions {
    pub list: Vec<String>,
}

impl Exemptions {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            list: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.list.iter().any(|a| a == address)
    }
}

/// Exemptions applied to the plans a run checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanExemptions {
    pub ignore_adds: Exemptions,
    pub ignore_updates: Exemptions,
    pub ignore_destroys: Exemptions,
}

/// Changes planned right after an apply, minus exemptions.
///
/// A clean re-plan must be empty; anything returned is drift.
pub fn check_consistency(plan: &Plan, exemptions: &PlanExemptions) -> Vec<String> {
    plan.resource_changes
        .iter()
        .filter_map(|rc| {
            let kind = rc.kind();
            let exempt = match kind {
                ChangeKind::None => true,
                ChangeKind::Add => exemptions.ignore_adds.contains(&rc.address),
                ChangeKind::Update => exemptions.ignore_updates.contains(&rc.address),
                ChangeKind::Destroy | ChangeKind::Replace => {
                    exemptions.ignore_destroys.contains(&rc.address)
                }
            };
            (!exempt).then(|| rc.describe(kind))
        })
        .collect()
}

/// Destroys and replacements planned when moving to new module code.
///
/// Adds and in-place updates are allowed during an upgrade.
pub fn check_upgrade(plan: &Plan, exemptions: &PlanExemptions) -> Vec<String> {
    plan.resource_changes
        .iter()
        .filter_map(|rc| {
            let kind = rc.kind();
            let destructive = matches!(kind, ChangeKind::Destroy | ChangeKind::Replace);
            (destructive && !exemptions.ignore_destroys.contains(&rc.address))
                .then(|| rc.describe(kind))
        })
        .collect()
}
