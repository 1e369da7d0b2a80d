//! Desktop reconciliation.
//!
//! A pass runs in two halves. [`ReconcilePlan::compute`] is pure: from the occupancy, the
//! desktop count and the minimum it decides which gaps to close and how many desktops are
//! needed. [`apply_plan`] then mutates the host:
//!
//! 1. Remove unprotected desktops in `1..=max_occupied` (gaps between occupied desktops)
//! 2. Remove desktops past the needed count
//! 3. Append desktops up to the needed count
//! 4. Relabel every desktop from the template
//!
//! `needed = max(minimum, max_occupied - gaps_removed + 1)`: the highest occupied desktop
//! moves down by one for every gap removed before it, and one spare desktop follows it.

use crate::{DesktopHost, DesktopIndex, HostError, LabelTemplate, Occupancy};
use serde::{Deserialize, Serialize};

/// Minimum number of desktops when none is configured.
pub const DEFAULT_MINIMUM_DESKTOPS: usize = 2;

/// Label given to appended desktops until the relabel step renames them.
pub const PROVISIONAL_LABEL: &str = "Desktop";

/// Configuration read at the start of every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    minimum_desktops: usize,
    label_template: LabelTemplate,
}

impl ReconcileConfig {
    /// Create a configuration. A minimum below 1 is clamped to 1.
    pub fn new(minimum_desktops: usize, label_template: impl Into<LabelTemplate>) -> Self {
        Self {
            minimum_desktops: minimum_desktops.max(1),
            label_template: label_template.into(),
        }
    }

    /// Minimum number of desktops that always exist.
    pub fn minimum_desktops(&self) -> usize {
        self.minimum_desktops
    }

    /// Template used to label desktops.
    pub fn label_template(&self) -> &LabelTemplate {
        &self.label_template
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_DESKTOPS, LabelTemplate::default())
    }
}

/// Structural changes decided for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    /// Gap desktops to remove, in descending index order so earlier removals
    /// never shift later ones.
    pub gap_removals: Vec<DesktopIndex>,
    /// Highest occupied desktop before any removal (0 when nothing is occupied).
    pub max_occupied: DesktopIndex,
    /// Desktop count after the pass.
    pub needed: usize,
    /// Desktops removed from the end after gap removal.
    pub truncate: usize,
    /// Desktops appended at the end.
    pub append: usize,
}

impl ReconcilePlan {
    /// Decide the structural changes for a desktop sequence of `desktop_count` desktops.
    pub fn compute(occupancy: &Occupancy, desktop_count: usize, minimum_desktops: usize) -> Self {
        let max_occupied = occupancy.max_occupied();

        // Only the prefix up to the highest occupied desktop is scanned for gaps.
        let scan_end = max_occupied.min(desktop_count);
        let gap_removals: Vec<DesktopIndex> = (1..=scan_end)
            .rev()
            .filter(|&index| !occupancy.is_protected(index))
            .collect();
        let removed = gap_removals.len();

        let mut needed = minimum_desktops.max(1).max(max_occupied - removed + 1);

        // The viewed desktop must also survive truncation, at its post-removal position.
        let current = occupancy.current;
        if (1..=desktop_count).contains(&current) {
            let shifted = current - gap_removals.iter().filter(|&&i| i < current).count();
            needed = needed.max(shifted);
        }

        let remaining = desktop_count - removed;
        Self {
            gap_removals,
            max_occupied,
            needed,
            truncate: remaining.saturating_sub(needed),
            append: needed.saturating_sub(remaining),
        }
    }

    /// Check if the plan leaves the desktop sequence structurally unchanged.
    pub fn is_noop(&self) -> bool {
        self.gap_removals.is_empty() && self.truncate == 0 && self.append == 0
    }
}

/// What a pass actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Gap desktops removed between occupied desktops.
    pub removed_gaps: usize,
    /// Desktops removed from the end.
    pub truncated: usize,
    /// Desktops appended at the end.
    pub appended: usize,
    /// Desktops relabeled.
    pub relabeled: usize,
    /// Desktop count after the pass.
    pub desktop_count: usize,
}

impl ReconcileReport {
    /// Check if any desktop was created or removed.
    pub fn changed_structure(&self) -> bool {
        self.removed_gaps + self.truncated + self.appended > 0
    }
}

/// Apply a plan to the host and relabel every desktop.
pub fn apply_plan<H: DesktopHost + ?Sized>(
    host: &mut H,
    plan: &ReconcilePlan,
    template: &LabelTemplate,
) -> Result<ReconcileReport, HostError> {
    for &index in &plan.gap_removals {
        host.remove_desktop(index)?;
    }

    let mut count = host.desktop_count()?;
    let mut truncated = 0;
    while count > plan.needed {
        host.remove_desktop(count)?;
        count -= 1;
        truncated += 1;
    }

    let mut appended = 0;
    while count < plan.needed {
        host.create_desktop(count + 1, PROVISIONAL_LABEL)?;
        count += 1;
        appended += 1;
    }

    // Unconditional, so a template change shows up without a structural change.
    for index in 1..=count {
        host.set_desktop_label(index, &template.render(index))?;
    }

    Ok(ReconcileReport {
        removed_gaps: plan.gap_removals.len(),
        truncated,
        appended,
        relabeled: count,
        desktop_count: count,
    })
}

/// Reconcile the host's desktops against a given occupancy.
pub fn reconcile<H: DesktopHost + ?Sized>(
    occupancy: &Occupancy,
    host: &mut H,
    config: &ReconcileConfig,
) -> Result<ReconcileReport, HostError> {
    let plan = ReconcilePlan::compute(occupancy, host.desktop_count()?, config.minimum_desktops());
    apply_plan(host, &plan, config.label_template())
}

/// Run one full pass: snapshot the host, scan occupancy, reconcile and flush.
pub fn run_pass<H: DesktopHost + ?Sized>(
    host: &mut H,
    config: &ReconcileConfig,
) -> Result<ReconcileReport, HostError> {
    host.refresh()?;
    let occupancy = Occupancy::scan(host)?;
    let report = reconcile(&occupancy, host, config)?;
    host.flush()?;
    Ok(report)
}

/// Compute the plan a pass would apply, without mutating the host.
pub fn plan_pass<H: DesktopHost + ?Sized>(
    host: &mut H,
    config: &ReconcileConfig,
) -> Result<ReconcilePlan, HostError> {
    host.refresh()?;
    let occupancy = Occupancy::scan(host)?;
    Ok(ReconcilePlan::compute(
        &occupancy,
        host.desktop_count()?,
        config.minimum_desktops(),
    ))
}
