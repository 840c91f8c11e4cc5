//! Build/save lifecycle of one edit session.
//!
//! `Unbuilt` → (build ok) → `BuiltClean` → (edit) → `BuiltDirty` → (build ok) → `BuiltClean`.
//! Loading another stored Sbgb resets to `Unbuilt`. A failed build changes nothing.
//! Builds are tagged with a monotonically increasing token; only the response
//! to the latest request is accepted.

use serde::{Deserialize, Serialize};

use crate::compare::is_modified;
use crate::model::Sbgb;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    #[default]
    Unbuilt,
    BuiltClean,
    BuiltDirty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildToken(pub u64);

/// Outcome of feeding a build response back into the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildAcceptance {
    Accepted,
    /// A newer build was requested (or the session was reloaded) since this one.
    Stale,
}

/// What a save should send, and whether it overwrites an existing entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SavePlan {
    pub sbgb: Sbgb,
    pub force_update: bool,
}

#[derive(Debug, Default)]
pub struct Lifecycle {
    state: VersionState,
    loaded_from_store: Option<Sbgb>,
    last_built: Option<Sbgb>,
    next_token: u64,
    in_flight: Option<(BuildToken, Sbgb)>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> VersionState {
        self.state
    }

    pub fn is_built(&self) -> bool {
        self.state != VersionState::Unbuilt
    }

    pub fn is_modified_since_build(&self) -> bool {
        self.state == VersionState::BuiltDirty
    }

    pub fn is_building(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn loaded_from_store(&self) -> Option<&Sbgb> {
        self.loaded_from_store.as_ref()
    }

    pub fn last_built(&self) -> Option<&Sbgb> {
        self.last_built.as_ref()
    }

    /// Record an edit to structure or colors.
    pub fn note_edit(&mut self) {
        if self.state == VersionState::BuiltClean {
            tracing::debug!("edit after build, state -> built_dirty");
            self.state = VersionState::BuiltDirty;
        }
    }

    /// Re-derive clean/dirty after the form was put back to earlier values.
    pub fn resync(&mut self, current: &Sbgb) {
        if let Some(built) = &self.last_built {
            self.state = if is_modified(current, Some(built)) {
                VersionState::BuiltDirty
            } else {
                VersionState::BuiltClean
            };
        }
    }

    /// Name and description do not change the image; keep the snapshots in step.
    pub fn relabel(&mut self, name: Option<String>, description: Option<String>) {
        let in_flight = self.in_flight.as_mut().map(|(_, s)| s);
        for snapshot in self.last_built.iter_mut().chain(in_flight) {
            snapshot.name = name.clone();
            snapshot.description = description.clone();
        }
    }

    /// Start tracking a new build. Any build still in flight is superseded.
    pub fn begin_build(&mut self, snapshot: Sbgb) -> BuildToken {
        self.next_token += 1;
        let token = BuildToken(self.next_token);
        if let Some((old, _)) = self.in_flight.replace((token, snapshot)) {
            tracing::debug!(superseded = old.0, token = token.0, "build superseded");
        }
        token
    }

    /// Successful build response. `current` is the form as it is now; if it
    /// drifted from the requested snapshot the session stays dirty.
    pub fn finish_build(&mut self, token: BuildToken, current: &Sbgb) -> BuildAcceptance {
        let Some((expected, snapshot)) = self.in_flight.take_if(|(t, _)| *t == token) else {
            tracing::debug!(token = token.0, "discarding stale build response");
            return BuildAcceptance::Stale;
        };
        debug_assert_eq!(expected, token);
        self.state = if is_modified(current, Some(&snapshot)) {
            VersionState::BuiltDirty
        } else {
            VersionState::BuiltClean
        };
        tracing::debug!(token = token.0, state = ?self.state, "build accepted");
        self.last_built = Some(snapshot);
        BuildAcceptance::Accepted
    }

    /// Failed build response. The state is left as it was.
    pub fn fail_build(&mut self, token: BuildToken) -> BuildAcceptance {
        match self.in_flight.take_if(|(t, _)| *t == token) {
            Some(_) => BuildAcceptance::Accepted,
            None => BuildAcceptance::Stale,
        }
    }

    /// A different stored Sbgb was loaded into the session.
    pub fn load(&mut self, sbgb: Sbgb) {
        tracing::debug!(id = ?sbgb.id, "session loaded, state -> unbuilt");
        self.state = VersionState::Unbuilt;
        self.last_built = None;
        self.in_flight = None;
        self.loaded_from_store = Some(sbgb);
    }

    /// The store accepted a save; it is now the reference for `can_save`.
    pub fn mark_saved(&mut self, saved: Sbgb) {
        self.loaded_from_store = Some(saved);
    }

    pub fn can_build(&self) -> bool {
        matches!(self.state, VersionState::Unbuilt | VersionState::BuiltDirty)
    }

    pub fn can_save(&self) -> bool {
        self.state == VersionState::BuiltClean
            && match (&self.loaded_from_store, &self.last_built) {
                (None, _) => true,
                (Some(loaded), Some(built)) => is_modified(built, Some(loaded)),
                (Some(_), None) => false,
            }
    }

    pub fn can_download(&self) -> bool {
        self.state == VersionState::BuiltClean
    }

    /// Same name as what was loaded overwrites it; any other name creates a new entry.
    pub fn save_plan(&self) -> Option<SavePlan> {
        if !self.can_save() {
            return None;
        }
        let built = self.last_built.clone()?;
        let force_update = self
            .loaded_from_store
            .as_ref()
            .is_some_and(|loaded| loaded.id.is_some() && loaded.name == built.name);
        Some(SavePlan {
            sbgb: built,
            force_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseStructure, ColorParams};

    fn sbgb(seed: i64) -> Sbgb {
        Sbgb::new(
            BaseStructure {
                seed,
                ..BaseStructure::default()
            },
            ColorParams::default(),
        )
    }

    fn stored(seed: i64, name: &str) -> Sbgb {
        Sbgb {
            id: Some("s1".into()),
            name: Some(name.into()),
            ..sbgb(seed)
        }
    }

    #[test]
    fn starts_unbuilt() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), VersionState::Unbuilt);
        assert!(lc.can_build());
        assert!(!lc.can_save());
        assert!(!lc.can_download());
    }

    #[test]
    fn edit_while_unbuilt_stays_unbuilt() {
        let mut lc = Lifecycle::new();
        lc.note_edit();
        assert_eq!(lc.state(), VersionState::Unbuilt);
    }

    #[test]
    fn build_then_edit_goes_dirty() {
        let mut lc = Lifecycle::new();
        let form = sbgb(1);
        let t = lc.begin_build(form.clone());
        assert_eq!(lc.finish_build(t, &form), BuildAcceptance::Accepted);
        assert_eq!(lc.state(), VersionState::BuiltClean);
        assert!(lc.can_save());
        assert!(lc.can_download());
        assert!(!lc.can_build());

        lc.note_edit();
        assert_eq!(lc.state(), VersionState::BuiltDirty);
        assert!(lc.can_build());
        assert!(!lc.can_save());
        assert!(!lc.can_download());
    }

    #[test]
    fn failed_build_changes_nothing() {
        let mut lc = Lifecycle::new();
        let t = lc.begin_build(sbgb(1));
        assert_eq!(lc.fail_build(t), BuildAcceptance::Accepted);
        assert_eq!(lc.state(), VersionState::Unbuilt);
        assert!(lc.last_built().is_none());
        assert!(!lc.is_building());
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut lc = Lifecycle::new();
        let first = lc.begin_build(sbgb(1));
        let second = lc.begin_build(sbgb(2));
        assert!(second > first);

        assert_eq!(lc.finish_build(second, &sbgb(2)), BuildAcceptance::Accepted);
        assert_eq!(lc.finish_build(first, &sbgb(2)), BuildAcceptance::Stale);
        assert_eq!(lc.last_built().unwrap().image_structure.seed, 2);
    }

    #[test]
    fn form_drift_during_build_leaves_dirty() {
        let mut lc = Lifecycle::new();
        let t = lc.begin_build(sbgb(1));
        assert_eq!(lc.finish_build(t, &sbgb(5)), BuildAcceptance::Accepted);
        assert_eq!(lc.state(), VersionState::BuiltDirty);
        assert_eq!(lc.last_built().unwrap().image_structure.seed, 1);
    }

    #[test]
    fn resync_after_restore() {
        let mut lc = Lifecycle::new();
        let t = lc.begin_build(sbgb(1));
        lc.finish_build(t, &sbgb(1));
        lc.note_edit();
        lc.resync(&sbgb(1));
        assert_eq!(lc.state(), VersionState::BuiltClean);
        lc.resync(&sbgb(2));
        assert_eq!(lc.state(), VersionState::BuiltDirty);

        let mut fresh = Lifecycle::new();
        fresh.resync(&sbgb(1));
        assert_eq!(fresh.state(), VersionState::Unbuilt);
    }

    #[test]
    fn relabel_follows_built_snapshot() {
        let mut lc = Lifecycle::new();
        let t = lc.begin_build(sbgb(1));
        lc.relabel(Some("renamed".into()), None);
        let mut form = sbgb(1);
        form.name = Some("renamed".into());
        lc.finish_build(t, &form);
        assert_eq!(lc.state(), VersionState::BuiltClean);
        assert_eq!(lc.last_built().unwrap().name.as_deref(), Some("renamed"));
    }

    #[test]
    fn load_resets_session() {
        let mut lc = Lifecycle::new();
        let t = lc.begin_build(sbgb(1));
        lc.finish_build(t, &sbgb(1));
        let pending = lc.begin_build(sbgb(1));

        lc.load(stored(3, "nebula"));
        assert_eq!(lc.state(), VersionState::Unbuilt);
        assert!(lc.last_built().is_none());
        assert_eq!(lc.loaded_from_store().unwrap().image_structure.seed, 3);
        assert_eq!(lc.finish_build(pending, &sbgb(1)), BuildAcceptance::Stale);
    }

    #[test]
    fn cannot_save_unchanged_build() {
        let mut lc = Lifecycle::new();
        let loaded = stored(3, "nebula");
        lc.load(loaded.clone());
        let t = lc.begin_build(loaded.clone());
        lc.finish_build(t, &loaded);
        assert!(lc.can_download());
        assert!(!lc.can_save());
        assert!(lc.save_plan().is_none());
    }

    #[test]
    fn save_plan_overwrites_only_on_same_name() {
        let mut lc = Lifecycle::new();
        lc.load(stored(3, "nebula"));

        let same_name = stored(4, "nebula");
        let t = lc.begin_build(same_name.clone());
        lc.finish_build(t, &same_name);
        assert!(lc.save_plan().unwrap().force_update);

        let renamed = stored(4, "nebula v2");
        let t = lc.begin_build(renamed.clone());
        lc.finish_build(t, &renamed);
        assert!(!lc.save_plan().unwrap().force_update);
    }

    #[test]
    fn mark_saved_blocks_duplicate_save() {
        let mut lc = Lifecycle::new();
        let form = sbgb(8);
        let t = lc.begin_build(form.clone());
        lc.finish_build(t, &form);
        assert!(lc.can_save());
        lc.mark_saved(form);
        assert!(!lc.can_save());
    }
}
