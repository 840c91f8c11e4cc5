//! Decision gate for structural edits that would orphan saved renders.
//!
//! A structural edit against a base with saved renders is applied
//! provisionally and held as a [`PendingDecision`] until the user picks
//! CLEAR, REAPPLY or CANCEL. Only one decision can be open at a time.
//! The gate is generic over the base kind and render kind so every editor
//! area with the same base/render split shares it.

use serde::{Deserialize, Serialize};

use crate::compare::is_structural_change;
use crate::model::{BaseStructure, CosmeticRender, Sbgb};

/// A base whose changes can be detected field by field.
pub trait Structure: Clone {
    fn differs_from(&self, other: &Self) -> bool;
}

/// A saved render bound to a base of kind `Base`.
pub trait RenderRecord {
    type Base: Structure;
    /// What a rate request persists: a base paired with this render's cosmetics.
    type Combined;

    fn record_id(&self) -> Option<&str>;
    fn note(&self) -> u8;
    fn pair_with(&self, base: &Self::Base) -> Self::Combined;
}

impl Structure for BaseStructure {
    fn differs_from(&self, other: &Self) -> bool {
        is_structural_change(self, other)
    }
}

impl RenderRecord for CosmeticRender {
    type Base = BaseStructure;
    type Combined = Sbgb;

    fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn note(&self) -> u8 {
        self.note
    }

    /// The pairing is a new combination, so neither it nor its base carries an
    /// existing id.
    fn pair_with(&self, base: &BaseStructure) -> Sbgb {
        Sbgb {
            id: None,
            name: self.name.clone().or_else(|| Some(base.name.clone())),
            description: self.description.clone(),
            image_structure: BaseStructure {
                id: None,
                ..base.clone()
            },
            image_color: self.colors.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Clear,
    Reapply,
    Cancel,
}

/// A structural edit waiting for the user.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDecision<B> {
    pub base_id: String,
    pub before: B,
    pub after: B,
    pub affected: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    /// Nothing structural changed.
    Unchanged,
    /// Applied directly, no renders to protect.
    Committed,
    /// Applied provisionally; a decision is now pending.
    Prompted { affected: usize },
    /// Refused: a decision or its remediation is still open.
    Locked,
}

/// One request issued to carry out a decision.
#[derive(Clone, Debug, PartialEq)]
pub enum Remediation<C> {
    Delete { render_id: String },
    Rate { combined: C, note: u8 },
}

/// What the caller must do once a decision is made.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution<B, C> {
    pub decision: Decision,
    pub base_id: String,
    /// Form values to put back (CANCEL only).
    pub restore: Option<B>,
    /// Requests to issue, in render load order.
    pub requests: Vec<Remediation<C>>,
}

#[derive(Debug)]
pub struct Reconciler<B> {
    pending: Option<PendingDecision<B>>,
}

impl<B> Default for Reconciler<B> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<B: Structure> Reconciler<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&PendingDecision<B>> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Classify a structural edit from `before` to `after` on base `base_id`
    /// which currently has `render_count` saved renders.
    pub fn propose(
        &mut self,
        before: &B,
        after: &B,
        base_id: Option<&str>,
        render_count: usize,
    ) -> EditOutcome {
        if !after.differs_from(before) {
            return EditOutcome::Unchanged;
        }
        if self.pending.is_some() {
            return EditOutcome::Locked;
        }
        match base_id {
            Some(base_id) if render_count > 0 => {
                tracing::debug!(base_id, render_count, "structural edit needs a decision");
                self.pending = Some(PendingDecision {
                    base_id: base_id.to_string(),
                    before: before.clone(),
                    after: after.clone(),
                    affected: render_count,
                });
                EditOutcome::Prompted {
                    affected: render_count,
                }
            }
            _ => EditOutcome::Committed,
        }
    }

    /// Close the pending decision. `renders` are the affected base's renders
    /// in load order. Returns `None` when nothing was pending.
    pub fn resolve<R>(&mut self, decision: Decision, renders: &[R]) -> Option<Resolution<B, R::Combined>>
    where
        R: RenderRecord<Base = B>,
    {
        let pending = self.pending.take()?;
        tracing::debug!(base_id = %pending.base_id, ?decision, "structural decision resolved");

        let (restore, requests) = match decision {
            Decision::Cancel => (Some(pending.before), Vec::new()),
            Decision::Clear => {
                let requests = renders
                    .iter()
                    .filter_map(|r| match r.record_id() {
                        Some(id) => Some(Remediation::Delete {
                            render_id: id.to_string(),
                        }),
                        None => {
                            tracing::warn!("render without id cannot be deleted, skipping");
                            None
                        }
                    })
                    .collect();
                (None, requests)
            }
            Decision::Reapply => {
                let requests = renders
                    .iter()
                    .map(|r| Remediation::Rate {
                        combined: r.pair_with(&pending.after),
                        note: r.note(),
                    })
                    .collect();
                (None, requests)
            }
        };

        Some(Resolution {
            decision,
            base_id: pending.base_id,
            restore,
            requests,
        })
    }
}
