//! The edit session.
//!
//! [`Editor`] owns the form values, the build lifecycle, the structural
//! decision gate and the render collection. It performs no I/O: every
//! [`Event`] updates state synchronously and may queue [`Command`]s for the
//! caller to run against the external services. Their outcomes come back
//! as further events. Failures become [`Notice`]s and never alter state.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::compare::{is_cosmetic_change, is_structural_change};
use crate::config::EditorConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::lifecycle::{BuildAcceptance, BuildToken, Lifecycle, SavePlan, VersionState};
use crate::model::{BaseStructure, ColorParams, CosmeticRender, Sbgb};
use crate::preview::Preview;
use crate::reconcile::{Decision, EditOutcome, PendingDecision, Reconciler, Remediation};
use crate::renders::RenderCollection;

const UNSETTLED: &str = "resolve the pending structure change first";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

/// Work for the caller to perform against the external services.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    BuildPreview { token: BuildToken, sbgb: Sbgb },
    ListBaseStructures,
    ListRenders { base_id: String },
    Save { request: RequestId, sbgb: Sbgb, force_update: bool },
    RateRender { request: RequestId, sbgb: Sbgb, note: u8 },
    DeleteRender { request: RequestId, render_id: String },
}

/// User actions and service outcomes fed into the session.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Form edits
    StructureEdited { structure: BaseStructure },
    ColorsEdited { colors: ColorParams },
    BackThresholdSet { value: f64 },
    MiddleThresholdSet { value: f64 },
    NameEdited { name: Option<String> },
    DescriptionEdited { description: Option<String> },

    // Prompts
    Decided { decision: Decision },
    OverwriteAnswered { confirmed: bool },
    NoticeDismissed { id: u64 },

    // User actions
    BuildRequested,
    SaveRequested,
    RateRequested { note: u8 },
    DeleteRenderRequested { render_id: String },
    RenderSelected { render_id: String },
    StoredLoaded { sbgb: Sbgb },
    BasesRequested,
    RendersRequested { base_id: String },

    // Service outcomes
    BuildFinished { token: BuildToken, result: ServiceResult<Preview> },
    BasesListed { result: ServiceResult<Vec<BaseStructure>> },
    RendersListed { base_id: String, result: ServiceResult<Vec<CosmeticRender>> },
    Saved { request: RequestId, result: ServiceResult<Sbgb> },
    RenderRated { request: RequestId, result: ServiceResult<CosmeticRender> },
    RenderDeleted { request: RequestId, render_id: String, result: ServiceResult<()> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A dismissible user-visible message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub text: String,
}

/// Requests issued for a CLEAR or REAPPLY decision, tracked until all settle.
#[derive(Debug)]
struct RemediationBatch {
    base_id: String,
    decision: Decision,
    outstanding: BTreeSet<RequestId>,
    failed: usize,
    touched: BTreeSet<String>,
}

/// Serializable snapshot of the session for a UI.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub form: Sbgb,
    pub state: VersionState,
    pub building: bool,
    pub can_build: bool,
    pub can_save: bool,
    pub can_download: bool,
    pub pending_decision: Option<PendingDecision<BaseStructure>>,
    pub overwrite_prompt: bool,
    pub reconciling: bool,
    pub renders: Vec<CosmeticRender>,
    pub bases: Vec<BaseStructure>,
    pub notices: Vec<Notice>,
}

#[derive(Debug)]
pub struct Editor {
    config: EditorConfig,
    form: Sbgb,
    lifecycle: Lifecycle,
    reconciler: Reconciler<BaseStructure>,
    renders: RenderCollection,
    bases: Vec<BaseStructure>,
    preview: Option<Preview>,
    batch: Option<RemediationBatch>,
    overwrite_prompt: Option<SavePlan>,
    saving: Option<RequestId>,
    next_request: u64,
    next_notice: u64,
    outbox: VecDeque<Command>,
    notices: Vec<Notice>,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        let form = Sbgb::new(config.default_structure.clone(), config.default_colors.clone());
        Self {
            config,
            form,
            lifecycle: Lifecycle::new(),
            reconciler: Reconciler::new(),
            renders: RenderCollection::new(),
            bases: Vec::new(),
            preview: None,
            batch: None,
            overwrite_prompt: None,
            saving: None,
            next_request: 0,
            next_notice: 0,
            outbox: VecDeque::new(),
            notices: Vec::new(),
        }
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn form(&self) -> &Sbgb {
        &self.form
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> VersionState {
        self.lifecycle.state()
    }

    pub fn can_build(&self) -> bool {
        self.lifecycle.can_build() && self.structure_settled()
    }

    pub fn can_save(&self) -> bool {
        self.lifecycle.can_save() && self.saving.is_none() && self.structure_settled()
    }

    pub fn can_download(&self) -> bool {
        self.lifecycle.can_download() && self.structure_settled()
    }

    /// No structural decision is open and no CLEAR/REAPPLY request is outstanding.
    pub fn structure_settled(&self) -> bool {
        !self.reconciler.is_pending() && self.batch.is_none()
    }

    pub fn pending_decision(&self) -> Option<&PendingDecision<BaseStructure>> {
        self.reconciler.pending()
    }

    pub fn overwrite_pending(&self) -> bool {
        self.overwrite_prompt.is_some()
    }

    /// True while CLEAR/REAPPLY requests are still outstanding.
    pub fn is_reconciling(&self) -> bool {
        self.batch.is_some()
    }

    pub fn renders(&self) -> &RenderCollection {
        &self.renders
    }

    /// Renders of the base currently in the form.
    pub fn loaded_renders(&self) -> &[CosmeticRender] {
        match self.form.base_id() {
            Some(id) => self.renders.renders_for(id),
            None => &[],
        }
    }

    pub fn bases(&self) -> &[BaseStructure] {
        &self.bases
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// The built image, only while it matches the form.
    pub fn download(&self) -> Option<&Preview> {
        self.preview.as_ref().filter(|_| self.can_download())
    }

    /// Take every queued command, oldest first.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.outbox.drain(..).collect()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            form: self.form.clone(),
            state: self.state(),
            building: self.lifecycle.is_building(),
            can_build: self.can_build(),
            can_save: self.can_save(),
            can_download: self.can_download(),
            pending_decision: self.reconciler.pending().cloned(),
            overwrite_prompt: self.overwrite_pending(),
            reconciling: self.is_reconciling(),
            renders: self.loaded_renders().to_vec(),
            bases: self.bases.clone(),
            notices: self.notices.clone(),
        }
    }

    // ---------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::StructureEdited { structure } => {
                self.edit_structure(structure);
            }
            Event::ColorsEdited { colors } => self.edit_colors(colors),
            Event::BackThresholdSet { value } => self.set_back_threshold(value),
            Event::MiddleThresholdSet { value } => self.set_middle_threshold(value),
            Event::NameEdited { name } => self.edit_name(name),
            Event::DescriptionEdited { description } => self.edit_description(description),
            Event::Decided { decision } => self.decide(decision),
            Event::OverwriteAnswered { confirmed } => self.answer_overwrite(confirmed),
            Event::NoticeDismissed { id } => self.dismiss(id),
            Event::BuildRequested => {
                self.request_build();
            }
            Event::SaveRequested => self.request_save(),
            Event::RateRequested { note } => self.request_rate(note),
            Event::DeleteRenderRequested { render_id } => self.request_delete(render_id),
            Event::RenderSelected { render_id } => self.select_render(&render_id),
            Event::StoredLoaded { sbgb } => {
                self.load(sbgb);
            }
            Event::BasesRequested => self.outbox.push_back(Command::ListBaseStructures),
            Event::RendersRequested { base_id } => self.load_renders(base_id),
            Event::BuildFinished { token, result } => self.build_finished(token, result),
            Event::BasesListed { result } => self.bases_listed(result),
            Event::RendersListed { base_id, result } => self.renders_listed(base_id, result),
            Event::Saved { request, result } => self.saved(request, result),
            Event::RenderRated { request, result } => self.render_rated(request, result),
            Event::RenderDeleted {
                request,
                render_id,
                result,
            } => self.render_deleted(request, render_id, result),
        }
    }

    // ---------------------------------------------------------------
    // Form edits
    // ---------------------------------------------------------------

    /// Edit the base structure. The form keeps its own base id.
    pub fn edit_structure(&mut self, mut structure: BaseStructure) -> EditOutcome {
        structure.id = self.form.image_structure.id.clone();
        let before = &self.form.image_structure;

        if self.batch.is_some() && is_structural_change(before, &structure) {
            return EditOutcome::Locked;
        }

        let base_id = before.id.as_deref();
        let count = base_id.map_or(0, |id| self.renders.count_for(id));
        let outcome = self.reconciler.propose(before, &structure, base_id, count);

        match outcome {
            EditOutcome::Locked => return outcome,
            EditOutcome::Unchanged => {}
            EditOutcome::Committed | EditOutcome::Prompted { .. } => self.lifecycle.note_edit(),
        }
        self.form.image_structure = structure;
        outcome
    }

    /// Edit the color mapping. Thresholds that cross are pushed apart.
    pub fn edit_colors(&mut self, colors: ColorParams) {
        let step = self.config.threshold_step;
        let old = &self.form.image_color;
        let (back, middle) = (colors.back_threshold, colors.middle_threshold);

        let mut next = ColorParams {
            back_threshold: old.back_threshold,
            middle_threshold: old.middle_threshold,
            ..colors
        };
        if back != old.back_threshold {
            next.set_back_threshold(back, step);
        }
        if middle != old.middle_threshold {
            next.set_middle_threshold(middle, step);
        }

        if is_cosmetic_change(old, &next) {
            self.lifecycle.note_edit();
            self.form.image_color = next;
        }
    }

    pub fn set_back_threshold(&mut self, value: f64) {
        let colors = ColorParams {
            back_threshold: value,
            ..self.form.image_color.clone()
        };
        self.edit_colors(colors);
    }

    pub fn set_middle_threshold(&mut self, value: f64) {
        let colors = ColorParams {
            middle_threshold: value,
            ..self.form.image_color.clone()
        };
        self.edit_colors(colors);
    }

    /// Names do not affect the image, so the built snapshot follows along.
    pub fn edit_name(&mut self, name: Option<String>) {
        self.form.name = name;
        self.lifecycle
            .relabel(self.form.name.clone(), self.form.description.clone());
    }

    pub fn edit_description(&mut self, description: Option<String>) {
        self.form.description = description;
        self.lifecycle
            .relabel(self.form.name.clone(), self.form.description.clone());
    }

    // ---------------------------------------------------------------
    // Structural decision
    // ---------------------------------------------------------------

    pub fn decide(&mut self, decision: Decision) {
        let Some(base_id) = self.reconciler.pending().map(|p| p.base_id.clone()) else {
            tracing::debug!(?decision, "no structural decision pending");
            return;
        };
        let affected = self.renders.renders_for(&base_id).to_vec();
        let Some(resolution) = self.reconciler.resolve(decision, &affected) else {
            return;
        };
        if let Some(before) = resolution.restore {
            self.form.image_structure = before;
            self.lifecycle.resync(&self.form);
            return;
        }

        let mut batch = RemediationBatch {
            base_id: resolution.base_id,
            decision,
            outstanding: BTreeSet::new(),
            failed: 0,
            touched: BTreeSet::new(),
        };
        for req in resolution.requests {
            let request = self.next_request_id();
            batch.outstanding.insert(request);
            let command = match req {
                Remediation::Delete { render_id } => Command::DeleteRender { request, render_id },
                Remediation::Rate { combined, note } => Command::RateRender {
                    request,
                    sbgb: combined,
                    note,
                },
            };
            self.outbox.push_back(command);
        }
        tracing::info!(
            base_id = %batch.base_id,
            ?decision,
            requests = batch.outstanding.len(),
            "remediation started"
        );

        if batch.outstanding.is_empty() {
            self.complete_batch(batch);
        } else {
            self.batch = Some(batch);
        }
    }

    fn settle(&mut self, request: RequestId, ok: bool, touched: Option<String>) -> bool {
        let Some(batch) = self.batch.as_mut() else {
            return false;
        };
        if !batch.outstanding.remove(&request) {
            return false;
        }
        if !ok {
            batch.failed += 1;
        }
        batch.touched.extend(touched);
        if batch.outstanding.is_empty() {
            if let Some(batch) = self.batch.take() {
                self.complete_batch(batch);
            }
        }
        true
    }

    fn complete_batch(&mut self, batch: RemediationBatch) {
        tracing::info!(
            base_id = %batch.base_id,
            decision = ?batch.decision,
            failed = batch.failed,
            "remediation complete"
        );
        let mut refresh = BTreeSet::from([batch.base_id.clone()]);
        refresh.extend(batch.touched);
        if batch.decision == Decision::Reapply {
            self.outbox.push_back(Command::ListBaseStructures);
        }
        for base_id in refresh {
            self.outbox.push_back(Command::ListRenders { base_id });
        }
        if batch.failed > 0 {
            self.notify(
                NoticeLevel::Error,
                format!("{} of the render updates failed", batch.failed),
            );
        }
    }

    // ---------------------------------------------------------------
    // Build / save / rate
    // ---------------------------------------------------------------

    /// Queue a build of the current form. Returns the token, or `None` when
    /// there is nothing new to build.
    pub fn request_build(&mut self) -> Option<BuildToken> {
        if !self.structure_settled() {
            self.notify(NoticeLevel::Info, UNSETTLED);
            return None;
        }
        if !self.can_build() {
            tracing::debug!("build skipped, already up to date");
            return None;
        }
        let snapshot = self.form.clone();
        let token = self.lifecycle.begin_build(snapshot.clone());
        self.outbox.push_back(Command::BuildPreview {
            token,
            sbgb: snapshot,
        });
        Some(token)
    }

    pub fn build_finished(&mut self, token: BuildToken, result: ServiceResult<Preview>) {
        match result {
            Ok(preview) => {
                if self.lifecycle.finish_build(token, &self.form) == BuildAcceptance::Accepted {
                    let (w, h) = preview.dimensions();
                    tracing::info!(token = token.0, w, h, "preview built");
                    self.preview = Some(preview);
                }
            }
            Err(err) => {
                if self.lifecycle.fail_build(token) == BuildAcceptance::Accepted {
                    tracing::warn!(token = token.0, %err, "build failed");
                    self.notify(NoticeLevel::Error, format!("build failed: {err}"));
                }
            }
        }
    }

    pub fn request_save(&mut self) {
        if !self.structure_settled() {
            self.notify(NoticeLevel::Info, UNSETTLED);
            return;
        }
        if self.saving.is_some() {
            self.notify(NoticeLevel::Info, "a save is already in progress");
            return;
        }
        let Some(plan) = self.lifecycle.save_plan() else {
            self.notify(NoticeLevel::Info, "nothing new to save, build first");
            return;
        };
        if plan.force_update {
            self.overwrite_prompt = Some(plan);
        } else {
            self.issue_save(plan);
        }
    }

    pub fn answer_overwrite(&mut self, confirmed: bool) {
        let Some(plan) = self.overwrite_prompt.take() else {
            return;
        };
        if !confirmed {
            return;
        }
        if !self.structure_settled() {
            self.notify(NoticeLevel::Info, UNSETTLED);
            return;
        }
        self.issue_save(plan);
    }

    fn issue_save(&mut self, plan: SavePlan) {
        let request = self.next_request_id();
        self.saving = Some(request);
        self.outbox.push_back(Command::Save {
            request,
            sbgb: plan.sbgb,
            force_update: plan.force_update,
        });
    }

    /// Store response to a save. Ignored unless it answers the save still
    /// being tracked; loading another Sbgb stops tracking.
    pub fn saved(&mut self, request: RequestId, result: ServiceResult<Sbgb>) {
        if self.saving.take_if(|r| *r == request).is_none() {
            tracing::debug!(request = request.0, "discarding stale save response");
            return;
        }
        match result {
            Ok(saved) => {
                tracing::info!(id = ?saved.id, "saved");
                self.form.id = saved.id.clone();
                self.form.image_structure.id = saved.image_structure.id.clone();
                let base_id = saved.base_id().map(str::to_string);
                self.lifecycle.mark_saved(saved);
                self.outbox.push_back(Command::ListBaseStructures);
                if let Some(base_id) = base_id {
                    self.outbox.push_back(Command::ListRenders { base_id });
                }
                self.notify(NoticeLevel::Info, "saved");
            }
            Err(err) => {
                tracing::warn!(%err, "save failed");
                self.notify(NoticeLevel::Error, format!("save failed: {err}"));
            }
        }
    }

    /// Persist the built snapshot with a rating.
    pub fn request_rate(&mut self, note: u8) {
        if !self.structure_settled() {
            self.notify(NoticeLevel::Info, UNSETTLED);
            return;
        }
        if !self.config.note_in_range(note) {
            self.notify(
                NoticeLevel::Error,
                format!(
                    "rating must be between {} and {}",
                    self.config.min_note, self.config.max_note
                ),
            );
            return;
        }
        let Some(sbgb) = self.lifecycle.last_built().filter(|_| self.can_download()).cloned() else {
            self.notify(NoticeLevel::Info, "build the current settings before rating");
            return;
        };
        let request = self.next_request_id();
        self.outbox.push_back(Command::RateRender { request, sbgb, note });
    }

    pub fn render_rated(&mut self, request: RequestId, result: ServiceResult<CosmeticRender>) {
        let touched = result.as_ref().ok().map(|r| r.base_structure_id.clone());
        if let Err(err) = &result {
            tracing::warn!(request = request.0, %err, "rate failed");
            self.notify(NoticeLevel::Error, format!("rating failed: {err}"));
        }
        if self.settle(request, result.is_ok(), touched) {
            return;
        }
        if let Ok(render) = result {
            tracing::info!(id = ?render.id, base = %render.base_structure_id, "render rated");
            self.renders.push(render);
        }
    }

    // ---------------------------------------------------------------
    // Render collection
    // ---------------------------------------------------------------

    pub fn load_renders(&mut self, base_id: String) {
        self.outbox.push_back(Command::ListRenders { base_id });
    }

    pub fn request_delete(&mut self, render_id: String) {
        let request = self.next_request_id();
        self.outbox.push_back(Command::DeleteRender { request, render_id });
    }

    pub fn render_deleted(&mut self, request: RequestId, render_id: String, result: ServiceResult<()>) {
        match &result {
            Ok(()) => {
                tracing::info!(%render_id, "render deleted");
                self.renders.remove(&render_id);
            }
            Err(err) => {
                tracing::warn!(%render_id, %err, "delete failed");
                self.notify(
                    NoticeLevel::Error,
                    format!("could not delete render {render_id}: {err}"),
                );
            }
        }
        self.settle(request, result.is_ok(), None);
    }

    /// Load a saved render with its base into the form and build it.
    pub fn select_render(&mut self, render_id: &str) {
        let Some(render) = self.renders.find(render_id).cloned() else {
            self.notify(NoticeLevel::Error, format!("unknown render {render_id}"));
            return;
        };
        let Some(base) = self
            .bases
            .iter()
            .find(|b| b.id.as_deref() == Some(render.base_structure_id.as_str()))
            .cloned()
        else {
            self.notify(
                NoticeLevel::Error,
                format!("base structure {} is not loaded", render.base_structure_id),
            );
            return;
        };
        if self.load(Sbgb::from_render(&base, &render)) {
            self.request_build();
        }
    }

    /// Replace the session with a stored Sbgb. Refused while a structural
    /// decision or its remediation is open.
    pub fn load(&mut self, sbgb: Sbgb) -> bool {
        if self.reconciler.is_pending() || self.batch.is_some() {
            self.notify(
                NoticeLevel::Info,
                "finish the pending structure change before loading another image",
            );
            return false;
        }
        self.form = sbgb.clone();
        self.preview = None;
        self.overwrite_prompt = None;
        if let Some(request) = self.saving.take() {
            tracing::debug!(request = request.0, "save response will be ignored after load");
        }
        if let Some(base_id) = sbgb.base_id() {
            self.outbox.push_back(Command::ListRenders {
                base_id: base_id.to_string(),
            });
        }
        self.lifecycle.load(sbgb);
        true
    }

    pub fn bases_listed(&mut self, result: ServiceResult<Vec<BaseStructure>>) {
        match result {
            Ok(bases) => self.bases = bases,
            Err(err) => self.service_failed("could not list base structures", err),
        }
    }

    pub fn renders_listed(&mut self, base_id: String, result: ServiceResult<Vec<CosmeticRender>>) {
        match result {
            Ok(renders) => {
                tracing::debug!(%base_id, count = renders.len(), "renders loaded");
                self.renders.replace_group(&base_id, renders);
            }
            Err(err) => self.service_failed("could not load renders", err),
        }
    }

    // ---------------------------------------------------------------
    // Notices
    // ---------------------------------------------------------------

    pub fn dismiss(&mut self, id: u64) {
        self.notices.retain(|n| n.id != id);
    }

    fn service_failed(&mut self, what: &str, err: ServiceError) {
        tracing::warn!(%err, "{what}");
        self.notify(NoticeLevel::Error, format!("{what}: {err}"));
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.next_notice += 1;
        self.notices.push(Notice {
            id: self.next_notice,
            level,
            text: text.into(),
        });
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }
}
