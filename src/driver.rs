//! Runs editor commands against real services.
//!
//! Each command becomes one task on a `JoinSet`, so requests proceed
//! concurrently and finish in whatever order the services answer. Every
//! completion is turned back into an [`Event`] for the editor.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::editor::{Command, Editor, Event};
use crate::preview::Preview;
use crate::service::{PreviewService, StoreService};

pub struct Driver<S> {
    services: Arc<S>,
    tasks: JoinSet<Event>,
}

impl<S> Driver<S>
where
    S: PreviewService + StoreService,
{
    pub fn new(services: Arc<S>) -> Self {
        Self {
            services,
            tasks: JoinSet::new(),
        }
    }

    /// Number of requests still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start every command the editor has queued.
    pub fn dispatch(&mut self, editor: &mut Editor) {
        for command in editor.take_commands() {
            let services = Arc::clone(&self.services);
            self.tasks
                .spawn(async move { execute(services.as_ref(), command).await });
        }
    }

    /// Wait for the next request to finish and feed its outcome back.
    /// Returns `false` once nothing is left in flight.
    pub async fn step(&mut self, editor: &mut Editor) -> bool {
        self.dispatch(editor);
        match self.tasks.join_next().await {
            None => false,
            Some(Ok(event)) => {
                editor.handle(event);
                self.dispatch(editor);
                true
            }
            Some(Err(err)) => {
                tracing::error!(%err, "service task did not complete");
                true
            }
        }
    }

    /// Drive until every request, including follow-ups, has completed.
    pub async fn run_until_idle(&mut self, editor: &mut Editor) {
        while self.step(editor).await {}
    }
}

/// Perform one command and describe its outcome as an event.
pub async fn execute<S>(services: &S, command: Command) -> Event
where
    S: PreviewService + StoreService,
{
    match command {
        Command::BuildPreview { token, sbgb } => {
            tracing::debug!(token = token.0, "building preview");
            let result = services.build_preview(sbgb).await.and_then(Preview::decode);
            Event::BuildFinished { token, result }
        }
        Command::ListBaseStructures => Event::BasesListed {
            result: services.list_base_structures().await,
        },
        Command::ListRenders { base_id } => {
            let result = services.list_renders_for_base(base_id.clone()).await;
            Event::RendersListed { base_id, result }
        }
        Command::Save {
            request,
            sbgb,
            force_update,
        } => Event::Saved {
            request,
            result: services.create_or_update_base(sbgb, force_update).await,
        },
        Command::RateRender { request, sbgb, note } => Event::RenderRated {
            request,
            result: services.rate_render(sbgb, note).await,
        },
        Command::DeleteRender { request, render_id } => {
            let result = services.delete_render(render_id.clone()).await;
            Event::RenderDeleted {
                request,
                render_id,
                result,
            }
        }
    }
}
