//! Contracts of the external rendering service and store.
//!
//! Both live behind an HTTP request/response boundary elsewhere; the editor
//! only needs these calls. Futures are `Send` so the driver can run them on
//! a `JoinSet`.

use std::future::Future;

use crate::error::ServiceResult;
use crate::model::{BaseStructure, CosmeticRender, Sbgb};

pub trait PreviewService: Send + Sync + 'static {
    /// Synthesize an image from structure + colors. Returns the encoded image bytes.
    fn build_preview(&self, sbgb: Sbgb) -> impl Future<Output = ServiceResult<Vec<u8>>> + Send;
}

pub trait StoreService: Send + Sync + 'static {
    fn list_base_structures(&self) -> impl Future<Output = ServiceResult<Vec<BaseStructure>>> + Send;

    fn list_renders_for_base(
        &self,
        base_id: String,
    ) -> impl Future<Output = ServiceResult<Vec<CosmeticRender>>> + Send;

    /// Create a new base+render pair, or update in place when `force_update`.
    fn create_or_update_base(
        &self,
        sbgb: Sbgb,
        force_update: bool,
    ) -> impl Future<Output = ServiceResult<Sbgb>> + Send;

    /// Persist one base + cosmetics + rating combination.
    fn rate_render(&self, sbgb: Sbgb, note: u8) -> impl Future<Output = ServiceResult<CosmeticRender>> + Send;

    fn delete_render(&self, render_id: String) -> impl Future<Output = ServiceResult<()>> + Send;
}
