//! Draft/publish reconciliation for booking-request rows.
//!
//! The content store may hold one logical document as two rows, a draft
//! (`published_at` null) and a published one. After every insert, whichever
//! code path performed it, this reconciliation keeps at most one live row per
//! document: published always wins. Running it twice on the same state is a
//! no-op, and it tolerates either insertion order.

use crate::store::{BookingStore, StoreError};
use chrono::{DateTime, Utc};

/// Reconciles after an insert. Failures are logged, never propagated: the
/// original insert must not fail because cleanup did.
pub async fn reconcile_after_create(
    store: &dyn BookingStore,
    id: i64,
    document_id: &str,
    published_at: Option<DateTime<Utc>>,
) {
    if document_id.is_empty() {
        return;
    }
    if let Err(e) = run(store, id, document_id, published_at).await {
        tracing::error!(
            booking_id = id,
            document_id,
            error = %e,
            "booking request dedup failed"
        );
    }
}

async fn run(
    store: &dyn BookingStore,
    id: i64,
    document_id: &str,
    published_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    // Published row inserted: drop every draft sibling.
    if published_at.is_some() {
        let deleted = store.delete_draft_siblings(document_id, id).await?;
        if deleted > 0 {
            tracing::info!(
                booking_id = id,
                document_id,
                deleted,
                "dedup: published row superseded draft siblings"
            );
        }
        return Ok(());
    }

    // Draft row inserted: if a published sibling already exists the draft is
    // redundant, delete it.
    if let Some(sibling_id) = store.find_published_sibling(document_id).await? {
        if sibling_id != id {
            store.delete_booking(id).await?;
            tracing::info!(
                booking_id = id,
                document_id,
                published_sibling = sibling_id,
                "dedup: dropped draft shadowed by published row"
            );
        }
    }
    Ok(())
}
