pub mod reconciler;

pub use reconciler::{start_score_reconciler, ReconcilerConfig};
