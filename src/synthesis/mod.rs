// src/synthesis/mod.rs
pub mod digest;
pub mod gatherer;
pub mod pipeline;
pub mod resynthesis;
pub mod scheduler;
pub mod selector;
pub mod tracker;
pub mod types;

use metrics::describe_counter;
use once_cell::sync::OnceCell;

pub use pipeline::{SynthesisSink, TopicSynthesisPipeline};
pub use resynthesis::EpochContext;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "synthesis_epochs_opened_total",
            "Gathering windows opened after the epoch guards passed."
        );
        describe_counter!(
            "synthesis_candidates_rejected_total",
            "Candidates refused at admission."
        );
        describe_counter!(
            "synthesis_outputs_total",
            "Synthesis records emitted, labelled by whether the window timed out."
        );
    });
}
