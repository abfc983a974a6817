pub mod slot_ctx;
pub mod slot_flow;

pub use slot_ctx::SlotCtx;
pub use slot_flow::{SlotFlow, SlotOutcome, SlotState};
