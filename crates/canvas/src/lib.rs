//! `dc-canvas`: code extraction, execution orchestration and the AI fix
//! loop behind the DataChat canvas.
//!
//! * [`CodeBlockExtractor`] turns assistant messages into [`CodeEntry`]s.
//! * [`ExecutionCoordinator`] owns the canvas and auto-runs code when a turn
//!   completes.
//! * [`FixLoopController`] and [`AssistController`] apply AI patches behind
//!   the credit gate.
//!
//! [`CodeEntry`]: dc_domain::code::CodeEntry

pub mod assist;
pub mod attempts;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod extractor;
pub mod fix_loop;
pub mod run_guard;
pub mod view;

pub use assist::{AssistController, AssistOutcome};
pub use attempts::FixAttemptCounter;
pub use coordinator::{CanvasSnapshot, CoordinatorState, ExecutionCoordinator, TurnOutcome};
pub use error::CanvasError;
pub use events::{CanvasEvent, EventBus, NoticeLevel};
pub use extractor::{CodeBlockExtractor, Fragment};
pub use fix_loop::{FixAvailability, FixLoopController, FixOutcome};
pub use run_guard::RunLockMap;
pub use view::CanvasViewModel;
