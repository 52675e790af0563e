pub mod analysis;
pub mod clock;
pub mod fen;
pub mod history;
pub mod notation;
pub mod pgn;
pub mod queue;
pub mod rules;
pub mod step;
pub mod types;

pub use analysis::{Bound, EvaluationRecord, Score};
pub use clock::{BoardTimer, ClockReading, ClockReconciler, MoveOrigin};
pub use fen::FenError;
pub use history::{HistoryError, MoveHistory, VariationHandle, VariationState};
pub use pgn::{Labeller, MoveLabel, PgnError, PgnHeaders};
pub use queue::{PendingMove, QueueError, ReconnectMoveQueue};
pub use rules::{CozyRules, MoveOutcome, RulesEngine, RulesError};
pub use step::{ChatAnnotation, Step};
pub use types::{BoardId, Clocks, Color, GameStatus, PlyIndex, SessionMode, UnknownStatus};
