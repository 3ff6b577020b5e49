mod answers;
mod question;
mod state;

pub use answers::AnswerSheet;
pub use question::Question;
pub use state::{DEFAULT_FAILURE_MESSAGE, ProcessingMachine, ProcessingState, Transition};
