pub mod phase;
pub mod rating;
pub mod result_kind;
pub mod storage;

pub use phase::ChallengePhase;
pub use result_kind::ResultKind;
