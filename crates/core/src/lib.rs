//! Mock interview session engine.
//!
//! [`InterviewEngine`] is the entry point runtimes use. It composes the
//! conversational [`Interviewer`](interviewer::Interviewer), the session
//! [`LifecycleManager`](lifecycle::LifecycleManager), the idempotent
//! [`FeedbackPipeline`](feedback::FeedbackPipeline) and the pure hint
//! evaluator in [`hints`]. Model access, persistence, time and rate limiting
//! are injected through traits so each can be swapped or mocked.

pub mod clock;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod hints;
pub mod interviewer;
pub mod lifecycle;
pub mod rate_limit;
pub mod scenario;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineBuilder, InterviewEngine, StartedSession};
pub use error::{EngineError, EngineResult};
pub use feedback::FeedbackStatus;
pub use gateway::{ChatRole, ChatTurn, ModelGateway, ScriptedGateway};
pub use hints::{Hint, HintCategory};
pub use lifecycle::{CompletionTrigger, Transition};
pub use rate_limit::{RateLimiter, TokenBucketLimiter, Unlimited};
pub use scenario::{Scenario, ScenarioCatalog, ScenarioSource};
pub use session::{
    Difficulty, Feedback, FeedbackId, InterviewKind, Role, Session, SessionId, SessionStatus,
    Turn, Workspace,
};
pub use store::{InMemoryStore, SessionStore, StoreError};
