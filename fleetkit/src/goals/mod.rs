//! Dynamic event goal handling: the submission lifecycle, the
//! parallel-behavior conflict policy, and the end-event guard.

pub mod end_guard;
pub mod lifecycle;
pub mod policy;

pub use end_guard::EndEventGuard;
pub use lifecycle::{
    ControlKind, GoalCompletion, GoalLifecycleManager, GoalSubmission, RobotSnapshot,
};
pub use policy::ParallelBehavior;
