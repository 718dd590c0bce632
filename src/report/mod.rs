pub mod assembler;
pub mod format;
pub mod notifier;

pub use assembler::{FailureReport, WeeklyReport};
pub use notifier::FeishuNotifier;
