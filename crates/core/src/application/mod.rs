// Application Layer - Sequence execution, builders and run lifecycle

pub mod aggregator;
pub mod builders;
pub mod cancel;
pub mod classifier;
pub mod constants;
pub mod extractor;
pub mod known_failures;
pub mod poller;
pub mod runner;
pub mod sequence;
pub mod template;

// Re-exports
pub use aggregator::{AggregateReport, ChildOutcome, ChildTaskAggregator};
pub use builders::{FaultBuilder, ResolvedFault};
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use classifier::{classify, Classification};
pub use poller::{poll_until, PollPolicy, PollResult, PollStep};
pub use runner::{ChildRegistry, FaultRunReport, FaultRunner};
pub use sequence::{SequenceExecutor, SequenceFailure, SequenceResult, SequenceStatus};
