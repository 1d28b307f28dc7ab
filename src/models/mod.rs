pub mod assessment;
pub mod audit;
pub mod enums;
pub mod events;
pub mod notification;
pub mod snapshot;
pub mod triage;

pub use assessment::*;
pub use audit::AuditEntry;
pub use enums::*;
pub use events::{PendingChangeEvent, RejectedChange};
pub use notification::RiskChangeNotification;
pub use snapshot::*;
pub use triage::{PriorityOverride, TriageQueueEntry};
