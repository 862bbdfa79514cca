//! 계층 간 동기화와 백업.
//!
//! ```text
//! Primary ──RefreshCache──> Cache ──IncrementalBackup──> Backup
//!    └──────────FullBackup────────────────────────────────┘
//!                           Cache <──RestoreCache─────── Backup
//! ```

pub mod backup;
pub mod engine;
pub mod schedule;
pub mod task;

pub use backup::{checksum, BackupManager, BackupManifest, BackupType, RestoreReport};
pub use engine::{SyncEngine, SystemStatus};
pub use schedule::{BackupSchedule, LastRuns};
pub use task::{DataTier, QueuedTask, SyncTask, TaskKind, TaskState};
