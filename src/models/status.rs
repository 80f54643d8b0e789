use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl QueueItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueItemStatus::Completed | QueueItemStatus::Failed)
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl Display for QueueItemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            QueueItemStatus::Pending => write!(f, "pending"),
            QueueItemStatus::Processing => write!(f, "processing"),
            QueueItemStatus::Completed => write!(f, "completed"),
            QueueItemStatus::Failed => write!(f, "failed"),
            QueueItemStatus::Retry => write!(f, "retry"),
        }
    }
}
