//! Audit and soft-delete bookkeeping shared by every entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who created and last changed an entity, and when.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditInfo {
    pub creator: Option<String>,
    pub date_created: DateTime<Utc>,
    pub changed_by: Option<String>,
    pub date_changed: Option<DateTime<Utc>>,
}

impl Default for AuditInfo {
    fn default() -> Self {
        Self {
            creator: None,
            date_created: Utc::now(),
            changed_by: None,
            date_changed: None,
        }
    }
}

/// Soft-delete state for clinical data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoidInfo {
    pub voided: bool,
    pub voided_by: Option<String>,
    pub date_voided: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
}

impl VoidInfo {
    /// Marks the entity voided.
    ///
    /// Returns `false` without touching anything if it was already voided.
    pub fn void(&mut self, reason: &str) -> bool {
        if self.voided {
            return false;
        }
        self.voided = true;
        self.date_voided = Some(Utc::now());
        self.void_reason = Some(reason.to_owned());
        true
    }

    /// Clears the void state. Returns `false` if the entity was not voided.
    pub fn unvoid(&mut self) -> bool {
        if !self.voided {
            return false;
        }
        *self = Self::default();
        true
    }
}

/// Soft-delete state for metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetireInfo {
    pub retired: bool,
    pub retired_by: Option<String>,
    pub date_retired: Option<DateTime<Utc>>,
    pub retire_reason: Option<String>,
}

impl RetireInfo {
    /// Marks the entity retired. Returns `false` if it was already retired.
    pub fn retire(&mut self, reason: &str) -> bool {
        if self.retired {
            return false;
        }
        self.retired = true;
        self.date_retired = Some(Utc::now());
        self.retire_reason = Some(reason.to_owned());
        true
    }

    pub fn unretire(&mut self) -> bool {
        if !self.retired {
            return false;
        }
        *self = Self::default();
        true
    }
}

/// Entities whose removal is a reversible void.
pub trait Voidable {
    fn void_info(&self) -> &VoidInfo;
    fn void_info_mut(&mut self) -> &mut VoidInfo;

    fn is_voided(&self) -> bool {
        self.void_info().voided
    }
}

/// Entities whose removal is a reversible retire.
pub trait Retireable {
    fn retire_info(&self) -> &RetireInfo;
    fn retire_info_mut(&mut self) -> &mut RetireInfo;

    fn is_retired(&self) -> bool {
        self.retire_info().retired
    }
}

macro_rules! voidable {
    ($($ty:ty => $($field:ident).+),* $(,)?) => {
        $(impl $crate::audit::Voidable for $ty {
            fn void_info(&self) -> &$crate::audit::VoidInfo {
                &self.$($field).+
            }
            fn void_info_mut(&mut self) -> &mut $crate::audit::VoidInfo {
                &mut self.$($field).+
            }
        })*
    };
}

macro_rules! retireable {
    ($($ty:ty),* $(,)?) => {
        $(impl $crate::audit::Retireable for $ty {
            fn retire_info(&self) -> &$crate::audit::RetireInfo {
                &self.retire
            }
            fn retire_info_mut(&mut self) -> &mut $crate::audit::RetireInfo {
                &mut self.retire
            }
        })*
    };
}

pub(crate) use {retireable, voidable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_is_idempotent() {
        let mut info = VoidInfo::default();

        assert!(info.void("duplicate"));
        let first = info.date_voided;
        assert!(!info.void("again"), "second void must be a no-op");
        assert_eq!(info.date_voided, first);
        assert_eq!(info.void_reason.as_deref(), Some("duplicate"));
    }

    #[test]
    fn test_unvoid_clears_state() {
        let mut info = VoidInfo::default();
        info.void("mistake");

        assert!(info.unvoid());
        assert_eq!(info, VoidInfo::default());
        assert!(!info.unvoid());
    }

    #[test]
    fn test_retire_and_unretire() {
        let mut info = RetireInfo::default();

        assert!(info.retire("obsolete"));
        assert!(!info.retire("obsolete"));
        assert!(info.unretire());
        assert!(!info.retired);
    }
}
