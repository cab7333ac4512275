//! Engine-level error types.
//!
//! All four variants are recoverable and reported synchronously to the
//! caller; nothing in the engine treats them as fatal. The numeric codes are
//! part of the external command surface and are stable.

/// Errors surfaced by the scheduler, the optimistic write layer, and system
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The bookkeeping component is absent or malformed, or its `systems`
    /// array names a system that was never registered.
    #[error("invalid `lightningd:systems`: {reason}")]
    InvalidSystemsComponent {
        /// What exactly was wrong with the bookkeeping data.
        reason: String,
    },

    /// The bookkeeping component is well-formed but no system currently
    /// matches the entity.
    #[error("no systems match, cannot advance")]
    NotAdvanceable,

    /// An optimistic `expected` check did not hold; no writes were applied.
    #[error("validation of expected components failed")]
    UnexpectedComponents,

    /// A system was re-registered under the same name with different
    /// predicates.
    #[error("conflict with existing system: {system}")]
    RegistrationConflict {
        /// The offending system name.
        system: String,
    },
}

impl EcsError {
    /// The stable numeric error code carried over the command surface.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            EcsError::InvalidSystemsComponent { .. } => 2200,
            EcsError::NotAdvanceable => 2201,
            EcsError::UnexpectedComponents => 2244,
            // Registration conflicts are parameter errors, JSON-RPC style.
            EcsError::RegistrationConflict { .. } => -32602,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let invalid = EcsError::InvalidSystemsComponent {
            reason: "missing".into(),
        };
        assert_eq!(invalid.code(), 2200);
        assert_eq!(EcsError::NotAdvanceable.code(), 2201);
        assert_eq!(EcsError::UnexpectedComponents.code(), 2244);
        let conflict = EcsError::RegistrationConflict {
            system: "sys1".into(),
        };
        assert_eq!(conflict.code(), -32602);
    }

    #[test]
    fn test_display_mentions_reason() {
        let e = EcsError::InvalidSystemsComponent {
            reason: "`systems` array contains unregistered system: x".into(),
        };
        assert!(e.to_string().contains("unregistered system: x"));
    }
}
