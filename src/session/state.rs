//! Capture session states.

/// Where a session is in its capture cycle.
///
/// `Idle → PreviewStarting → Locking → Capturing → Idle`, with `Locking`
/// only on the first capture. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for a capture request.
    Idle,
    /// Routing the preview to the offscreen target.
    PreviewStarting,
    /// Waiting for AE/AWB to settle, then locking them.
    Locking,
    /// Issuing the capture request.
    Capturing,
    /// Device released.
    Closed,
}

impl SessionState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, PreviewStarting)
                | (PreviewStarting, Locking)
                | (PreviewStarting, Capturing)
                | (Locking, Capturing)
                | (Capturing, Idle)
                | (Idle | PreviewStarting | Locking | Capturing, Closed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PreviewStarting => "preview-starting",
            Self::Locking => "locking",
            Self::Capturing => "capturing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_cycle() {
        use SessionState::*;
        assert!(Idle.can_transition_to(PreviewStarting));
        assert!(PreviewStarting.can_transition_to(Locking));
        assert!(PreviewStarting.can_transition_to(Capturing));
        assert!(Locking.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Idle));
    }

    #[test]
    fn test_closed_is_terminal() {
        use SessionState::*;
        for next in [Idle, PreviewStarting, Locking, Capturing, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
        assert!(Idle.can_transition_to(Closed));
    }

    #[test]
    fn test_no_skipping_preview() {
        assert!(!SessionState::Idle.can_transition_to(SessionState::Capturing));
    }
}
