//! Merge every live session's mode into the one mode the light shows.
//!
//! Strict priority, not a vote:
//!
//! 1. no live sessions → `ready`
//! 2. the reporting session is `working` → `working`
//! 3. any live session `working` → `split`
//! 4. any live session `question` → `question`
//! 5. otherwise → `ready`
//!
//! The dim follow-up passes `None` as the reporter, which skips rule 2.

use crate::mode::ModeTag;
use crate::state::SessionRegistry;

pub fn effective_mode(registry: &SessionRegistry, just_reported: Option<ModeTag>) -> ModeTag {
    if registry.is_empty() {
        return ModeTag::Ready;
    }
    if just_reported == Some(ModeTag::Working) {
        return ModeTag::Working;
    }
    if registry.modes().any(|m| m == ModeTag::Working) {
        return ModeTag::Split;
    }
    if registry.modes().any(|m| m == ModeTag::Question) {
        return ModeTag::Question;
    }
    ModeTag::Ready
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(modes: &[ModeTag]) -> SessionRegistry {
        let mut r = SessionRegistry::default();
        for (i, &mode) in modes.iter().enumerate() {
            r.upsert(&format!("s{i}"), mode, 1_000);
        }
        r
    }

    #[test]
    fn empty_registry_is_ready() {
        assert_eq!(effective_mode(&registry(&[]), None), ModeTag::Ready);
        // Rule 1 precedes rule 2
        assert_eq!(
            effective_mode(&registry(&[]), Some(ModeTag::Working)),
            ModeTag::Ready
        );
    }

    #[test]
    fn working_reporter_always_wins() {
        for others in [
            vec![ModeTag::Working],
            vec![ModeTag::Working, ModeTag::Question],
            vec![ModeTag::Working, ModeTag::Ready, ModeTag::Ready],
        ] {
            assert_eq!(
                effective_mode(&registry(&others), Some(ModeTag::Working)),
                ModeTag::Working
            );
        }
    }

    #[test]
    fn any_other_working_session_means_split() {
        let r = registry(&[
            ModeTag::Working,
            ModeTag::Ready,
            ModeTag::Ready,
            ModeTag::Question,
        ]);
        assert_eq!(effective_mode(&r, Some(ModeTag::Ready)), ModeTag::Split);
        assert_eq!(effective_mode(&r, Some(ModeTag::Question)), ModeTag::Split);
        assert_eq!(effective_mode(&r, None), ModeTag::Split);
    }

    #[test]
    fn question_beats_ready() {
        let r = registry(&[ModeTag::Ready, ModeTag::Question, ModeTag::Ready]);
        assert_eq!(effective_mode(&r, Some(ModeTag::Ready)), ModeTag::Question);
    }

    #[test]
    fn all_ready_is_ready() {
        let r = registry(&[ModeTag::Ready, ModeTag::Ready]);
        assert_eq!(effective_mode(&r, Some(ModeTag::Ready)), ModeTag::Ready);
        assert_eq!(effective_mode(&r, None), ModeTag::Ready);
    }

    #[test]
    fn lone_working_session_without_reporter_is_split() {
        // Dim path: nobody "just reported", so a working session reads as split
        let r = registry(&[ModeTag::Working]);
        assert_eq!(effective_mode(&r, None), ModeTag::Split);
    }
}
