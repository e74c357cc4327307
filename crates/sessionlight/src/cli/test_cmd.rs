//! `test` subcommand: show colors directly, bypassing session state.

use std::time::Duration;

use super::{
    ApplyJson, Context, Controller, ModeTag, Result, SessionlightError, TestStepJson,
    describe_apply, lock_busy, print_json,
};

pub(super) const PAIR_PAUSE_MS: u64 = 2_000;

/// Named bright/dim pairs.
const PAIRS: [(&str, [ModeTag; 2]); 3] = [
    ("green", [ModeTag::Ready, ModeTag::DimGreen]),
    ("yellow", [ModeTag::Split, ModeTag::DimSplit]),
    ("pink", [ModeTag::Question, ModeTag::DimQuestion]),
];

/// Modes to show for `target`, in order.
fn test_sequence(target: &str) -> Option<Vec<ModeTag>> {
    let needle = target.trim();
    if let Some((_, pair)) = PAIRS.iter().find(|(name, _)| name.eq_ignore_ascii_case(needle)) {
        return Some(pair.to_vec());
    }
    needle.parse::<ModeTag>().ok().map(|m| vec![m])
}

pub(super) fn cmd_test(target: &str, pause: Duration, ctx: &Context) -> Result<()> {
    let sequence = test_sequence(target).ok_or_else(|| {
        let pairs: Vec<&str> = PAIRS.iter().map(|(name, _)| *name).collect();
        SessionlightError::Config(format!(
            "unknown test target '{target}' (expected a mode or one of: {})",
            pairs.join(", ")
        ))
    })?;
    let config = ctx.load_config()?;
    let mut controller = Controller::from_config(&config, None)?;

    let mut steps = Vec::with_capacity(sequence.len());
    for (i, mode) in sequence.into_iter().enumerate() {
        if i > 0 {
            if !ctx.json {
                println!("waiting {}ms...", pause.as_millis());
            }
            std::thread::sleep(pause);
        }
        let outcome = controller.show(mode).ok_or_else(lock_busy)?;
        if !ctx.json {
            println!("{mode}: {}", describe_apply(&outcome));
        }
        steps.push(TestStepJson {
            mode,
            devices: ApplyJson::from(&outcome),
        });
    }

    if ctx.json {
        print_json(&steps)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_show_bright_then_dim() {
        assert_eq!(
            test_sequence("green"),
            Some(vec![ModeTag::Ready, ModeTag::DimGreen])
        );
        assert_eq!(
            test_sequence("Yellow"),
            Some(vec![ModeTag::Split, ModeTag::DimSplit])
        );
        assert_eq!(
            test_sequence("pink"),
            Some(vec![ModeTag::Question, ModeTag::DimQuestion])
        );
    }

    #[test]
    fn single_modes_parse() {
        assert_eq!(test_sequence("working"), Some(vec![ModeTag::Working]));
        assert_eq!(test_sequence("dim-split"), Some(vec![ModeTag::DimSplit]));
    }

    #[test]
    fn unknown_target_is_none() {
        assert_eq!(test_sequence("purple"), None);
    }
}
