//! Mode tags: what a session reports and what the light shows.
//!
//! Sessions only ever report one of the three *reportable* modes. The arbiter
//! may additionally produce `split`, and the dim follow-up produces one of the
//! three dim variants. Those four are display-only and never stored as a
//! session's own mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeTag {
    Working,
    Ready,
    Question,
    Split,
    DimGreen,
    DimSplit,
    DimQuestion,
}

impl ModeTag {
    /// Every tag, in display order. Device renderings must cover all of them.
    pub const ALL: [ModeTag; 7] = [
        ModeTag::Working,
        ModeTag::Ready,
        ModeTag::Question,
        ModeTag::Split,
        ModeTag::DimGreen,
        ModeTag::DimSplit,
        ModeTag::DimQuestion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModeTag::Working => "working",
            ModeTag::Ready => "ready",
            ModeTag::Question => "question",
            ModeTag::Split => "split",
            ModeTag::DimGreen => "dim-green",
            ModeTag::DimSplit => "dim-split",
            ModeTag::DimQuestion => "dim-question",
        }
    }

    /// Whether a session may report this mode as its own.
    pub fn is_reportable(self) -> bool {
        matches!(self, ModeTag::Working | ModeTag::Ready | ModeTag::Question)
    }

    pub fn is_dim(self) -> bool {
        matches!(
            self,
            ModeTag::DimGreen | ModeTag::DimSplit | ModeTag::DimQuestion
        )
    }

    /// Settled modes are eligible for a delayed dim.
    pub fn is_settled(self) -> bool {
        self.dim_variant().is_some()
    }

    /// The dim rendering of a settled mode. `None` for `working` and for
    /// tags that are already dim.
    pub fn dim_variant(self) -> Option<ModeTag> {
        match self {
            ModeTag::Ready => Some(ModeTag::DimGreen),
            ModeTag::Split => Some(ModeTag::DimSplit),
            ModeTag::Question => Some(ModeTag::DimQuestion),
            _ => None,
        }
    }
}

impl fmt::Display for ModeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = ModeTag::ALL.iter().map(|m| m.as_str()).collect();
        write!(f, "unknown mode '{}' (expected one of: {})", self.0, names.join(", "))
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for ModeTag {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ModeTag::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}
