//! Mapping from follow-up commands to the button labels the remote job exposes.
//!
//! Labels must match the remote service byte for byte; the lookup in
//! [`super::select_option`] is exact string equality.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ActionKind {
    Upscale,
    Variation,
    Vary,
    ZoomOut,
    Pan,
    Reroll,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Upscale,
        ActionKind::Variation,
        ActionKind::Vary,
        ActionKind::ZoomOut,
        ActionKind::Pan,
        ActionKind::Reroll,
    ];

    pub fn from_command(command: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.command() == command)
    }

    pub fn command(self) -> &'static str {
        match self {
            ActionKind::Upscale => "upscale",
            ActionKind::Variation => "variation",
            ActionKind::Vary => "vary",
            ActionKind::ZoomOut => "zoomout",
            ActionKind::Pan => "pan",
            ActionKind::Reroll => "reroll",
        }
    }

    fn takes_numeric_param(self) -> bool {
        matches!(
            self,
            ActionKind::Upscale | ActionKind::Variation | ActionKind::Vary | ActionKind::Pan
        )
    }

    /// Accepted parameters, for usage messages.
    pub fn domain_hint(self) -> &'static str {
        match self {
            ActionKind::Upscale | ActionKind::Variation => {
                "1, 2, 3 or 4 (top-left, top-right, bottom-left, bottom-right)"
            }
            ActionKind::Vary => "1 (Vary (Strong)) or 2 (Vary (Subtle))",
            ActionKind::ZoomOut => "2x, 1.5x or custom",
            ActionKind::Pan => "1 (⬆️), 2 (⬇️), 3 (⬅️) or 4 (➡️)",
            ActionKind::Reroll => "no parameter",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LabelSpec {
    pub kind: ActionKind,
    pub param: &'static str,
    pub label: &'static str,
}

pub const LABEL_TABLE: &[LabelSpec] = &[
    LabelSpec {
        kind: ActionKind::Upscale,
        param: "1",
        label: "U1",
    },
    LabelSpec {
        kind: ActionKind::Upscale,
        param: "2",
        label: "U2",
    },
    LabelSpec {
        kind: ActionKind::Upscale,
        param: "3",
        label: "U3",
    },
    LabelSpec {
        kind: ActionKind::Upscale,
        param: "4",
        label: "U4",
    },
    LabelSpec {
        kind: ActionKind::Variation,
        param: "1",
        label: "V1",
    },
    LabelSpec {
        kind: ActionKind::Variation,
        param: "2",
        label: "V2",
    },
    LabelSpec {
        kind: ActionKind::Variation,
        param: "3",
        label: "V3",
    },
    LabelSpec {
        kind: ActionKind::Variation,
        param: "4",
        label: "V4",
    },
    LabelSpec {
        kind: ActionKind::Vary,
        param: "1",
        label: "Vary (Strong)",
    },
    LabelSpec {
        kind: ActionKind::Vary,
        param: "2",
        label: "Vary (Subtle)",
    },
    LabelSpec {
        kind: ActionKind::ZoomOut,
        param: "2x",
        label: "Zoom Out 2x",
    },
    LabelSpec {
        kind: ActionKind::ZoomOut,
        param: "1.5x",
        label: "Zoom Out 1.5x",
    },
    LabelSpec {
        kind: ActionKind::ZoomOut,
        param: "custom",
        label: "Custom Zoom",
    },
    // Older releases of the bot accepted high/low.
    LabelSpec {
        kind: ActionKind::ZoomOut,
        param: "high",
        label: "Zoom Out 2x",
    },
    LabelSpec {
        kind: ActionKind::ZoomOut,
        param: "low",
        label: "Zoom Out 1.5x",
    },
    LabelSpec {
        kind: ActionKind::Pan,
        param: "1",
        label: "⬆️",
    },
    LabelSpec {
        kind: ActionKind::Pan,
        param: "2",
        label: "⬇️",
    },
    LabelSpec {
        kind: ActionKind::Pan,
        param: "3",
        label: "⬅️",
    },
    LabelSpec {
        kind: ActionKind::Pan,
        param: "4",
        label: "➡️",
    },
    LabelSpec {
        kind: ActionKind::Reroll,
        param: "",
        label: "🔄",
    },
];

/// A validated follow-up request: which button to press on a prior job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FollowUp {
    pub kind: ActionKind,
    pub label: &'static str,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidActionParam {
    pub kind: ActionKind,
    pub given: Option<String>,
}

impl fmt::Display for InvalidActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.given {
            Some(given) => write!(
                f,
                "invalid {} parameter '{given}'; expected {}",
                self.kind,
                self.kind.domain_hint()
            ),
            None => write!(
                f,
                "missing {} parameter; expected {}",
                self.kind,
                self.kind.domain_hint()
            ),
        }
    }
}

impl std::error::Error for InvalidActionParam {}

impl FollowUp {
    /// Validates `param` against the fixed domain of `kind` and picks the label.
    pub fn resolve(kind: ActionKind, param: Option<&str>) -> Result<Self, InvalidActionParam> {
        let invalid = || InvalidActionParam {
            kind,
            given: param.map(str::to_string),
        };

        let key = if kind == ActionKind::Reroll {
            String::new()
        } else {
            let raw = param.map(str::trim).filter(|value| !value.is_empty());
            let raw = raw.ok_or_else(|| InvalidActionParam { kind, given: None })?;
            normalize_param(kind, raw).ok_or_else(invalid)?
        };

        LABEL_TABLE
            .iter()
            .find(|spec| spec.kind == kind && spec.param == key)
            .map(|spec| FollowUp {
                kind,
                label: spec.label,
            })
            .ok_or_else(invalid)
    }
}

fn normalize_param(kind: ActionKind, raw: &str) -> Option<String> {
    if kind.takes_numeric_param() {
        let index = raw.parse::<f64>().ok()?;
        if index.fract() != 0.0 || !(1.0..=4.0).contains(&index) {
            return None;
        }
        return Some(format!("{}", index as u8));
    }
    Some(raw.to_ascii_lowercase())
}
