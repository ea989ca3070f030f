//! Built-in pattern tables for the supported procedure workflows.
//!
//! Patterns are deliberately permissive: dictation is unstructured, so each
//! field lists several phrasings and the audit step recovers precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::normalize::Normalizer;
use super::patterns::PatternTable;
use crate::pipeline::PipelineError;

type FieldRules = (&'static str, &'static [(&'static str, Normalizer)]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureKind {
    /// Diagnostic coronary angiogram.
    Angiogram,
    /// Percutaneous coronary intervention.
    Pci,
    /// Transcatheter aortic valve implantation workup.
    Tavi,
    RightHeartCath,
}

impl ProcedureKind {
    pub const ALL: [ProcedureKind; 4] = [
        ProcedureKind::Angiogram,
        ProcedureKind::Pci,
        ProcedureKind::Tavi,
        ProcedureKind::RightHeartCath,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcedureKind::Angiogram => "angiogram",
            ProcedureKind::Pci => "pci",
            ProcedureKind::Tavi => "tavi",
            ProcedureKind::RightHeartCath => "right_heart_cath",
        }
    }

    /// Fields that must be present (or human-confirmed) before finalizing.
    pub fn critical_fields(self) -> &'static [&'static str] {
        match self {
            ProcedureKind::Angiogram => &["access.primary", "sheathSizeFr"],
            ProcedureKind::Pci => &["access.primary", "sheathSizeFr", "intervention.vessel"],
            ProcedureKind::Tavi => &["access.primary", "valve.type", "valve.sizeMm"],
            ProcedureKind::RightHeartCath => &["pressures.paMean", "pressures.pcwp"],
        }
    }

    /// Compile this procedure's pattern table.
    pub fn pattern_table(self) -> Result<PatternTable, PipelineError> {
        let groups: &[&[FieldRules]] = match self {
            ProcedureKind::Angiogram => &[ACCESS_FIELDS, ANGIOGRAM_FIELDS],
            ProcedureKind::Pci => &[ACCESS_FIELDS, ANGIOGRAM_FIELDS, PCI_FIELDS],
            ProcedureKind::Tavi => &[ACCESS_FIELDS, TAVI_FIELDS],
            ProcedureKind::RightHeartCath => &[ACCESS_FIELDS, RHC_FIELDS],
        };

        let mut table = PatternTable::new();
        for group in groups {
            for (field, rules) in group.iter() {
                table = table.field(field, rules)?;
            }
        }
        Ok(table)
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcedureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "angiogram" | "angio" | "coronary_angiogram" => Ok(ProcedureKind::Angiogram),
            "pci" | "angioplasty" => Ok(ProcedureKind::Pci),
            "tavi" | "tavr" | "tavi_workup" => Ok(ProcedureKind::Tavi),
            "right_heart_cath" | "rhc" => Ok(ProcedureKind::RightHeartCath),
            other => Err(format!("unknown procedure '{other}'")),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Field tables
// ═══════════════════════════════════════════════════════════

const ACCESS_FIELDS: &[FieldRules] = &[
    (
        "access.primary",
        &[
            (
                r"(?i)\b((?:right|left|rt|lt)\.?\s+(?:distal\s+)?(?:radial|femoral|femural|brachial|ulnar))\b",
                Normalizer::Access,
            ),
            (
                r"(?i)\b(?:access|approach)\s+(?:was\s+)?(?:obtained\s+)?(?:via|through|from)\s+(?:the\s+)?((?:(?:right|left)\s+)?(?:distal\s+)?(?:radial|femoral|brachial|ulnar))",
                Normalizer::Access,
            ),
            (
                r"(?i)\b((?:distal\s+)?(?:radial|femoral|brachial|ulnar))\s+(?:artery\s+)?(?:access|approach|puncture)\b",
                Normalizer::Access,
            ),
            (
                r"(?i)\b((?:right|left)\s+(?:internal\s+)?jugular)\b",
                Normalizer::Access,
            ),
        ],
    ),
    (
        "sheathSizeFr",
        &[
            (
                r"(?i)\b(\d{1,2})\s*-?\s*(?:fr|french|f)\b[^.\n]{0,30}?\bsheath",
                Normalizer::Integer,
            ),
            (
                r"(?i)\bsheath(?:\s+size)?\s*(?:of|was|is|:|-)?\s*(\d{1,2})\b",
                Normalizer::Integer,
            ),
            (r"(?i)\b(\d{1,2})\s*(?:fr|french)\b", Normalizer::Integer),
        ],
    ),
    (
        "access.closure",
        &[(
            r"(?i)\b(tr\s*band|angio-?seal|perclose|proglide|mynx|femostop|manual\s+compression)\b",
            Normalizer::Lowercase,
        )],
    ),
];

const ANGIOGRAM_FIELDS: &[FieldRules] = &[
    (
        "contrastVolumeMl",
        &[
            (
                r"(?i)\b(\d{1,4})\s*(?:ml|mls|cc)\s+(?:of\s+)?(?:contrast|omnipaque|visipaque|iodixanol|iohexol)",
                Normalizer::Integer,
            ),
            (
                r"(?i)\bcontrast(?:\s+volume|\s+used|\s+load)?\s*(?:of|was|:|-|=)?\s*(\d{1,4})\s*(?:ml|mls|cc)?\b",
                Normalizer::Integer,
            ),
        ],
    ),
    (
        "fluoroscopyTimeMin",
        &[(
            r"(?i)\bfluoro(?:scopy)?(?:\s+time)?\s*(?:of|was|:|-|=)?\s*(\d{1,3}(?:\.\d{1,2})?)\s*(?:min|mins|minutes)?\b",
            Normalizer::Float,
        )],
    ),
    (
        "dominance",
        &[
            (r"(?i)\b(right|left|co)[\s-]?dominant\b", Normalizer::Lowercase),
            (r"(?i)\bdominance\s*(?:is|was|:)?\s*(right|left|co)", Normalizer::Lowercase),
        ],
    ),
    (
        "findings.vessels",
        &[(
            r"(?i)\b(?:disease|stenos[ie]s|lesions?)\s+(?:in|of|involving)\s+(?:the\s+)?([a-z0-9 ,/]+?)\s*(?:\.|$)",
            Normalizer::CommaList,
        )],
    ),
    (
        "lvedpMmHg",
        &[(r"(?i)\blvedp\s*(?:was|of|is|:|=)?\s*(\d{1,2})\b", Normalizer::Integer)],
    ),
];

const PCI_FIELDS: &[FieldRules] = &[
    (
        "intervention.vessel",
        &[
            (
                r"(?i)\b(?:stent(?:ed|ing)?|pci|angioplasty|intervention)\s+(?:to|of|in)\s+(?:the\s+)?(?:(?:proximal|mid|distal|ostial)\s+)?(lad|lcx|rca|circumflex|left\s+main|ramus|om\d?|d\d|pda|plv)\b",
                Normalizer::Uppercase,
            ),
            (
                r"(?i)\b(?:proximal|mid|distal|ostial)\s+(lad|lcx|rca|circumflex)\b[^.\n]{0,40}?\bstent",
                Normalizer::Uppercase,
            ),
        ],
    ),
    (
        "intervention.stentDiameterMm",
        &[(
            r"(?i)\b(\d(?:\.\d{1,2})?)\s*(?:mm\s*)?(?:x|×|by)\s*\d{1,2}\s*(?:mm)?",
            Normalizer::Float,
        )],
    ),
    (
        "intervention.stentLengthMm",
        &[(
            r"(?i)\b\d(?:\.\d{1,2})?\s*(?:mm\s*)?(?:x|×|by)\s*(\d{1,2})\s*(?:mm)?",
            Normalizer::Integer,
        )],
    ),
    (
        "intervention.stentType",
        &[(
            r"(?i)\b(xience|synergy|onyx|resolute|orsiro|promus|biofreedom|ultimaster)\b",
            Normalizer::Lowercase,
        )],
    ),
    (
        "intervention.timiPost",
        &[
            (
                r"(?i)\b(?:final|post)[^.\n]{0,30}?\btimi\s*(?:grade\s*)?(?:flow\s*)?([0-3])\b",
                Normalizer::Integer,
            ),
            (r"(?i)\btimi\s*(?:grade\s*)?([0-3])\s+flow\b", Normalizer::Integer),
        ],
    ),
];

const TAVI_FIELDS: &[FieldRules] = &[
    (
        "valve.type",
        &[(
            r"(?i)\b(sapien(?:\s*(?:3|s3|ultra))?|evolut(?:\s*(?:r|pro\+?|fx))?|navitor|acurate(?:\s*neo2?)?|portico|myval)\b",
            Normalizer::Lowercase,
        )],
    ),
    (
        "valve.sizeMm",
        &[
            (
                r"(?i)\b(\d{2})\s*(?:mm)?\s+(?:sapien|evolut|navitor|acurate|portico|myval|valve)\b",
                Normalizer::Integer,
            ),
            (r"(?i)\bvalve\s+size\s*(?:of|was|is|:)?\s*(\d{2})\b", Normalizer::Integer),
        ],
    ),
    (
        "annulus.perimeterMm",
        &[(
            r"(?i)\bannul(?:us|ar)\s+perimeter\s*(?:of|was|is|:|=)?\s*(\d{2,3}(?:\.\d)?)",
            Normalizer::Float,
        )],
    ),
    (
        "annulus.areaMm2",
        &[(
            r"(?i)\bannul(?:us|ar)\s+area\s*(?:of|was|is|:|=)?\s*(\d{3}(?:\.\d)?)",
            Normalizer::Float,
        )],
    ),
    (
        "meanGradientMmHg",
        &[(
            r"(?i)\bmean\s+(?:aortic\s+)?(?:valve\s+)?gradient\s*(?:of|was|is|:|=)?\s*(\d{1,3}(?:\.\d)?)",
            Normalizer::Float,
        )],
    ),
    (
        "aorticValveAreaCm2",
        &[(
            r"(?i)\b(?:ava|aortic\s+valve\s+area)\s*(?:of|was|is|:|=)?\s*(\d(?:\.\d{1,2})?)",
            Normalizer::Float,
        )],
    ),
    (
        "lvefPercent",
        &[(
            r"(?i)\b(?:lvef|ejection\s+fraction|ef)\s*(?:of|was|is|:|=)?\s*(\d{1,2})\s*%?",
            Normalizer::Integer,
        )],
    ),
    (
        "pacing.route",
        &[(
            r"(?i)\b(transvenous|left\s+ventricular\s+wire|lv\s+wire)\s+pacing\b",
            Normalizer::Lowercase,
        )],
    ),
];

const RHC_FIELDS: &[FieldRules] = &[
    (
        "pressures.raMean",
        &[(
            r"(?i)\b(?:ra|right\s+atrial)(?:\s+mean)?(?:\s+pressure)?\s*(?:of|was|is|:|=)?\s*(\d{1,2})\b",
            Normalizer::Integer,
        )],
    ),
    (
        "pressures.paSystolic",
        &[(
            r"(?i)\bpa(?:\s+pressures?)?\s*(?:of|was|were|is|:|=)?\s*(\d{2,3})\s*/\s*\d{1,3}",
            Normalizer::Integer,
        )],
    ),
    (
        "pressures.paDiastolic",
        &[(
            r"(?i)\bpa(?:\s+pressures?)?\s*(?:of|was|were|is|:|=)?\s*\d{2,3}\s*/\s*(\d{1,3})",
            Normalizer::Integer,
        )],
    ),
    (
        "pressures.paMean",
        &[
            (
                r"(?i)\b(?:mean\s+pa|pa\s+mean|mpap)(?:\s+pressure)?\s*(?:of|was|is|:|=)?\s*(\d{1,3})\b",
                Normalizer::Integer,
            ),
            (
                r"(?i)\bpa(?:\s+pressures?)?\s*(?:of|was|were|is|:|=)?\s*\d{2,3}\s*/\s*\d{1,3}\s*(?:\(\s*|,\s*mean\s*)(\d{1,3})",
                Normalizer::Integer,
            ),
        ],
    ),
    (
        "pressures.pcwp",
        &[(
            r"(?i)\b(?:pcwp|pawp|wedge(?:\s+pressure)?)\s*(?:of|was|is|:|=)?\s*(\d{1,2})\b",
            Normalizer::Integer,
        )],
    ),
    (
        "cardiacOutputLMin",
        &[(
            r"(?i)\b(?:cardiac\s+output|co)\s*(?:of|was|is|:|=)?\s*(\d{1,2}(?:\.\d{1,2})?)\s*(?:l/min|l)?\b",
            Normalizer::Float,
        )],
    ),
    (
        "cardiacIndex",
        &[(
            r"(?i)\b(?:cardiac\s+index|ci)\s*(?:of|was|is|:|=)?\s*(\d(?:\.\d{1,2})?)\b",
            Normalizer::Float,
        )],
    ),
];
