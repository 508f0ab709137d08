use std::collections::BTreeMap;
use std::fmt;

use crate::document::Node;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SectionKind {
    Scalar,
    Mapping,
    Records,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Mapping => "mapping",
            Self::Records => "sequence",
        }
    }

    fn accepts(self, value: &Node) -> bool {
        match (self, value) {
            (_, value) if value.is_null() => true,
            (Self::Scalar, Node::Scalar(_)) => true,
            (Self::Mapping, Node::Mapping(_)) => true,
            (Self::Records, Node::Sequence(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    pub kind: SectionKind,
    pub fields: &'static [&'static str],
}

/// Whether a document must carry every section key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotPolicy {
    Required,
    AllowMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaIssue {
    RootNotMapping { found: &'static str },
    MissingSection { section: String },
    WrongShape {
        section: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotMapping { found } => {
                write!(f, "document root must be a mapping, found {found}")
            }
            Self::MissingSection { section } => write!(f, "missing section '{section}'"),
            Self::WrongShape {
                section,
                expected,
                found,
            } => write!(f, "section '{section}' must be a {expected}, found {found}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<SchemaIssue>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>();
        f.write_str(&rendered.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

const CLINICAL_SUMMARY_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        name: "visit motivation",
        kind: SectionKind::Scalar,
        fields: &[],
    },
    SectionSpec {
        name: "admission",
        kind: SectionKind::Records,
        fields: &["reason", "date", "duration", "care center details", "details"],
    },
    SectionSpec {
        name: "patient information",
        kind: SectionKind::Mapping,
        fields: &[
            "age",
            "sex",
            "ethnicity",
            "weight",
            "height",
            "family medical history",
            "recent travels",
            "socio economic context",
            "occupation",
        ],
    },
    SectionSpec {
        name: "patient medical history",
        kind: SectionKind::Mapping,
        fields: &[
            "physiological context",
            "psychological context",
            "vaccination history",
            "allergies",
            "exercise frequency",
            "nutrition",
            "sexual history",
            "alcohol consumption",
            "drug usage",
            "smoking status",
        ],
    },
    SectionSpec {
        name: "surgeries",
        kind: SectionKind::Records,
        fields: &["reason", "Type", "time", "outcome", "details"],
    },
    SectionSpec {
        name: "symptoms",
        kind: SectionKind::Records,
        fields: &[
            "name of symptom",
            "intensity of symptom",
            "location",
            "time",
            "temporalisation",
            "behaviours affecting the symptom",
            "details",
        ],
    },
    SectionSpec {
        name: "medical examinations",
        kind: SectionKind::Records,
        fields: &["name", "result", "details"],
    },
    SectionSpec {
        name: "diagnosis tests",
        kind: SectionKind::Records,
        fields: &["test", "result", "severity", "condition", "time", "details"],
    },
    SectionSpec {
        name: "treatments",
        kind: SectionKind::Records,
        fields: &[
            "name",
            "related condition",
            "dosage",
            "time",
            "frequency",
            "duration",
            "reason for taking",
            "reaction to treatment",
            "details",
        ],
    },
    SectionSpec {
        name: "discharge",
        kind: SectionKind::Mapping,
        fields: &["reason", "referral", "follow up", "discharge summary"],
    },
];

/// Declarative description of the top-level sections a document carries.
#[derive(Debug, Clone)]
pub struct CanonicalSchema {
    sections: Vec<SectionSpec>,
}

impl CanonicalSchema {
    pub fn new(sections: Vec<SectionSpec>) -> Self {
        Self { sections }
    }

    pub fn clinical_summary() -> Self {
        Self::new(CLINICAL_SUMMARY_SECTIONS.to_vec())
    }

    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    pub fn section_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sections.iter().map(|section| section.name)
    }

    pub fn record_sections(&self) -> impl Iterator<Item = &SectionSpec> + '_ {
        self.sections
            .iter()
            .filter(|section| section.kind == SectionKind::Records)
    }

    /// Checks shape only: the root is a mapping, section slots exist and
    /// sections hold the right container kind. Field names inside sections
    /// are never checked.
    pub fn validate(&self, document: &Node, slots: SlotPolicy) -> Result<(), ValidationFailure> {
        let Some(root) = document.as_mapping() else {
            return Err(ValidationFailure {
                issues: vec![SchemaIssue::RootNotMapping {
                    found: document.kind_name(),
                }],
            });
        };

        let mut issues = Vec::<SchemaIssue>::new();
        for section in &self.sections {
            match root.get(section.name) {
                None if slots == SlotPolicy::Required => {
                    issues.push(SchemaIssue::MissingSection {
                        section: section.name.to_string(),
                    });
                }
                None => {}
                Some(value) if !section.kind.accepts(value) => {
                    issues.push(SchemaIssue::WrongShape {
                        section: section.name.to_string(),
                        expected: section.kind.as_str(),
                        found: value.kind_name(),
                    });
                }
                Some(_) => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure { issues })
        }
    }

    /// A document with every section present and every field empty.
    pub fn template(&self) -> Node {
        let entries = self
            .sections
            .iter()
            .map(|section| {
                let value = match section.kind {
                    SectionKind::Scalar => Node::null(),
                    SectionKind::Mapping => Node::Mapping(empty_fields(section.fields)),
                    SectionKind::Records => {
                        Node::Sequence(vec![Node::Mapping(empty_fields(section.fields))])
                    }
                };
                (section.name.to_string(), value)
            })
            .collect::<BTreeMap<String, Node>>();
        Node::Mapping(entries)
    }
}

fn empty_fields(fields: &[&str]) -> BTreeMap<String, Node> {
    fields
        .iter()
        .map(|field| ((*field).to_string(), Node::null()))
        .collect()
}
