//! Column resolution: maps spreadsheet headers to canonical fields.
//!
//! Uploaded inventories never agree on header spelling ("Título",
//! "Titulo", "DataOwner_Lgobierno", "Data Owner", ...). Each canonical
//! [`Field`] carries a list of patterns; headers and patterns are folded
//! (lower-case, accents removed, separators dropped) and the first header
//! in sheet order containing a pattern wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// A canonical report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Domain,
    Owner,
    Stewards,
    Workspace,
    Responsible,
    Visible,
    Endorsement,
    SealTechnical,
    SealBusiness,
    SealSecurity,
    EmailSent,
    SentDate,
    CommitmentDate,
}

impl Field {
    /// Every field, in resolution order. Earlier fields claim headers first.
    pub const ALL: [Field; 14] = [
        Field::Title,
        Field::Domain,
        Field::Owner,
        Field::Stewards,
        Field::Workspace,
        Field::Responsible,
        Field::Visible,
        Field::Endorsement,
        Field::SealTechnical,
        Field::SealBusiness,
        Field::SealSecurity,
        Field::EmailSent,
        Field::SentDate,
        Field::CommitmentDate,
    ];

    /// Fields every upload must carry.
    pub const BASE: [Field; 3] = [Field::Title, Field::Domain, Field::Owner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Domain => "domain",
            Self::Owner => "owner",
            Self::Stewards => "stewards",
            Self::Workspace => "workspace",
            Self::Responsible => "responsible",
            Self::Visible => "visible",
            Self::Endorsement => "endorsement",
            Self::SealTechnical => "seal_technical",
            Self::SealBusiness => "seal_business",
            Self::SealSecurity => "seal_security",
            Self::EmailSent => "email_sent",
            Self::SentDate => "sent_date",
            Self::CommitmentDate => "commitment_date",
        }
    }

    /// Substrings (pre-folded) that identify this field's header.
    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Title => &["titulo", "nombrereporte"],
            Self::Domain => &["dominio", "areadatos"],
            Self::Owner => &["dataowner", "owner", "responsableemail"],
            Self::Stewards => &["steward"],
            Self::Workspace => &["workspace"],
            Self::Responsible => &["responsable"],
            Self::Visible => &["visible"],
            Self::Endorsement => &["endorsement"],
            Self::SealTechnical => &["sellotecnico"],
            Self::SealBusiness => &["sellonegocio"],
            Self::SealSecurity => &["selloseguridad"],
            Self::EmailSent => &["correoenviado"],
            Self::SentDate => &["fechaenvio"],
            Self::CommitmentDate => &["fechacompromiso"],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold a header for comparison: lower-case, strip accents, drop separators.
pub fn fold_header(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            ' ' | '_' | '-' | '.' | '\t' => None,
            'á' | 'à' | 'ä' | 'â' => Some('a'),
            'é' | 'è' | 'ë' | 'ê' => Some('e'),
            'í' | 'ì' | 'ï' | 'î' => Some('i'),
            'ó' | 'ò' | 'ö' | 'ô' => Some('o'),
            'ú' | 'ù' | 'ü' | 'û' => Some('u'),
            'ñ' => Some('n'),
            other => Some(other),
        })
        .collect()
}

/// A header matched to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub index: usize,
    pub header: String,
}

/// Resolved field → column mapping for one sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnMap {
    columns: BTreeMap<Field, ResolvedColumn>,
}

impl ColumnMap {
    /// Resolve every field that has a matching header. Never fails; use
    /// [`ColumnMap::require`] to enforce presence.
    pub fn resolve(headers: &[String]) -> Self {
        let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();
        let mut claimed = vec![false; headers.len()];
        let mut columns = BTreeMap::new();

        for field in Field::ALL {
            let hit = folded.iter().enumerate().find(|(idx, name)| {
                !claimed[*idx] && field.patterns().iter().any(|p| name.contains(p))
            });
            if let Some((idx, _)) = hit {
                claimed[idx] = true;
                columns.insert(
                    field,
                    ResolvedColumn {
                        index: idx,
                        header: headers[idx].trim().to_string(),
                    },
                );
            }
        }

        Self { columns }
    }

    /// Column index of a field, if resolved.
    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).map(|c| c.index)
    }

    /// Original header of a field, if resolved.
    pub fn header(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(|c| c.header.as_str())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    /// Fail with every missing field listed.
    pub fn require(&self, fields: &[Field]) -> Result<(), IngestError> {
        let missing: Vec<Field> = fields
            .iter()
            .copied()
            .filter(|f| !self.columns.contains_key(f))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IngestError::MissingColumns { fields: missing })
        }
    }
}

/// Resolve columns and enforce the required set in one step.
pub fn resolve_columns(headers: &[String], required: &[Field]) -> Result<ColumnMap, IngestError> {
    let map = ColumnMap::resolve(headers);
    map.require(required)?;
    Ok(map)
}
