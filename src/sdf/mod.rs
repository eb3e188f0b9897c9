//! Campaign Structure
//!
//! In-memory form of the bulk campaign format: one table per entity kind, each a `RowSet` of
//! bulk-format rows plus the structured provenance of every row. Provenance is decoded from the
//! `Details` column when a structure is read and written back only when it is exported.

pub mod archive;
pub mod fields;
pub mod generator;
pub mod provenance;
pub mod template;

pub use archive::{read_archive, read_archive_bytes, write_archive, write_archive_bytes};
pub use generator::{
    CampaignStructureGenerator, GenerationContext, GenerationOptions, GeneratorConfig,
};
pub use provenance::{AdGroupLink, Provenance, ProvenanceKey};

use crate::error::ApiError;
use crate::rowset::{value_text, Row, RowSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Entity levels of a campaign, parent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "Campaigns")]
    Campaign,
    #[serde(rename = "Insertion Orders")]
    InsertionOrder,
    #[serde(rename = "Line Items")]
    LineItem,
    #[serde(rename = "Ad Groups")]
    AdGroup,
    #[serde(rename = "Ads")]
    Ad,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Campaign,
        EntityKind::InsertionOrder,
        EntityKind::LineItem,
        EntityKind::AdGroup,
        EntityKind::Ad,
    ];

    pub fn id_column(&self) -> &'static str {
        match self {
            EntityKind::Campaign => fields::campaign::ID,
            EntityKind::InsertionOrder => fields::insertion_order::ID,
            EntityKind::LineItem => fields::line_item::ID,
            EntityKind::AdGroup => fields::ad_group::ID,
            EntityKind::Ad => fields::ad::ID,
        }
    }

    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            EntityKind::Campaign => None,
            EntityKind::InsertionOrder => Some(fields::insertion_order::CAMPAIGN_ID),
            EntityKind::LineItem => Some(fields::line_item::IO_ID),
            EntityKind::AdGroup => Some(fields::ad_group::LINE_ITEM_ID),
            EntityKind::Ad => Some(fields::ad::AD_GROUP_ID),
        }
    }

    /// Levels whose `Details` column carries provenance.
    pub fn has_details(&self) -> bool {
        matches!(self, EntityKind::InsertionOrder | EntityKind::LineItem)
    }

    /// Status written when a previously generated entity is no longer produced.
    pub fn retired_status(&self) -> &'static str {
        match self {
            EntityKind::AdGroup | EntityKind::Ad => fields::status::DELETED,
            _ => fields::status::ARCHIVED,
        }
    }

    /// Stem of the entity's file inside an archive (`SDF-<stem>.csv`).
    pub fn file_stem(&self) -> &'static str {
        match self {
            EntityKind::Campaign => "Campaigns",
            EntityKind::InsertionOrder => "InsertionOrders",
            EntityKind::LineItem => "LineItems",
            EntityKind::AdGroup => "AdGroups",
            EntityKind::Ad => "AdGroupAds",
        }
    }

    pub fn file_name(&self) -> String {
        format!("SDF-{}.csv", self.file_stem())
    }

    pub fn from_file_stem(stem: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_stem() == stem)
    }

    /// Short label used in audit entries.
    pub fn short_name(&self) -> &'static str {
        match self {
            EntityKind::Campaign => "Campaign",
            EntityKind::InsertionOrder => "IO",
            EntityKind::LineItem => "LI",
            EntityKind::AdGroup => "AdGroup",
            EntityKind::Ad => "Ad",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Rows of one entity kind with their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SdfTable {
    kind: EntityKind,
    rows: RowSet,
    provenance: Vec<Option<Provenance>>,
}

impl SdfTable {
    /// Wrap rows read from the bulk format, decoding provenance from `Details`.
    pub fn from_rowset(kind: EntityKind, rows: RowSet) -> Self {
        let provenance = rows
            .iter()
            .map(|row| {
                if !kind.has_details() {
                    return None;
                }
                row.get(fields::insertion_order::DETAILS)
                    .and_then(|details| Provenance::decode(&value_text(details)))
            })
            .collect();
        Self {
            kind,
            rows,
            provenance,
        }
    }

    /// Empty table with the same columns.
    pub fn empty_like(&self) -> Self {
        Self {
            kind: self.kind,
            rows: self.rows.clone_empty_schema(),
            provenance: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.rows.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.rows().get(index)
    }

    pub fn provenance(&self, index: usize) -> Option<&Provenance> {
        self.provenance.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Row, Option<&Provenance>)> {
        self.rows
            .iter()
            .zip(self.provenance.iter().map(Option::as_ref))
    }

    /// Text of `column` in row `index`; missing reads as empty.
    pub fn text(&self, column: &str, index: usize) -> String {
        self.row(index)
            .and_then(|row| row.get(column))
            .map(value_text)
            .unwrap_or_default()
    }

    pub fn id(&self, index: usize) -> String {
        self.text(self.kind.id_column(), index)
    }

    pub fn status(&self, index: usize) -> String {
        self.text(fields::status::COLUMN, index)
    }

    /// Indices of rows whose `column` equals `value`.
    pub fn find_all(&self, column: &str, value: &str) -> Vec<usize> {
        self.rows.find_all(column, &Value::String(value.to_string()))
    }

    /// Index of the row with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.find_all(self.kind.id_column(), id).into_iter().next()
    }

    pub fn push(&mut self, row: Row, provenance: Option<Provenance>) -> usize {
        self.provenance.push(provenance);
        self.rows.add_row(row)
    }

    pub fn set(&mut self, column: &str, index: usize, value: impl Into<String>) -> Result<(), ApiError> {
        self.rows
            .set(column, index as i64, Value::String(value.into()))
            .map(|_| ())
    }

    /// Rows as exported: `Details` rewritten from provenance where present.
    pub fn export_rows(&self) -> RowSet {
        let mut rows = self.rows.clone_full();
        if self.kind.has_details() {
            for (row, provenance) in rows.rows_mut().iter_mut().zip(&self.provenance) {
                if let Some(provenance) = provenance {
                    row.insert(
                        fields::insertion_order::DETAILS.to_string(),
                        Value::String(provenance.encode()),
                    );
                }
            }
        }
        rows
    }
}

/// A campaign with all of its child entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SdfStructure {
    pub advertiser_id: String,
    tables: BTreeMap<EntityKind, SdfTable>,
}

impl SdfStructure {
    pub fn new(advertiser_id: impl Into<String>) -> Self {
        Self {
            advertiser_id: advertiser_id.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn table(&self, kind: EntityKind) -> Option<&SdfTable> {
        self.tables.get(&kind)
    }

    pub fn table_mut(&mut self, kind: EntityKind) -> Option<&mut SdfTable> {
        self.tables.get_mut(&kind)
    }

    pub fn insert(&mut self, table: SdfTable) {
        self.tables.insert(table.kind(), table);
    }

    pub fn remove(&mut self, kind: EntityKind) -> Option<SdfTable> {
        self.tables.remove(&kind)
    }

    /// Tables in parent-first order.
    pub fn tables(&self) -> impl Iterator<Item = &SdfTable> {
        self.tables.values()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.table(kind).map_or(0, SdfTable::len)
    }

    /// The campaign row's id, taken from the last campaign row.
    pub fn campaign_id(&self) -> Option<String> {
        let campaigns = self.table(EntityKind::Campaign)?;
        let last = campaigns.len().checked_sub(1)?;
        Some(campaigns.id(last))
    }
}
