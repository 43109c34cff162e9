use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, Segments, Transforms};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS segments (
///     id TEXT PRIMARY KEY,
///     pdb_name TEXT NULL,
///     name TEXT NULL,
///     chain TEXT NOT NULL,
///     start INTEGER NOT NULL,
///     "end" INTEGER NOT NULL,
///     torsions TEXT NOT NULL,
///     shared BOOLEAN NOT NULL DEFAULT TRUE,
///     show_on_main BOOLEAN NOT NULL DEFAULT FALSE,
///     pdb TEXT NOT NULL,
///     owner INTEGER NULL
/// )
pub fn create_segments_table() -> String {
    Table::create()
        .table(Segments::Table)
        .if_not_exists()
        .col(ColumnDef::new(Segments::Id).string().primary_key())
        .col(ColumnDef::new(Segments::PdbName).string().null())
        .col(ColumnDef::new(Segments::Name).string().null())
        .col(ColumnDef::new(Segments::Chain).string().not_null())
        .col(ColumnDef::new(Segments::Start).integer().not_null())
        .col(ColumnDef::new(Segments::End).integer().not_null())
        .col(ColumnDef::new(Segments::Torsions).text().not_null())
        .col(
            ColumnDef::new(Segments::Shared)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(Segments::ShowOnMain)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(ColumnDef::new(Segments::Pdb).text().not_null())
        .col(ColumnDef::new(Segments::Owner).big_integer().null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS transforms (
///     id TEXT PRIMARY KEY,
///     name TEXT NULL,
///     shared BOOLEAN NOT NULL DEFAULT TRUE,
///     show_on_main BOOLEAN NOT NULL DEFAULT FALSE,
///     meta TEXT NOT NULL,
///     pdb TEXT NOT NULL,
///     date_created INTEGER NOT NULL,
///     segment_id TEXT NOT NULL REFERENCES segments(id) ON DELETE CASCADE,
///     owner INTEGER NULL
/// )
pub fn create_transforms_table() -> String {
    Table::create()
        .table(Transforms::Table)
        .if_not_exists()
        .col(ColumnDef::new(Transforms::Id).string().primary_key())
        .col(ColumnDef::new(Transforms::Name).string().null())
        .col(
            ColumnDef::new(Transforms::Shared)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(Transforms::ShowOnMain)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(ColumnDef::new(Transforms::Meta).text().not_null())
        .col(ColumnDef::new(Transforms::Pdb).text().not_null())
        .col(
            ColumnDef::new(Transforms::DateCreated)
                .big_integer()
                .not_null(),
        )
        .col(ColumnDef::new(Transforms::SegmentId).string().not_null())
        .col(ColumnDef::new(Transforms::Owner).big_integer().null())
        .foreign_key(
            ForeignKey::create()
                .from(Transforms::Table, Transforms::SegmentId)
                .to(Segments::Table, Segments::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_segments_owner ON segments(owner)
pub fn create_segments_owner_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_segments_owner")
        .table(Segments::Table)
        .col(Segments::Owner)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_transforms_segment_id ON transforms(segment_id)
pub fn create_transforms_segment_id_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_transforms_segment_id")
        .table(Transforms::Table)
        .col(Transforms::SegmentId)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_transforms_show_on_main ON transforms(show_on_main)
pub fn create_transforms_show_on_main_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_transforms_show_on_main")
        .table(Transforms::Table)
        .col(Transforms::ShowOnMain)
        .to_string(SqliteQueryBuilder)
}
