use sea_query::{Alias, Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::{Segments, Transforms};
use crate::store::Transform;

const ALL_COLUMNS: [Transforms; 9] = [
    Transforms::Id,
    Transforms::Name,
    Transforms::Shared,
    Transforms::ShowOnMain,
    Transforms::Meta,
    Transforms::Pdb,
    Transforms::DateCreated,
    Transforms::SegmentId,
    Transforms::Owner,
];

/// INSERT INTO transforms (id, name, shared, show_on_main, meta, pdb, date_created, segment_id, owner)
/// VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
pub fn insert(transform: &Transform) -> String {
    Query::insert()
        .into_table(Transforms::Table)
        .columns(ALL_COLUMNS)
        .values_panic([
            transform.id.clone().into(),
            transform.name.clone().into(),
            transform.shared.into(),
            transform.show_on_main.into(),
            transform.meta.clone().into(),
            transform.pdb.clone().into(),
            transform.date_created.into(),
            transform.segment_id.clone().into(),
            transform.owner.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM transforms WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(Transforms::Table)
        .and_where(Expr::col(Transforms::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM transforms WHERE owner = ? AND segment_id = ? ORDER BY date_created
pub fn select_by_owner_and_segment(owner: i64, segment_id: &str) -> String {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(Transforms::Table)
        .and_where(Expr::col(Transforms::Owner).eq(owner))
        .and_where(Expr::col(Transforms::SegmentId).eq(segment_id))
        .order_by(Transforms::DateCreated, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM transforms WHERE id = ? AND owner = ?
pub fn delete_owned(id: &str, owner: i64) -> String {
    Query::delete()
        .from_table(Transforms::Table)
        .and_where(Expr::col(Transforms::Id).eq(id))
        .and_where(Expr::col(Transforms::Owner).eq(owner))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE transforms SET show_on_main = TRUE WHERE id = ?
pub fn set_show_on_main(id: &str) -> String {
    Query::update()
        .table(Transforms::Table)
        .value(Transforms::ShowOnMain, true)
        .and_where(Expr::col(Transforms::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT tra.id AS transform_id, tra.date_created, seg.name AS protein_name, seg.pdb_name AS pdb_code,
///        seg.start, seg."end", seg.chain, seg.id AS segment_id
/// FROM transforms tra JOIN segments seg ON tra.segment_id = seg.id
/// WHERE tra.show_on_main = TRUE
/// ORDER BY tra.date_created DESC
pub fn select_shown_on_main() -> String {
    Query::select()
        .expr_as(
            Expr::col((Transforms::Table, Transforms::Id)),
            Alias::new("transform_id"),
        )
        .column((Transforms::Table, Transforms::DateCreated))
        .expr_as(
            Expr::col((Segments::Table, Segments::Name)),
            Alias::new("protein_name"),
        )
        .expr_as(
            Expr::col((Segments::Table, Segments::PdbName)),
            Alias::new("pdb_code"),
        )
        .column((Segments::Table, Segments::Start))
        .column((Segments::Table, Segments::End))
        .column((Segments::Table, Segments::Chain))
        .expr_as(
            Expr::col((Segments::Table, Segments::Id)),
            Alias::new("segment_id"),
        )
        .from(Transforms::Table)
        .inner_join(
            Segments::Table,
            Expr::col((Transforms::Table, Transforms::SegmentId))
                .equals((Segments::Table, Segments::Id)),
        )
        .and_where(Expr::col((Transforms::Table, Transforms::ShowOnMain)).eq(true))
        .order_by((Transforms::Table, Transforms::DateCreated), Order::Desc)
        .to_string(SqliteQueryBuilder)
}
