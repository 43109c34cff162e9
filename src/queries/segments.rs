use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::Segments;
use crate::store::Segment;

const ALL_COLUMNS: [Segments; 11] = [
    Segments::Id,
    Segments::PdbName,
    Segments::Name,
    Segments::Chain,
    Segments::Start,
    Segments::End,
    Segments::Torsions,
    Segments::Shared,
    Segments::ShowOnMain,
    Segments::Pdb,
    Segments::Owner,
];

/// INSERT INTO segments (id, pdb_name, name, chain, start, "end", torsions, shared, show_on_main, pdb, owner)
/// VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
pub fn insert(segment: &Segment) -> String {
    Query::insert()
        .into_table(Segments::Table)
        .columns(ALL_COLUMNS)
        .values_panic([
            segment.id.clone().into(),
            segment.pdb_name.clone().into(),
            segment.name.clone().into(),
            segment.chain.clone().into(),
            segment.start.into(),
            segment.end.into(),
            segment.torsions.clone().into(),
            segment.shared.into(),
            segment.show_on_main.into(),
            segment.pdb.clone().into(),
            segment.owner.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM segments WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(Segments::Table)
        .and_where(Expr::col(Segments::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM segments WHERE owner = ? ORDER BY id
pub fn select_by_owner(owner: i64) -> String {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(Segments::Table)
        .and_where(Expr::col(Segments::Owner).eq(owner))
        .order_by(Segments::Id, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM segments WHERE id = ? AND owner = ?
pub fn delete_owned(id: &str, owner: i64) -> String {
    Query::delete()
        .from_table(Segments::Table)
        .and_where(Expr::col(Segments::Id).eq(id))
        .and_where(Expr::col(Segments::Owner).eq(owner))
        .to_string(SqliteQueryBuilder)
}
