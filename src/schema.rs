use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Segments table - backbone fragments cut from a structure
#[derive(Iden)]
pub enum Segments {
    Table,
    Id,
    PdbName,
    Name,
    Chain,
    Start,
    End,
    Torsions,
    Shared,
    ShowOnMain,
    Pdb,
    Owner,
}

/// Transforms table - torsion-driven results derived from a segment
#[derive(Iden)]
pub enum Transforms {
    Table,
    Id,
    Name,
    Shared,
    ShowOnMain,
    Meta,
    Pdb,
    DateCreated,
    SegmentId,
    Owner,
}
