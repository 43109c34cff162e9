pub mod ddl;
pub mod metadata;
pub mod segments;
pub mod transforms;
