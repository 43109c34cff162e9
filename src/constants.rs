/// Expected database schema version
/// Databases written by other versions are refused at startup
pub const EXPECTED_DB_VERSION: &str = "1";

/// Response codes carried in `_meta.code`
pub mod codes {
    pub const SUCCESS: i64 = 10;
    pub const GENERIC: i64 = 0;
    pub const NO_STRUCTURE_SOURCE: i64 = 200;
    pub const NO_CHAIN: i64 = 201;
    pub const INVALID_RANGE: i64 = 202;
    pub const NO_SEGMENT_ID: i64 = 203;
    pub const NO_TRANSFORM_ID: i64 = 204;
    pub const SEGMENT_NOT_FOUND: i64 = 205;
    pub const TRANSFORM_NOT_FOUND: i64 = 206;
    pub const BAD_TARGET_TORSIONS: i64 = 207;
    pub const BAD_CONSTRAINED_TORSIONS: i64 = 208;
    pub const BAD_STRUCTURE_FORMAT: i64 = 209;
    pub const NOT_LOGGED_IN: i64 = 300;
}

// Artifact file suffixes shared with the external tool
pub const PDB_EXTENSION: &str = ".pdb";
pub const TORSION_EXTENSION: &str = ".tors";
pub const ERROR_EXTENSION: &str = ".error";
pub const UPLOADED_PDB_EXTENSION: &str = ".custom";
pub const NAME_EXTENSION: &str = ".names";
pub const TRANSFORM_META_EXTENSION: &str = "_transform.meta";
pub const TRANSFORMED_PDB_EXTENSION: &str = "_result.pdb";

/// Length of the random part of generated record ids
pub const ID_SUFFIX_LEN: usize = 16;

/// Languages offered by the UI
pub const AVAILABLE_LANGUAGES: [(&str, &str); 3] =
    [("en", "English"), ("ja", "日本語"), ("ru", "Русский")];
