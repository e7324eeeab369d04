use ferrule_core::{Record, RecordState};

/// A customer row
#[derive(Debug, Default, Record)]
#[record(table = "customers")]
pub struct Customer {
    /// Display name
    pub full_name: String,
    /// Age in years
    pub age: i64,
    /// Optional birthplace
    pub place_of_birth: Option<String>,
    /// Free-form labels, stored as a JSON array
    pub tags: Vec<String>,
    /// Priority customer
    pub vip: bool,
    state: RecordState,
}

impl Customer {
    /// New unsaved customer
    #[must_use]
    pub fn new(full_name: impl Into<String>, age: i64) -> Self {
        Self {
            full_name: full_name.into(),
            age,
            ..Self::default()
        }
    }
}
