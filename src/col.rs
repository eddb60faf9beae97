use crate::constant::ColumnType;

/// Column of a text result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Display name (the alias when the query uses `AS`)
    pub name: String,
    /// Name of the column in its table, empty for computed columns
    pub org_name: String,
    /// Declared display width of the column
    pub size: u32,
    pub column_type: u8,
}

impl Field {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            org_name: String::new(),
            size,
            column_type: ColumnType::MYSQL_TYPE_VAR_STRING as u8,
        }
    }

    /// `None` for type codes this crate does not know
    pub fn column_type(&self) -> Option<ColumnType> {
        ColumnType::from_u8(self.column_type)
    }
}
