pub mod query;
pub mod resultset;
pub mod utility;

pub use query::{QUERY_OVERHEAD, Query, QueryOutcome, QueryStep, write_query};
pub use resultset::{
    ColumnDefinitionTail, decode_text_resultset, read_column_count, read_column_definition,
    read_column_definition_tail, read_text_row,
};
pub use utility::{write_ping, write_quit};

#[cfg(test)]
mod resultset_test;
