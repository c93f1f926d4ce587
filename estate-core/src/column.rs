//! Column resolution by header name.
//!
//! Nothing is cached between calls: a renamed header takes effect on the next
//! resolution, at the cost of one header read each time.

use crate::error::StoreError;
use crate::store::StoreConnection;
use crate::task::Field;

pub struct ColumnIndex;

impl ColumnIndex {
    /// 1-based position of `name` in the current header row, or `None` when the
    /// sheet has no such column.
    pub fn resolve(conn: &StoreConnection, name: &str) -> Result<Option<usize>, StoreError> {
        let header = conn.read_header_row()?;
        Ok(position_of(&header, name))
    }

    pub fn resolve_field(conn: &StoreConnection, field: Field) -> Result<Option<usize>, StoreError> {
        Self::resolve(conn, field.header())
    }
}

fn position_of(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim() == name).map(|i| i + 1)
}

/// Field positions taken from one header row.
///
/// Used when a whole table has just been read, so the header in hand is
/// already as fresh as a separate lookup would be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    positions: Vec<(Field, usize)>,
}

impl HeaderMap {
    pub fn from_header(header: &[String]) -> Self {
        let positions = Field::ORDER
            .iter()
            .filter_map(|f| position_of(header, f.header()).map(|p| (*f, p)))
            .collect();
        Self { positions }
    }

    /// 1-based column of `field`.
    pub fn position(&self, field: Field) -> Option<usize> {
        self.positions
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| *p)
    }

    /// Expected columns the header does not carry.
    pub fn missing(&self) -> Vec<Field> {
        Field::ORDER
            .iter()
            .copied()
            .filter(|f| self.position(*f).is_none())
            .collect()
    }
}
