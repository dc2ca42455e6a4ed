//! Result materialization seam

use crate::error::Result;
use streamby_core::{Destination, RowKey};

/// Copies winning rows from source storage into result storage.
///
/// Operators call `copy` once per destination they propagate; the
/// implementation decides which columns travel with the row.
pub trait ResultMaterializer {
    fn copy(&mut self, source: RowKey, destination: Destination) -> Result<()>;
}

impl<F> ResultMaterializer for F
where
    F: FnMut(RowKey, Destination) -> Result<()>,
{
    fn copy(&mut self, source: RowKey, destination: Destination) -> Result<()> {
        self(source, destination)
    }
}
