//! Console report: every neighbor list, then the timed interval.

use std::io::{self, Write};
use std::time::Duration;

use crate::NeighborTable;

/// Write one `Neighbors of point i: ...` line per point, then the elapsed time.
///
/// `elapsed` should be [`crate::KnnOutput::elapsed`]: backend dispatch only,
/// excluding dataset loading and operator input.
pub fn write_report<W: Write>(w: &mut W, table: &NeighborTable, elapsed: Duration) -> io::Result<()> {
    for (i, row) in table.rows().enumerate() {
        write!(w, "Neighbors of point {}: ", i)?;
        for j in row {
            write!(w, "{} ", j)?;
        }
        writeln!(w)?;
    }
    writeln!(
        w,
        "Execution time: {:.5} milliseconds",
        elapsed.as_secs_f64() * 1000.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_format() {
        let table = NeighborTable::from_flat(2, vec![1, 2, 0, 2]);
        let mut out = Vec::new();
        write_report(&mut out, &table, Duration::from_micros(1500)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Neighbors of point 0: 1 2 \n\
             Neighbors of point 1: 0 2 \n\
             Execution time: 1.50000 milliseconds\n"
        );
    }
}
