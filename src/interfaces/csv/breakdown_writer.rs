use crate::domain::pricing::PriceBreakdown;
use crate::error::Result;
use std::io::Write;

/// Writes price breakdowns as CSV with two-decimal amounts.
pub struct BreakdownWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BreakdownWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header followed by one row per breakdown, then flushes.
    pub fn write_breakdowns<I>(&mut self, breakdowns: I) -> Result<()>
    where
        I: IntoIterator<Item = PriceBreakdown>,
    {
        self.writer
            .write_record(["subtotal", "government_tax", "platform_fee", "total"])?;
        for b in breakdowns {
            self.writer.write_record([
                format!("{:.2}", b.subtotal),
                format!("{:.2}", b.government_tax),
                format!("{:.2}", b.platform_fee),
                format!("{:.2}", b.total),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::compute_breakdown;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_two_decimal_amounts() {
        let mut out = Vec::new();
        BreakdownWriter::new(&mut out)
            .write_breakdowns([compute_breakdown(dec!(20)).unwrap()])
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "subtotal,government_tax,platform_fee,total\n20.00,1.45,0.65,22.10\n"
        );
    }

    #[test]
    fn test_empty_cart_writes_zeroes() {
        let mut out = Vec::new();
        BreakdownWriter::new(&mut out)
            .write_breakdowns([PriceBreakdown::ZERO])
            .unwrap();

        assert!(String::from_utf8(out).unwrap().ends_with("0.00,0.00,0.00,0.00\n"));
    }
}
