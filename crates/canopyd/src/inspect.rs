use std::io::Write;

use anyhow::Result;
use canopy_core::WindowSet;
use canopy_store::Ledger;

pub fn print_windows(windows: &WindowSet, out: &mut impl Write) -> Result<()> {
    writeln!(out, "anchor {}", windows.anchor())?;
    for window in windows {
        writeln!(
            out,
            "{:<12} {} .. {} ({} days)",
            window.kind.as_str(),
            window.start,
            window.end,
            window.span_days()
        )?;
    }
    Ok(())
}

pub fn print_history(ledger: &Ledger, out: &mut impl Write) -> Result<()> {
    if ledger.is_empty() {
        writeln!(out, "{}: no history", ledger.aoi_id())?;
        return Ok(());
    }

    writeln!(out, "{}", ledger.aoi_id())?;
    for entry in ledger.entries() {
        writeln!(out, "{}", entry.processing_date)?;
        for (kind, record) in &entry.windows {
            writeln!(
                out,
                "  {:<12} {} -> {}  net {:+.0} m²",
                kind.as_str(),
                record.first_date,
                record.last_date,
                record.net_change_m2()
            )?;
        }
    }
    Ok(())
}
