use std::path::Path;

use anyhow::Result;

use plotly::common::{Marker, Mode};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};

use crate::io::{StagedFile, stage_text};
use crate::types::LocalizationResult;

/// Cumulative share of heritability against the cumulative number of variants,
/// walking the bins in order. The html page is staged like the other outputs.
pub fn stage_localization_plot(result: &LocalizationResult, path: &Path) -> Result<StagedFile> {
    let mut x_vals = vec![0.0];
    let mut y_vals = vec![0.0];
    let mut text = vec![String::new()];
    let mut n_variants = 0u64;
    for row in &result.rows {
        n_variants += row.size;
        x_vals.push(n_variants as f64);
        y_vals.push(row.cumulative);
        text.push(format!("bin {}", row.bin));
    }

    let trace = Scatter::new(x_vals, y_vals)
        .mode(Mode::LinesMarkers)
        .text_array(text)
        .marker(Marker::new().size(6))
        .name("SUM_%H2");

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title("Polygenic localization")
            .x_axis(Axis::new().title("Number of variants"))
            .y_axis(Axis::new().title("Cumulative %H2")),
    );
    let html = plot.to_html();
    stage_text(path, false, |out| {
        out.write_all(html.as_bytes())?;
        Ok(())
    })
}
