use crate::backend::Metadata;
use crate::color::{ColorBuffer, center, display_width, pad, take_width};
use crate::config::{OutputFormat, Opts};
use crate::console::Console;
use crate::rows::{Row, RowSet, RowState};

const DELIMITER: &str = " | ";

/// Prints a row set in the configured output format and returns the number
/// of data rows.
pub fn render(
    rows: &mut RowSet,
    opts: &Opts,
    metadata: Option<&mut dyn Metadata>,
    console: &mut Console,
) -> usize {
    match opts.output_format {
        OutputFormat::Table => render_table(rows, opts, metadata, console),
        OutputFormat::Vertical => render_vertical(rows, console),
        OutputFormat::Csv => render_separated(rows, opts, ",", console),
        OutputFormat::Tsv => render_separated(rows, opts, "\t", console),
        OutputFormat::Json => render_json(rows, console),
        OutputFormat::XmlAttr => render_xml_attributes(rows, console),
        OutputFormat::XmlElements => render_xml_elements(rows, console),
    }
}

/// Cuts `text` so it fits a capped column.
fn fit(text: &str, width: usize) -> String {
    take_width(text, width)
}

fn row_buffer(row: &Row, keys: &[bool], color: bool) -> ColorBuffer {
    let mut buf = ColorBuffer::new(color);
    for (j, width) in row.sizes.iter().copied().enumerate() {
        if j > 0 {
            buf = buf.green(DELIMITER);
        }
        let text = fit(row.display(j), width);
        let key = keys.get(j).copied().unwrap_or(false);
        buf = if row.is_header {
            let cell = center(&text, width);
            if key { buf.cyan(&cell) } else { buf.bold(&cell) }
        } else {
            let cell = pad(&text, width);
            if key { buf.cyan(&cell) } else { buf.append(&cell) }
        };
    }

    let plain = ColorBuffer::new(color);
    match row.state {
        RowState::Deleted => plain.red(&buf.mono()),
        RowState::Updated => plain.blue(&buf.mono()),
        RowState::Inserted => plain.green(&buf.mono()),
        RowState::Normal => buf,
    }
}

fn framed(line: &ColorBuffer, rule: bool, color: bool) -> ColorBuffer {
    let (open, close) = if rule { ("+-", "-+") } else { ("| ", " |") };
    ColorBuffer::new(color)
        .green(open)
        .append_buffer(line)
        .green(close)
}

fn render_table(
    rows: &mut RowSet,
    opts: &Opts,
    mut metadata: Option<&mut dyn Metadata>,
    console: &mut Console,
) -> usize {
    let color = console.color;
    let width = opts.max_width.saturating_sub(4);
    rows.normalize(opts.max_column_width);

    let mut keys = Vec::with_capacity(rows.columns().len());
    for column in 0..rows.columns().len() {
        let key = match metadata.as_mut() {
            Some(meta) => rows.is_primary_key(column, &mut **meta),
            None => false,
        };
        keys.push(key);
    }

    let Some(header_row) = rows.rows().first() else {
        return 0;
    };
    let header = row_buffer(header_row, &keys, color).truncate(width);
    let rule_text: String = rows
        .widths()
        .iter()
        .map(|w| format!("{}-+-", "-".repeat(*w)))
        .collect();
    let rule = ColorBuffer::new(color)
        .green(&rule_text)
        .truncate(header.visible_len());

    let interval = usize::try_from(opts.header_interval).unwrap_or(0);
    for (index, row) in rows.rows().iter().enumerate() {
        let repeat = interval > 0 && index % interval == 0;
        if index == 0 || (opts.show_header && repeat) {
            console.output(&framed(&rule, true, color));
            console.output(&framed(&header, false, color));
            console.output(&framed(&rule, true, color));
        }
        if index != 0 {
            let line = row_buffer(row, &keys, color).truncate(width);
            console.output(&framed(&line, false, color));
        }
    }
    if opts.show_header {
        console.output(&framed(&rule, true, color));
    }
    rows.count()
}

fn render_vertical(rows: &RowSet, console: &mut Console) -> usize {
    let labels: Vec<&str> = rows.columns().iter().map(|c| c.label.as_str()).collect();
    let label_width = labels.iter().map(|l| display_width(l)).max().unwrap_or(0) + 2;

    for row in rows.rows().iter().skip(1) {
        for (j, label) in labels.iter().enumerate() {
            let line = console
                .buffer()
                .bold(&pad(label, label_width))
                .append(row.display(j));
            console.output(&line);
        }
        console.line("");
    }
    rows.count()
}

fn render_separated(rows: &RowSet, opts: &Opts, separator: &str, console: &mut Console) -> usize {
    let skip = usize::from(!opts.show_header);
    for row in rows.rows().iter().skip(skip) {
        let cells: Vec<String> = (0..row.values.len())
            .map(|j| format!("'{}'", row.display(j)))
            .collect();
        console.line(&cells.join(separator));
    }
    rows.count()
}

/// `{"resultset":[` then one object per line, keys in column order.
fn render_json(rows: &RowSet, console: &mut Console) -> usize {
    let labels: Vec<String> = rows
        .columns()
        .iter()
        .map(|c| serde_json::Value::from(c.label.as_str()).to_string())
        .collect();

    console.line("{\"resultset\":[");
    let data = &rows.rows()[1.min(rows.rows().len())..];
    for (i, row) in data.iter().enumerate() {
        let fields: Vec<String> = labels
            .iter()
            .enumerate()
            .map(|(j, label)| {
                let value = match row.values.get(j).and_then(Option::as_deref) {
                    Some(text) => serde_json::Value::from(text),
                    None => serde_json::Value::Null,
                };
                format!("{label}:{value}")
            })
            .collect();
        let comma = if i + 1 < data.len() { "," } else { "" };
        console.line(&format!("{{{}}}{comma}", fields.join(",")));
    }
    console.line("]}");
    rows.count()
}

/// Escapes the XML special characters except those listed in `keep`.
fn xml_encode(text: &str, keep: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let entity = match c {
            _ if keep.contains(c) => None,
            '&' => Some("&amp;"),
            '<' => Some("&lt;"),
            '>' => Some("&gt;"),
            '"' => Some("&quot;"),
            '\'' => Some("&apos;"),
            _ => None,
        };
        match entity {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

fn render_xml_attributes(rows: &RowSet, console: &mut Console) -> usize {
    console.line("<resultset>");
    for row in rows.rows().iter().skip(1) {
        let mut line = String::from("  <result");
        for (j, column) in rows.columns().iter().enumerate() {
            let value = xml_encode(row.display(j), "'>");
            line.push_str(&format!(" {}=\"{value}\"", column.label));
        }
        line.push_str("/>");
        console.line(&line);
    }
    console.line("</resultset>");
    rows.count()
}

fn render_xml_elements(rows: &RowSet, console: &mut Console) -> usize {
    console.line("<resultset>");
    for row in rows.rows().iter().skip(1) {
        console.line("  <result>");
        for (j, column) in rows.columns().iter().enumerate() {
            let label = &column.label;
            let value = xml_encode(row.display(j), "'\">");
            console.line(&format!("    <{label}>{value}</{label}>"));
        }
        console.line("  </result>");
    }
    console.line("</resultset>");
    rows.count()
}
