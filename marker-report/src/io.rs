use anyhow::{format_err, Context, Error};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use marker_types::Table;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

/// Field delimiter implied by a file name: tab for `.tsv`, `.tab` and `.txt`, comma otherwise.
/// A trailing `.gz` is ignored.
pub fn delimiter_for_path(path: impl AsRef<Path>) -> u8 {
    let path = path.as_ref();
    let inner = if is_gzipped(path) {
        path.file_stem().map(Path::new).unwrap_or(path)
    } else {
        path
    };
    match inner.extension().and_then(|e| e.to_str()) {
        Some("tsv" | "tab" | "txt") => b'\t',
        _ => b',',
    }
}

/// Read a delimited table with a header row, decompressing `.gz` files.
pub fn read_table(path: impl AsRef<Path>, name: &str) -> Result<Table, Error> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
    let delimiter = delimiter_for_path(path);
    let table = if is_gzipped(path) {
        read_table_from(MultiGzDecoder::new(file), name, delimiter)
    } else {
        read_table_from(file, name, delimiter)
    }
    .with_context(|| path.display().to_string())?;
    info!(
        "read {} rows x {} columns from {}",
        table.len(),
        table.header().len(),
        path.display()
    );
    Ok(table)
}

/// Read a delimited table with a header row from any reader.
pub fn read_table_from(reader: impl Read, name: &str, delimiter: u8) -> Result<Table, Error> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(delimiter).from_reader(reader);
    let header = rdr.headers()?.iter().map(str::to_owned).collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.with_context(|| format!("reading table '{name}'"))?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Table::new(name, header, rows)
}

/// Write `table` with a header row and no index column. Fields are quoted only when they
/// contain the delimiter, a quote or a line break. `.gz` paths are gzip compressed.
///
/// `delimiter` defaults to the one implied by the file name.
pub fn write_table(table: &Table, path: impl AsRef<Path>, delimiter: Option<u8>) -> Result<(), Error> {
    let path = path.as_ref();
    write_file(table, path, path, delimiter)?;
    info!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Write `table` to `path`, formatted as `target`'s name implies.
fn write_file(table: &Table, path: &Path, target: &Path, delimiter: Option<u8>) -> Result<(), Error> {
    let delimiter = delimiter.unwrap_or_else(|| delimiter_for_path(target));
    let file = File::create(path).with_context(|| path.display().to_string())?;
    if is_gzipped(target) {
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        write_table_to(table, encoder, delimiter)?.finish()?.flush()?;
    } else {
        write_table_to(table, BufWriter::new(file), delimiter)?.flush()?;
    }
    Ok(())
}

/// Hidden sibling of `path` that a table is written to before it is moved into place.
fn staging_path(path: &Path) -> Result<PathBuf, Error> {
    let name = path
        .file_name()
        .ok_or_else(|| format_err!("{} is not a file name", path.display()))?;
    Ok(path.with_file_name(format!(".{}.partial", name.to_string_lossy())))
}

/// Write several tables, each like [`write_table`], so that either all files appear or none do.
///
/// Every table is first written next to its destination and only renamed into place once all
/// writes succeeded; on error the staged files are removed.
pub fn write_tables(outputs: &[(&Table, &Path)], delimiter: Option<u8>) -> Result<(), Error> {
    let mut staged = Vec::with_capacity(outputs.len());
    for &(table, path) in outputs {
        let written = staging_path(path).and_then(|tmp| {
            staged.push((tmp.clone(), path));
            write_file(table, &tmp, path, delimiter)
        });
        if let Err(e) = written {
            for (tmp, _) in &staged {
                // may not exist if its create failed
                let _ = std::fs::remove_file(tmp);
            }
            return Err(e);
        }
    }
    for ((tmp, path), (table, _)) in staged.iter().zip(outputs) {
        std::fs::rename(tmp, path).with_context(|| format!("moving {} into place", path.display()))?;
        info!("wrote {} rows to {}", table.len(), path.display());
    }
    Ok(())
}

/// Write `table` to `writer`, returning the writer once all rows are flushed into it.
pub fn write_table_to<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<W, Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);
    wtr.write_record(table.header())?;
    for row in table.rows() {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    debug!("serialized '{}' ({} rows)", table.name(), table.len());
    wtr.into_inner().map_err(|e| format_err!("{}", e.error()))
}

#[cfg(test)]
mod test {
    use super::*;

    const MARKERS: &str = "\
\"\",\"p_val\",\"avg_log2FC\",\"pct.1\",\"pct.2\",\"p_val_adj\"
\"FCGR3A\",1.2e-200,2.5,0.95,0.1,1.6e-196
\"CD14\",3.4e-50,-1.75,0.2,0.8,4.5e-46
";

    #[test]
    fn test_delimiter_for_path() {
        assert_eq!(delimiter_for_path("markers.csv"), b',');
        assert_eq!(delimiter_for_path("markers.tsv"), b'\t');
        assert_eq!(delimiter_for_path("markers.txt.gz"), b'\t');
        assert_eq!(delimiter_for_path("markers.csv.gz"), b',');
        assert_eq!(delimiter_for_path("markers"), b',');
    }

    #[test]
    fn test_read_quoted_r_output() {
        let t = read_table_from(MARKERS.as_bytes(), "pairwise", b',').unwrap();
        assert_eq!(t.header()[0], "");
        assert_eq!(t.header()[2], "avg_log2FC");
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 0), "CD14");
        assert_eq!(t.number(1, 2).unwrap(), Some(-1.75));
    }

    #[test]
    fn test_read_rejects_ragged_rows() {
        let input = "gene,cluster\nA,0\nB\n";
        assert!(read_table_from(input.as_bytes(), "markers", b',').is_err());
    }

    #[test]
    fn test_write_quotes_only_when_needed() {
        let t = Table::new(
            "report",
            vec!["gene".into(), "description".into()],
            vec![
                vec!["CD14".into(), "CD14 molecule".into()],
                vec!["HLA-DRA".into(), "major histocompatibility complex, class II, DR alpha".into()],
            ],
        )
        .unwrap();
        let out = write_table_to(&t, Vec::new(), b',').unwrap();
        let text = String::from_utf8(out).unwrap();
        insta::assert_snapshot!(text, @r###"
        gene,description
        CD14,CD14 molecule
        HLA-DRA,"major histocompatibility complex, class II, DR alpha"
        "###);

        let out = write_table_to(&t, Vec::new(), b'\t').unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("HLA-DRA\tmajor histocompatibility complex, class II, DR alpha\n"));
    }

    #[test]
    fn test_write_tables_all_or_nothing() {
        let t = read_table_from(MARKERS.as_bytes(), "pairwise", b',').unwrap();
        let dir = std::env::temp_dir();
        let report = dir.join(format!("marker_report_io_{}_report.csv", std::process::id()));
        let top = dir.join(format!("marker_report_io_{}_missing_dir", std::process::id())).join("top.csv");

        assert!(write_tables(&[(&t, report.as_path()), (&t, top.as_path())], None).is_err());
        assert!(!report.exists());
        assert!(!staging_path(&report).unwrap().exists());

        let top = dir.join(format!("marker_report_io_{}_top.tsv.gz", std::process::id()));
        write_tables(&[(&t, report.as_path()), (&t, top.as_path())], None).unwrap();
        assert_eq!(read_table(&report, "pairwise").unwrap(), t);
        assert_eq!(read_table(&top, "pairwise").unwrap(), t);
        assert!(!staging_path(&top).unwrap().exists());
        std::fs::remove_file(&report).unwrap();
        std::fs::remove_file(&top).unwrap();
    }

    #[test]
    fn test_gz_round_trip() {
        let t = read_table_from(MARKERS.as_bytes(), "pairwise", b',').unwrap();
        let path = std::env::temp_dir().join(format!("marker_report_io_{}.tsv.gz", std::process::id()));
        write_table(&t, &path, None).unwrap();
        let back = read_table(&path, "pairwise").unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back, t);
    }
}
