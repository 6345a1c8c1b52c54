//! File-format rendering for the file delivery channel
//!
//! Three formats, selected by configuration. The field set and ordering
//! (conta, historico, valor, data, natureza) is fixed by the external
//! accounting system and shared with the API channel payload.

use chrono::Local;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::LedgerEntry;
use crate::error::{RelayError, Result};

/// Output format of the generated batch file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xml,
    Json,
}

impl FileFormat {
    /// File extension, also the config wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xml => "xml",
            FileFormat::Json => "json",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = RelayError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xml" => Ok(FileFormat::Xml),
            "json" => Ok(FileFormat::Json),
            other => Err(RelayError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One entry as the external system expects it on the wire
#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord {
    pub conta: String,
    pub historico: String,
    /// Emitted as a JSON number at exact precision, never a string
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub valor: Decimal,
    /// ISO-8601 calendar form
    pub data: String,
    /// "D" or "C"
    pub natureza: String,
}

impl From<&LedgerEntry> for EntryRecord {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            conta: entry.account.clone(),
            historico: entry.description.clone(),
            valor: entry.amount,
            data: entry.entry_date_iso(),
            natureza: entry.nature.as_str().to_string(),
        }
    }
}

/// Convert a batch into wire records, preserving order
pub fn to_records(entries: &[LedgerEntry]) -> Vec<EntryRecord> {
    entries.iter().map(EntryRecord::from).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CsvRow<'a> {
    conta: &'a str,
    historico: &'a str,
    valor: String,
    data: String,
    natureza: &'a str,
}

/// Render the batch body for the given format
pub fn render(entries: &[LedgerEntry], format: FileFormat) -> Result<String> {
    match format {
        FileFormat::Csv => render_csv(entries),
        FileFormat::Xml => render_xml(entries),
        FileFormat::Json => render_json(entries),
    }
}

/// `;`-delimited CSV with header `Conta;Historico;Valor;Data;Natureza`
fn render_csv(entries: &[LedgerEntry]) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    for entry in entries {
        wtr.serialize(CsvRow {
            conta: &entry.account,
            historico: &entry.description,
            valor: entry.amount.to_string(),
            data: entry.entry_date_iso(),
            natureza: entry.nature.as_str(),
        })?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| RelayError::Internal(format!("csv writer flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| RelayError::Internal(format!("csv not utf-8: {e}")))
}

/// Root `<lancamentos>` with one `<lancamento>` element per entry
fn render_xml(entries: &[LedgerEntry]) -> Result<String> {
    let mut wr = Writer::new_with_indent(Vec::new(), b' ', 2);

    wr.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    wr.write_event(Event::Start(BytesStart::new("lancamentos")))?;

    for entry in entries {
        wr.write_event(Event::Start(BytesStart::new("lancamento")))?;
        write_text_element(&mut wr, "conta", &entry.account)?;
        write_text_element(&mut wr, "historico", &entry.description)?;
        write_text_element(&mut wr, "valor", &entry.amount.to_string())?;
        write_text_element(&mut wr, "data", &entry.entry_date_iso())?;
        write_text_element(&mut wr, "natureza", entry.nature.as_str())?;
        wr.write_event(Event::End(BytesEnd::new("lancamento")))?;
    }

    wr.write_event(Event::End(BytesEnd::new("lancamentos")))?;

    let bytes = wr.into_inner();
    String::from_utf8(bytes).map_err(|e| RelayError::Internal(format!("xml not utf-8: {e}")))
}

fn write_text_element<W: std::io::Write>(
    wr: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    wr.write_event(Event::Start(BytesStart::new(tag)))?;
    wr.write_event(Event::Text(BytesText::new(text)))?;
    wr.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Top-level `{"lancamentos": [...]}` document
fn render_json(entries: &[LedgerEntry]) -> Result<String> {
    #[derive(Serialize)]
    struct Document {
        lancamentos: Vec<EntryRecord>,
    }

    let doc = Document {
        lancamentos: to_records(entries),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Timestamped batch file name: `lancamentos_contabeis_<YYYYMMDD_HHmmss>.<ext>`
pub fn batch_file_name(format: FileFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("lancamentos_contabeis_{timestamp}.{format}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Nature;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn batch() -> Vec<LedgerEntry> {
        vec![
            LedgerEntry::new(
                "1.1.01",
                "Office rent",
                dec!(1500.00),
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                Nature::Debit,
            ),
            LedgerEntry::new(
                "2.1.03",
                "Customer payment",
                dec!(980.45),
                NaiveDate::from_ymd_opt(2024, 3, 16).unwrap(),
                Nature::Credit,
            ),
        ]
    }

    #[test]
    fn csv_has_fixed_header_and_semicolon_delimiter() {
        let out = render(&batch(), FileFormat::Csv).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "Conta;Historico;Valor;Data;Natureza");
        assert_eq!(lines.next().unwrap(), "1.1.01;Office rent;1500.00;2024-03-15;D");
        assert_eq!(
            lines.next().unwrap(),
            "2.1.03;Customer payment;980.45;2024-03-16;C"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn xml_nests_one_lancamento_per_entry_in_field_order() {
        let out = render(&batch(), FileFormat::Xml).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert_eq!(out.matches("<lancamento>").count(), 2);
        assert!(out.contains("<conta>1.1.01</conta>"));
        assert!(out.contains("<valor>980.45</valor>"));
        assert!(out.contains("<natureza>C</natureza>"));

        // Field order inside an element is fixed by the receiving system
        let conta = out.find("<conta>").unwrap();
        let historico = out.find("<historico>").unwrap();
        let valor = out.find("<valor>").unwrap();
        let data = out.find("<data>").unwrap();
        let natureza = out.find("<natureza>").unwrap();
        assert!(conta < historico && historico < valor && valor < data && data < natureza);
    }

    #[test]
    fn json_wraps_records_in_lancamentos_array() {
        let out = render(&batch(), FileFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let array = value["lancamentos"].as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["conta"], "1.1.01");
        assert_eq!(array[0]["natureza"], "D");
        assert_eq!(array[1]["data"], "2024-03-16");
    }

    #[test]
    fn json_valor_is_a_number_not_a_string() {
        let out = render(&batch(), FileFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let valor = &value["lancamentos"][0]["valor"];
        assert!(valor.is_number(), "valor must be a JSON number: {valor}");
        assert_eq!(valor.as_f64(), Some(1500.0));
        // Exact precision survives on the wire
        assert!(out.contains("\"valor\": 1500.00"));
    }

    #[test]
    fn format_parses_and_rejects() {
        assert_eq!("CSV".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!("json".parse::<FileFormat>().unwrap(), FileFormat::Json);
        assert!(matches!(
            "parquet".parse::<FileFormat>(),
            Err(RelayError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn batch_file_name_carries_extension() {
        let name = batch_file_name(FileFormat::Xml);
        assert!(name.starts_with("lancamentos_contabeis_"));
        assert!(name.ends_with(".xml"));
    }
}
